//! INI configuration file loading.
//!
//! ```text
//! [cache]
//! size_limit = 16MB
//!
//! [network]
//! max_connections = 4
//! timeout_secs = 30
//!
//! [headers]
//! User-Agent = multifetch/0.1
//!
//! [events]
//! capacity = 256
//! ```
//!
//! Every section and key is optional; anything missing keeps its default.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use super::DownloaderConfig;

const SECTION_CACHE: &str = "cache";
const SECTION_NETWORK: &str = "network";
const SECTION_HEADERS: &str = "headers";
const SECTION_EVENTS: &str = "events";

/// Errors that can occur while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid INI.
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// A value could not be interpreted.
    #[error("Invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Loader for INI configuration files.
pub struct ConfigFile;

impl ConfigFile {
    /// Default location: `<config dir>/multifetch/config.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("multifetch").join("config.ini"))
    }

    /// Loads configuration from `path`.
    pub fn load(path: &Path) -> Result<DownloaderConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ini = Ini::load_from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(path = %path.display(), "Loaded configuration file");
        Self::from_ini(&ini)
    }

    /// Loads configuration from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<DownloaderConfig, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(DownloaderConfig::default())
        }
    }

    /// Parses configuration from INI text.
    pub fn parse(text: &str) -> Result<DownloaderConfig, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<DownloaderConfig, ConfigError> {
        let mut config = DownloaderConfig::default();

        if let Some(value) = get(ini, SECTION_CACHE, "size_limit") {
            config.cache_size_limit =
                parse_size(value).ok_or_else(|| invalid(SECTION_CACHE, "size_limit", value))?;
        }

        if let Some(value) = get(ini, SECTION_NETWORK, "max_connections") {
            let max: usize = parse_number(SECTION_NETWORK, "max_connections", value)?;
            config = config.with_maximum_number_of_threads(max);
        }

        if let Some(value) = get(ini, SECTION_NETWORK, "timeout_secs") {
            let secs: u64 = parse_number(SECTION_NETWORK, "timeout_secs", value)?;
            config.connection_timeout = Duration::from_secs(secs);
        }

        if let Some(headers) = ini.section(Some(SECTION_HEADERS)) {
            for (name, value) in headers.iter() {
                config.http_headers.insert(name.to_string(), value.to_string());
            }
        }

        if let Some(value) = get(ini, SECTION_EVENTS, "capacity") {
            config.event_capacity = parse_number(SECTION_EVENTS, "capacity", value)?;
        }

        Ok(config)
    }
}

fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(section, key, value))
}

/// Parses a byte size such as `1048576`, `512KB`, `16 MB` or `2GiB`.
///
/// Suffixes are case-insensitive and binary (1 KB = 1024 bytes).
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, suffix) = value.split_at(split);
    let number: u64 = digits.parse().ok()?;

    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        _ => return None,
    };
    number.checked_mul(multiplier)
}
