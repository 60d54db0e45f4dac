//! CLI command implementations.

pub mod config;
pub mod fetch;

use std::path::Path;

use multifetch::{ConfigFile, DownloaderConfig};

use crate::error::CliError;

/// Loads configuration from an explicit path, or the default location if it
/// exists.
pub fn load_config(path: Option<&Path>) -> Result<DownloaderConfig, CliError> {
    match path {
        Some(path) => Ok(ConfigFile::load(path)?),
        None => match ConfigFile::default_path() {
            Some(default) => Ok(ConfigFile::load_or_default(&default)?),
            None => Ok(DownloaderConfig::default()),
        },
    }
}
