//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use multifetch::logging::LogInitError;
use multifetch::{ConfigError, DownloadError};

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid argument or setting.
    Config(String),
    /// The configuration file could not be loaded.
    ConfigFile(ConfigError),
    /// The download manager could not be created.
    Manager(DownloadError),
    /// Writing a downloaded file failed.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Logging could not be initialised.
    Logging(LogInitError),
    /// Some downloads did not complete.
    Incomplete { failed: usize, total: usize },
    /// The run was interrupted with Ctrl+C.
    Interrupted,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Manager(e) => write!(f, "Failed to start downloader: {}", e),
            CliError::Write { path, source } => {
                write!(f, "Failed to write {}: {}", path.display(), source)
            }
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::Incomplete { failed, total } => {
                write!(f, "{} of {} downloads failed", failed, total)
            }
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        CliError::Manager(e)
    }
}

impl From<LogInitError> for CliError {
    fn from(e: LogInitError) -> Self {
        CliError::Logging(e)
    }
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Interrupted => 130,
            CliError::Config(_) | CliError::ConfigFile(_) => 2,
            _ => 1,
        }
    }
}
