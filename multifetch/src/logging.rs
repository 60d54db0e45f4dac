//! Logging setup for binaries embedding the download manager.
//!
//! The library itself only emits `tracing` events. Binaries call [`init`] once
//! at startup to install a subscriber that writes to stderr with local-time
//! timestamps and, optionally, to a daily-rolling log file.

use std::path::PathBuf;

use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "multifetch=info";

/// File name prefix for rolling log files.
pub const LOG_FILE_PREFIX: &str = "multifetch.log";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directives used when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for rolling log files; `None` logs to stderr only.
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            directory: None,
        }
    }
}

impl LogConfig {
    /// Filter for `--verbose` runs.
    pub fn verbose() -> Self {
        Self {
            filter: "multifetch=debug".to_string(),
            directory: None,
        }
    }

    /// Also write logs under `directory`.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }
}

/// Error installing the global subscriber.
#[derive(Debug, thiserror::Error)]
#[error("Failed to initialise logging: {0}")]
pub struct LogInitError(String);

/// Installs the global tracing subscriber.
///
/// Returns the file writer's guard when file logging is enabled; keep it alive
/// until exit so buffered lines are flushed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, LogInitError> {
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let filter = env_filter(&config.filter);
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(false);

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LogInitError(e.to_string()))?;

    Ok(guard)
}

/// Builds the filter from `RUST_LOG`, falling back to `default`.
fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}
