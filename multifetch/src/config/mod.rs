//! Configuration for the download manager.
//!
//! [`DownloaderConfig`] is the runtime configuration. It can be built in code
//! with the `with_*` methods or loaded from an INI file with [`ConfigFile`].
//! After a manager is created, the same values are changed through the
//! manager's setters, which apply them at the next eviction or dispatch
//! decision.

mod file;

use std::collections::HashMap;
use std::time::Duration;

pub use file::{parse_size, ConfigError, ConfigFile};

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::scheduler::MIN_WORKERS;
use crate::transport::DEFAULT_TIMEOUT;

/// Default cache budget (16 MiB).
pub const DEFAULT_CACHE_SIZE_LIMIT: u64 = 16 * 1024 * 1024;

/// Default number of concurrent transports.
pub const DEFAULT_MAX_THREADS: usize = 4;

/// Configuration for [`DownloadManager`](crate::DownloadManager).
#[derive(Debug, Clone, PartialEq)]
pub struct DownloaderConfig {
    /// Maximum total bytes kept in the cache.
    pub cache_size_limit: u64,

    /// Maximum number of concurrent transports (at least one).
    pub maximum_number_of_threads: usize,

    /// Extra headers sent with every request.
    pub http_headers: HashMap<String, String>,

    /// Upper bound for each fetch, connection phase included.
    pub connection_timeout: Duration,

    /// Unread progress events kept per subscriber. Activity and error
    /// events are never dropped.
    pub event_capacity: usize,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            cache_size_limit: DEFAULT_CACHE_SIZE_LIMIT,
            maximum_number_of_threads: DEFAULT_MAX_THREADS,
            http_headers: HashMap::new(),
            connection_timeout: DEFAULT_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DownloaderConfig {
    /// Set the cache budget in bytes.
    pub fn with_cache_size_limit(mut self, bytes: u64) -> Self {
        self.cache_size_limit = bytes;
        self
    }

    /// Set the maximum number of concurrent transports.
    pub fn with_maximum_number_of_threads(mut self, max: usize) -> Self {
        self.maximum_number_of_threads = max.max(MIN_WORKERS);
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.insert(name.into(), value.into());
        self
    }

    /// Replace all headers.
    pub fn with_http_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.http_headers = headers;
        self
    }

    /// Set the per-fetch timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the per-subscriber progress backlog.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::default();
        assert_eq!(config.cache_size_limit, 16 * 1024 * 1024);
        assert_eq!(config.maximum_number_of_threads, 4);
        assert!(config.http_headers.is_empty());
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert_eq!(config.event_capacity, 256);
    }

    #[test]
    fn test_builders() {
        let config = DownloaderConfig::default()
            .with_cache_size_limit(100)
            .with_maximum_number_of_threads(2)
            .with_header("User-Agent", "test")
            .with_connection_timeout(Duration::from_secs(5))
            .with_event_capacity(16);

        assert_eq!(config.cache_size_limit, 100);
        assert_eq!(config.maximum_number_of_threads, 2);
        assert_eq!(config.http_headers.get("User-Agent").unwrap(), "test");
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn test_zero_threads_is_clamped() {
        let config = DownloaderConfig::default().with_maximum_number_of_threads(0);
        assert_eq!(config.maximum_number_of_threads, 1);
    }
}
