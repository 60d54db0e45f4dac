//! Error types for the download manager.
//!
//! Fetch and decode failures never reach the caller's result handle; they are
//! published as [`DownloadEvent::Error`](crate::DownloadEvent::Error). The
//! types are `Clone` so every event subscriber gets its own copy.

use thiserror::Error;

use crate::key::ResourceKey;
use crate::transport::TransportError;

/// Errors reported by the download manager.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// The transport failed (connect, DNS, timeout, HTTP status, body read).
    #[error("Network failure for {key}: {source}")]
    Network {
        key: ResourceKey,
        #[source]
        source: TransportError,
    },

    /// The bytes were fetched but could not be decoded as an image.
    #[error("Failed to decode image from {key}: {reason}")]
    Decode { key: ResourceKey, reason: String },

    /// No Tokio runtime was available to drive transports.
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl DownloadError {
    /// Returns the resource key this error concerns, if any.
    pub fn key(&self) -> Option<&ResourceKey> {
        match self {
            Self::Network { key, .. } | Self::Decode { key, .. } => Some(key),
            Self::Runtime(_) | Self::Client(_) => None,
        }
    }

    /// Returns true for transport-level failures.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Returns true for timeouts reported by the transport or the manager.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Network {
                source: TransportError::Timeout(_),
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::time::Duration;

    #[test]
    fn test_network_error_display_and_source() {
        let err = DownloadError::Network {
            key: ResourceKey::new("https://example.com/a"),
            source: TransportError::Status {
                status: 404,
                url: "https://example.com/a".to_string(),
            },
        };
        let message = err.to_string();
        assert!(message.contains("https://example.com/a"));
        assert!(message.contains("404"));
        assert!(err.source().is_some());
        assert!(err.is_network());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_timeout_detection() {
        let err = DownloadError::Network {
            key: ResourceKey::new("k"),
            source: TransportError::Timeout(Duration::from_secs(5)),
        };
        assert!(err.is_timeout());
    }

    #[test]
    fn test_decode_error_key() {
        let err = DownloadError::Decode {
            key: ResourceKey::new("img"),
            reason: "bad magic".to_string(),
        };
        assert_eq!(err.key().map(|k| k.as_str()), Some("img"));
        assert!(!err.is_network());
        assert_eq!(err.to_string(), "Failed to decode image from img: bad magic");
    }

    #[test]
    fn test_runtime_error_has_no_key() {
        let err = DownloadError::Runtime("no reactor".to_string());
        assert!(err.key().is_none());
    }
}
