//! Transport abstraction for fetching resource bytes.
//!
//! A [`Transport`] performs one network fetch for a URL with the configured
//! headers and timeout, reports incremental progress through a
//! [`ProgressSink`], and resolves to the body bytes or a [`TransportError`].
//! Cancellation is dropping the returned future.
//!
//! # Example
//!
//! ```ignore
//! use multifetch::transport::{FetchRequest, ProgressSink, ReqwestTransport, Transport};
//!
//! let transport = ReqwestTransport::new()?;
//! let request = FetchRequest::new("https://example.com/a.png".into());
//! let bytes = transport.fetch(&request, &ProgressSink::noop()).await?;
//! ```

mod http;
#[cfg(test)]
pub(crate) mod mock;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::key::ResourceKey;

pub use http::ReqwestTransport;

/// Default timeout applied when a request does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur while fetching a resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be sent (DNS, connect, TLS, malformed URL).
    #[error("Request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The fetch did not finish within the configured timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The body could not be read to completion.
    #[error("Failed to read response body: {0}")]
    Body(String),

    /// A configured header name or value is not valid HTTP.
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// The fetch was abandoned before producing a result.
    #[error("Fetch aborted")]
    Aborted,

    /// The transport panicked while fetching.
    #[error("Transport panicked: {0}")]
    Panicked(String),
}

/// A single fetch to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// The resource to fetch.
    pub key: ResourceKey,
    /// Extra HTTP headers sent with the request.
    pub headers: HashMap<String, String>,
    /// Upper bound for the whole fetch.
    pub timeout: Duration,
}

impl FetchRequest {
    /// Creates a request with no extra headers and the default timeout.
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            headers: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the headers.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Progress callback: `(bytes_received, expected_total)`.
///
/// `expected_total` is `None` when the server did not announce a length.
pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Receiver for incremental progress reported by a transport.
pub struct ProgressSink {
    callback: Option<ProgressCallback>,
}

impl ProgressSink {
    /// Creates a sink that forwards to `callback`.
    pub fn new(callback: impl Fn(u64, Option<u64>) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Creates a sink that discards every report.
    pub fn noop() -> Self {
        Self { callback: None }
    }

    /// Reports cumulative bytes received so far.
    pub fn report(&self, received: u64, total: Option<u64>) {
        if let Some(callback) = &self.callback {
            callback(received, total);
        }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("active", &self.callback.is_some())
            .finish()
    }
}

/// Performs network fetches on behalf of the download manager.
///
/// Implementations must be `Send + Sync`; the manager shares one transport
/// across every worker slot and drives each fetch on its own task.
///
/// Dropping the returned future must abandon the fetch. The manager relies on
/// this for `clear_queue` and for its own timeout.
pub trait Transport: Send + Sync + 'static {
    /// Fetches `request.key`, reporting progress to `progress`.
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
        progress: &'a ProgressSink,
    ) -> BoxFuture<'a, Result<Bytes, TransportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fetch_request_builders() {
        let mut headers = HashMap::new();
        headers.insert("Accept".to_string(), "image/png".to_string());

        let request = FetchRequest::new(ResourceKey::new("u"))
            .with_headers(headers.clone())
            .with_timeout(Duration::from_secs(3));

        assert_eq!(request.headers, headers);
        assert_eq!(request.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_progress_sink_forwards() {
        let seen = Arc::new(AtomicU64::new(0));
        let sink = {
            let seen = Arc::clone(&seen);
            ProgressSink::new(move |received, _| seen.store(received, Ordering::SeqCst))
        };

        sink.report(42, Some(100));
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_noop_sink() {
        let sink = ProgressSink::noop();
        sink.report(1, None);
        assert!(format!("{:?}", sink).contains("false"));
    }

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::Status {
                status: 503,
                url: "http://x".to_string()
            }
            .to_string(),
            "HTTP 503 from http://x"
        );
        assert!(TransportError::Timeout(Duration::from_secs(2))
            .to_string()
            .contains("2s"));
    }
}
