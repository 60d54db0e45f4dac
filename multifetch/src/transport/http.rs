//! HTTP transport backed by reqwest.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tracing::{debug, trace};

use super::{BoxFuture, FetchRequest, ProgressSink, Transport, TransportError};
use crate::error::DownloadError;

/// Upper bound on the body buffer reserved from `Content-Length`.
const MAX_PREALLOCATION: u64 = 8 * 1024 * 1024;

/// Real HTTP transport using reqwest.
///
/// The client is shared across all fetches so connections are pooled. The
/// client carries no timeouts of its own: each fetch is bounded end to end,
/// connection phase included, by [`FetchRequest::timeout`], so a changed
/// timeout applies from the next fetch on. Each fetch also applies its own
/// headers, streams the body chunk by chunk, and reports cumulative progress
/// against the announced `Content-Length`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with default client configuration.
    pub fn new() -> Result<Self, DownloadError> {
        let client = Client::builder()
            .build()
            .map_err(|e| DownloadError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn fetch_inner(
        &self,
        request: &FetchRequest,
        progress: &ProgressSink,
    ) -> Result<Bytes, TransportError> {
        let url = request.key.as_str();
        let headers = header_map(&request.headers)?;

        let mut response = self
            .client
            .get(url)
            .headers(headers)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| classify(e, request.timeout, TransportError::Request))?;

        // Check HTTP status
        if !response.status().is_success() {
            return Err(TransportError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let total = response.content_length();
        let mut body = match total {
            Some(len) => BytesMut::with_capacity(len.min(MAX_PREALLOCATION) as usize),
            None => BytesMut::new(),
        };
        progress.report(0, total);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify(e, request.timeout, TransportError::Body))?
        {
            body.extend_from_slice(&chunk);
            trace!(url, received = body.len(), ?total, "Received chunk");
            progress.report(body.len() as u64, total);
        }

        debug!(url, bytes = body.len(), "Fetch complete");
        Ok(body.freeze())
    }
}

impl Transport for ReqwestTransport {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
        progress: &'a ProgressSink,
    ) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        Box::pin(self.fetch_inner(request, progress))
    }
}

/// Converts configured string headers into a reqwest header map.
fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn classify(
    err: reqwest::Error,
    timeout: Duration,
    otherwise: fn(String) -> TransportError,
) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        otherwise(err.to_string())
    }
}
