//! Result handles returned by the download manager.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use ::image::DynamicImage;
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::key::ResourceKey;
use crate::scheduler::Delivery;

/// How a request was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Served from the cache immediately.
    CacheHit,
    /// Attached to a fetch already in flight for the same key.
    Coalesced,
    /// Queued for a worker slot (possibly dispatched right away).
    Queued,
}

/// Future resolving to the bytes of a queued request.
///
/// Resolves to `Some(bytes)` exactly once when the resource is delivered, or
/// to `None` if the request ends without data: the fetch failed, or
/// `clear_queue` cancelled it. Failure details are published as
/// [`DownloadEvent::Error`](crate::DownloadEvent::Error).
///
/// Dropping the handle does not cancel the fetch; the result is still cached.
pub struct DownloadHandle {
    key: ResourceKey,
    admission: Admission,
    rx: oneshot::Receiver<Delivery>,
}

impl DownloadHandle {
    pub(crate) fn new(
        key: ResourceKey,
        admission: Admission,
        rx: oneshot::Receiver<Delivery>,
    ) -> Self {
        Self { key, admission, rx }
    }

    /// The requested resource.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// How the request was admitted.
    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// Blocks the current thread until the request settles.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_wait(self) -> Option<Bytes> {
        self.rx.blocking_recv().ok().map(|delivery| delivery.data)
    }
}

impl Future for DownloadHandle {
    type Output = Option<Bytes>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.ok().map(|delivery| delivery.data))
    }
}

impl fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("key", &self.key)
            .field("admission", &self.admission)
            .finish()
    }
}

/// A decoded image and where its bytes came from.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// The decoded image.
    pub image: DynamicImage,
    /// True if the bytes were served from the cache.
    pub from_cache: bool,
}

/// Future resolving to a decoded image.
///
/// Resolves to `None` when the fetch fails, the bytes cannot be decoded, or
/// the request is cancelled by `clear_queue`.
pub struct ImageHandle {
    key: ResourceKey,
    admission: Admission,
    rx: oneshot::Receiver<FetchedImage>,
}

impl ImageHandle {
    pub(crate) fn new(
        key: ResourceKey,
        admission: Admission,
        rx: oneshot::Receiver<FetchedImage>,
    ) -> Self {
        Self { key, admission, rx }
    }

    /// The requested resource.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// How the underlying byte request was admitted.
    pub fn admission(&self) -> Admission {
        self.admission
    }

    /// Blocks the current thread until the image settles.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_wait(self) -> Option<FetchedImage> {
        self.rx.blocking_recv().ok()
    }
}

impl Future for ImageHandle {
    type Output = Option<FetchedImage>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("key", &self.key)
            .field("admission", &self.admission)
            .finish()
    }
}
