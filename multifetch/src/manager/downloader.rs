//! The download manager facade and its scheduling core.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::handle::{Admission, DownloadHandle, FetchedImage, ImageHandle};
use super::status::ManagerStatus;
use crate::cache::{ByteLruCache, CacheStats, PutOutcome};
use crate::config::DownloaderConfig;
use crate::error::DownloadError;
use crate::events::{EventBus, EventReceiver};
use crate::key::ResourceKey;
use crate::scheduler::{
    Delivery, FetchId, InFlightRegistry, QueuedRequest, RequestQueue, Waiter, WorkerPool,
};
use crate::transport::{FetchRequest, ProgressSink, ReqwestTransport, Transport, TransportError};

/// Concurrent, deduplicating, caching downloader.
///
/// Cloning is cheap; clones share the same cache, queue and worker slots.
#[derive(Clone)]
pub struct DownloadManager {
    core: Arc<Core>,
}

/// Everything the manager and its fetch tasks share.
struct Core {
    state: Mutex<State>,
    events: EventBus,
    transport: Arc<dyn Transport>,
    runtime: Handle,
}

/// Scheduling state. Only ever touched under `Core::state`.
struct State {
    config: DownloaderConfig,
    cache: ByteLruCache,
    queue: RequestQueue,
    in_flight: InFlightRegistry,
    pool: WorkerPool,
    /// Bumped by every `clear_queue`; work started in an older epoch is
    /// never delivered.
    epoch: u64,
}

impl DownloadManager {
    /// Creates a manager using HTTP(S) on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Runtime`] outside a Tokio runtime and
    /// [`DownloadError::Client`] if the HTTP client cannot be built.
    pub fn new(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let transport = ReqwestTransport::new()?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a manager using a custom transport on the current Tokio runtime.
    pub fn with_transport(
        config: DownloaderConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, DownloadError> {
        let runtime = Handle::try_current()
            .map_err(|e| DownloadError::Runtime(format!("No Tokio runtime available: {}", e)))?;
        Ok(Self::with_runtime(config, transport, runtime))
    }

    /// Creates a manager that spawns its fetches on `runtime`.
    pub fn with_runtime(
        config: DownloaderConfig,
        transport: Arc<dyn Transport>,
        runtime: Handle,
    ) -> Self {
        info!(
            cache_size_limit = config.cache_size_limit,
            max_threads = config.maximum_number_of_threads,
            timeout_secs = config.connection_timeout.as_secs_f64(),
            headers = config.http_headers.len(),
            "Download manager created"
        );

        let state = State {
            cache: ByteLruCache::new(config.cache_size_limit),
            queue: RequestQueue::new(),
            in_flight: InFlightRegistry::new(),
            pool: WorkerPool::new(config.maximum_number_of_threads),
            epoch: 0,
            config,
        };
        let events = EventBus::new(state.config.event_capacity);

        Self {
            core: Arc::new(Core {
                state: Mutex::new(state),
                events,
                transport,
                runtime,
            }),
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Requests the bytes of a resource.
    ///
    /// Served from the cache when present, attached to an in-flight fetch of
    /// the same key, or queued for the next free worker slot. Must be called
    /// from a thread that can spawn onto the manager's runtime; it never
    /// blocks on I/O.
    pub fn queue_request(&self, key: impl Into<ResourceKey>) -> DownloadHandle {
        let key = key.into();
        let (tx, rx) = oneshot::channel();
        let (admission, _) = self.core.admit(key.clone(), tx);
        DownloadHandle::new(key, admission, rx)
    }

    /// Requests a resource and decodes it as an image.
    ///
    /// The bytes follow the same path as [`queue_request`](Self::queue_request)
    /// and are cached undecoded. Decoding runs on the blocking pool. A decode
    /// failure publishes [`DownloadEvent::Error`](crate::DownloadEvent::Error)
    /// and resolves the handle to `None`.
    pub fn image_with_path(&self, key: impl Into<ResourceKey>) -> ImageHandle {
        let key = key.into();
        let (bytes_tx, bytes_rx) = oneshot::channel::<Delivery>();
        let (image_tx, image_rx) = oneshot::channel();
        let (admission, epoch) = self.core.admit(key.clone(), bytes_tx);

        let core = Arc::clone(&self.core);
        let task_key = key.clone();
        self.core.runtime.spawn(async move {
            let Ok(delivery) = bytes_rx.await else {
                return;
            };
            let Delivery { data, from_cache } = delivery;

            let decode_key = task_key.clone();
            let decoded =
                tokio::task::spawn_blocking(move || crate::image::decode(&decode_key, &data))
                    .await
                    .unwrap_or_else(|e| {
                        Err(DownloadError::Decode {
                            key: task_key.clone(),
                            reason: format!("decoder task failed: {}", e),
                        })
                    });

            core.deliver_image(&task_key, epoch, decoded, from_cache, image_tx);
        });

        ImageHandle::new(key, admission, image_rx)
    }

    /// Cancels everything queued and in flight.
    ///
    /// Every outstanding handle resolves to `None`. Once this returns, no
    /// delivery, progress or error concerning the cancelled requests is
    /// published. The cache is kept. Calling it again is a no-op.
    ///
    /// Activity drops to idle immediately, but each cancelled fetch keeps its
    /// worker slot until its task has exited, so new requests never run
    /// alongside more than `maximum_number_of_threads` transports.
    pub fn clear_queue(&self) {
        let mut state = self.core.state.lock();
        let queued = state.queue.clear();
        let in_flight = state.in_flight.cancel_all();
        let draining = state.pool.abandon_active();
        state.epoch += 1;

        if queued > 0 || in_flight > 0 {
            info!(queued, in_flight, draining, "Cleared download queue");
        }
        self.core.sync_activity(&mut state);
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Changes the cache budget, evicting least recently used entries as
    /// needed.
    pub fn set_cache_size_limit(&self, bytes: u64) {
        let mut state = self.core.state.lock();
        state.config.cache_size_limit = bytes;
        let evicted = state.cache.set_max_size(bytes);
        debug!(limit = bytes, evicted, "Cache size limit changed");
    }

    /// Changes the concurrency limit (clamped to at least one).
    ///
    /// Raising it dispatches queued requests immediately. Lowering it never
    /// interrupts running fetches.
    pub fn set_maximum_number_of_threads(&self, max: usize) {
        let mut state = self.core.state.lock();
        state.pool.set_max(max);
        state.config.maximum_number_of_threads = state.pool.max();
        debug!(max = state.pool.max(), "Concurrency limit changed");
        self.core.pump(&mut state);
    }

    /// Replaces the headers sent with subsequently started fetches.
    pub fn set_http_headers(&self, headers: HashMap<String, String>) {
        let mut state = self.core.state.lock();
        debug!(count = headers.len(), "HTTP headers changed");
        state.config.http_headers = headers;
    }

    /// Changes the timeout applied to subsequently started fetches.
    ///
    /// The timeout bounds each fetch end to end, connection phase included.
    /// Fetches already running keep the timeout they started with.
    pub fn set_connection_timeout(&self, timeout: Duration) {
        let mut state = self.core.state.lock();
        debug!(timeout_secs = timeout.as_secs_f64(), "Connection timeout changed");
        state.config.connection_timeout = timeout;
    }

    /// Current configuration.
    pub fn config(&self) -> DownloaderConfig {
        self.core.state.lock().config.clone()
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Subscribes to progress, activity and error events.
    ///
    /// Activity and error events are always delivered. Progress is dropped
    /// for a subscriber holding `event_capacity` unread progress events.
    pub fn subscribe(&self) -> EventReceiver {
        self.core.events.subscribe()
    }

    /// Snapshot of queue, worker and cache state.
    pub fn status(&self) -> ManagerStatus {
        let state = self.core.state.lock();
        ManagerStatus {
            active: state.pool.active(),
            draining: state.pool.draining(),
            queued: state.queue.len(),
            in_flight: state.in_flight.len(),
            peak_active: state.pool.peak(),
            max_threads: state.pool.max(),
            cache_entries: state.cache.len(),
            cache_bytes: state.cache.size_bytes(),
            cache_limit: state.cache.max_size_bytes(),
        }
    }

    /// Cache hit, miss and eviction counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.core.state.lock().cache.stats()
    }

    /// Returns true if `key` is cached. Does not affect recency.
    pub fn is_cached(&self, key: impl Into<ResourceKey>) -> bool {
        self.core.state.lock().cache.contains(&key.into())
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("status", &self.status())
            .finish()
    }
}

impl Core {
    /// Admits a request: cache, then in-flight coalescing, then the queue.
    ///
    /// Returns the admission path and the epoch it was admitted in.
    fn admit(self: &Arc<Self>, key: ResourceKey, waiter: Waiter) -> (Admission, u64) {
        let mut state = self.state.lock();
        let epoch = state.epoch;

        if let Some(data) = state.cache.get(&key) {
            debug!(key = %key, bytes = data.len(), "Cache hit");
            let _ = waiter.send(Delivery::cached(data));
            return (Admission::CacheHit, epoch);
        }

        let waiter = match state.in_flight.attach(&key, waiter) {
            Ok(waiters) => {
                debug!(key = %key, waiters, "Request coalesced with in-flight fetch");
                return (Admission::Coalesced, epoch);
            }
            Err(waiter) => waiter,
        };

        let sequence = state.queue.push(key.clone(), waiter);
        trace!(key = %key, sequence, queued = state.queue.len(), "Request queued");

        self.pump(&mut state);
        (Admission::Queued, epoch)
    }

    /// Dispatches queued requests while worker slots are free.
    fn pump(self: &Arc<Self>, state: &mut State) {
        while state.pool.has_capacity() {
            let Some(request) = state.queue.pop() else {
                break;
            };
            let waited = request.wait_time();
            let QueuedRequest {
                key,
                waiter,
                sequence,
                ..
            } = request;

            // The resource may have landed or started while this waited.
            let cached = if state.cache.contains(&key) {
                state.cache.get(&key)
            } else {
                None
            };
            if let Some(data) = cached {
                debug!(key = %key, sequence, "Queued request served from cache");
                let _ = waiter.send(Delivery::cached(data));
                continue;
            }

            let waiter = match state.in_flight.attach(&key, waiter) {
                Ok(waiters) => {
                    debug!(key = %key, sequence, waiters, "Queued request coalesced at dispatch");
                    continue;
                }
                Err(waiter) => waiter,
            };

            let acquired = state.pool.acquire();
            debug_assert!(acquired, "dispatch without a free worker slot");
            let (fetch_id, cancel) = state.in_flight.begin(key.clone(), waiter);
            let request = FetchRequest::new(key)
                .with_headers(state.config.http_headers.clone())
                .with_timeout(state.config.connection_timeout);

            debug!(
                key = %request.key,
                %fetch_id,
                sequence,
                waited_ms = waited.as_millis() as u64,
                active = state.pool.active(),
                max = state.pool.max(),
                "Dispatching fetch"
            );
            self.spawn_fetch(fetch_id, request, cancel);
        }

        self.sync_activity(state);
    }

    fn spawn_fetch(self: &Arc<Self>, fetch_id: FetchId, request: FetchRequest, cancel: CancellationToken) {
        let core = Arc::clone(self);
        let transport = Arc::clone(&self.transport);

        self.runtime.spawn(async move {
            let progress = {
                let core = Arc::clone(&core);
                let key = request.key.clone();
                ProgressSink::new(move |received, total| {
                    core.record_progress(&key, fetch_id, received, total)
                })
            };
            let timeout = request.timeout;

            let outcome = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(key = %request.key, %fetch_id, "Fetch cancelled");
                    core.release_abandoned();
                    return;
                }

                result = tokio::time::timeout(
                    timeout,
                    AssertUnwindSafe(async { transport.fetch(&request, &progress).await })
                        .catch_unwind(),
                ) => {
                    match result {
                        Ok(Ok(outcome)) => outcome,
                        Ok(Err(payload)) => Err(TransportError::Panicked(panic_message(payload))),
                        Err(_) => Err(TransportError::Timeout(timeout)),
                    }
                }
            };

            core.complete(&request.key, fetch_id, outcome);
        });
    }

    /// Frees the slot of a fetch abandoned by `clear_queue` once its task is
    /// done, and refills it.
    fn release_abandoned(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.pool.release_draining();
        self.pump(&mut state);
    }

    fn record_progress(&self, key: &ResourceKey, fetch_id: FetchId, received: u64, total: Option<u64>) {
        let mut state = self.state.lock();
        if let Some(fraction) = state.in_flight.record_progress(key, fetch_id, received, total) {
            trace!(key = %key, %fetch_id, received, fraction, "Progress");
            self.events.progress(key.clone(), fraction);
        }
    }

    /// Settles a finished fetch and refills the freed slot.
    fn complete(
        self: &Arc<Self>,
        key: &ResourceKey,
        fetch_id: FetchId,
        outcome: Result<Bytes, TransportError>,
    ) {
        let mut state = self.state.lock();
        let Some(entry) = state.in_flight.finish(key, fetch_id) else {
            debug!(key = %key, %fetch_id, "Discarding result of cancelled fetch");
            state.pool.release_draining();
            self.pump(&mut state);
            return;
        };
        state.pool.release();
        let elapsed_ms = entry.elapsed().as_millis() as u64;

        match outcome {
            Ok(data) => {
                if entry.progress.map_or(true, |last| last < 1.0) {
                    self.events.progress(key.clone(), 1.0);
                }

                match state.cache.put(key.clone(), data.clone()) {
                    PutOutcome::Stored { evicted } if evicted > 0 => {
                        debug!(key = %key, evicted, cache_bytes = state.cache.size_bytes(), "Cached with eviction");
                    }
                    PutOutcome::Stored { .. } => {}
                    PutOutcome::TooLarge => {
                        debug!(
                            key = %key,
                            bytes = data.len(),
                            limit = state.cache.max_size_bytes(),
                            "Resource exceeds cache limit, not cached"
                        );
                    }
                }

                let waiters = entry.waiters.len();
                for waiter in entry.waiters {
                    let _ = waiter.send(Delivery::fetched(data.clone()));
                }
                debug!(key = %key, %fetch_id, bytes = data.len(), waiters, elapsed_ms, "Fetch succeeded");
            }
            Err(source) => {
                warn!(
                    key = %key,
                    %fetch_id,
                    waiters = entry.waiters.len(),
                    elapsed_ms,
                    error = %source,
                    "Fetch failed"
                );
                drop(entry.waiters);
                self.events.error(DownloadError::Network {
                    key: key.clone(),
                    source,
                });
            }
        }

        self.pump(&mut state);
    }

    /// Hands a decoded image to its caller unless the queue was cleared since
    /// the request was admitted.
    fn deliver_image(
        &self,
        key: &ResourceKey,
        epoch: u64,
        decoded: Result<::image::DynamicImage, DownloadError>,
        from_cache: bool,
        tx: oneshot::Sender<FetchedImage>,
    ) {
        let state = self.state.lock();
        if state.epoch != epoch {
            debug!(key = %key, "Discarding image decoded before queue was cleared");
            return;
        }

        match decoded {
            Ok(image) => {
                trace!(key = %key, width = image.width(), height = image.height(), from_cache, "Image decoded");
                let _ = tx.send(FetchedImage { image, from_cache });
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Image decode failed");
                self.events.error(err);
            }
        }
    }

    /// Publishes an activity transition if the pool changed state.
    fn sync_activity(&self, state: &mut State) {
        if let Some(active) = state.pool.take_activity_change() {
            debug!(active, "Network activity changed");
            self.events.activity(active);
        }
    }
}

/// Extracts the message of a panic payload.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map_or_else(|| "unknown panic".to_string(), |s| s.to_string()),
    }
}
