//! Controllable transports for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{BoxFuture, FetchRequest, ProgressSink, Transport, TransportError};
use crate::key::ResourceKey;

enum Step {
    Progress(u64, Option<u64>),
    Finish(Result<Bytes, TransportError>),
}

/// A fetch started by [`GatedTransport`], completed explicitly by the test.
pub(crate) struct PendingFetch {
    pub request: FetchRequest,
    steps: mpsc::UnboundedSender<Step>,
}

impl PendingFetch {
    pub fn key(&self) -> &ResourceKey {
        &self.request.key
    }

    pub fn progress(&self, received: u64, total: Option<u64>) {
        let _ = self.steps.send(Step::Progress(received, total));
    }

    pub fn succeed(self, data: impl Into<Bytes>) {
        let _ = self.steps.send(Step::Finish(Ok(data.into())));
    }

    pub fn fail(self, err: TransportError) {
        let _ = self.steps.send(Step::Finish(Err(err)));
    }
}

/// Transport whose fetches block until the test completes them.
///
/// Every started fetch is announced on the receiver returned by `new`.
pub(crate) struct GatedTransport {
    started: mpsc::UnboundedSender<PendingFetch>,
    calls: AtomicUsize,
}

impl GatedTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PendingFetch>) {
        let (started, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                started,
                calls: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for GatedTransport {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
        progress: &'a ProgressSink,
    ) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _ = self.started.send(PendingFetch {
            request: request.clone(),
            steps: tx,
        });

        Box::pin(async move {
            while let Some(step) = rx.recv().await {
                match step {
                    Step::Progress(received, total) => progress.report(received, total),
                    Step::Finish(result) => return result,
                }
            }
            Err(TransportError::Aborted)
        })
    }
}

/// Transport answering immediately from a fixed table.
///
/// Unknown keys fail with HTTP 404. Keys registered with `panics_on` panic
/// mid-fetch. Fetch counts are recorded per key.
pub(crate) struct StaticTransport {
    responses: HashMap<ResourceKey, Bytes>,
    panics: HashSet<ResourceKey>,
    calls: Mutex<HashMap<ResourceKey, usize>>,
}

impl StaticTransport {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            panics: HashSet::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with(mut self, key: &str, data: impl Into<Bytes>) -> Self {
        self.responses.insert(ResourceKey::new(key), data.into());
        self
    }

    pub fn panics_on(mut self, key: &str) -> Self {
        self.panics.insert(ResourceKey::new(key));
        self
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls
            .lock()
            .get(&ResourceKey::new(key))
            .copied()
            .unwrap_or(0)
    }
}

impl Transport for StaticTransport {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
        progress: &'a ProgressSink,
    ) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        *self.calls.lock().entry(request.key.clone()).or_insert(0) += 1;
        let response = self.responses.get(&request.key).cloned();
        let panics = self.panics.contains(&request.key);

        Box::pin(async move {
            if panics {
                progress.report(1, Some(2));
                panic!("transport failure for {}", request.key);
            }
            match response {
                Some(data) => {
                    let len = data.len() as u64;
                    progress.report(len / 2, Some(len));
                    progress.report(len, Some(len));
                    Ok(data)
                }
                None => Err(TransportError::Status {
                    status: 404,
                    url: request.key.to_string(),
                }),
            }
        })
    }
}
