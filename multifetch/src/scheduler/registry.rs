//! In-flight registry for request coalescing.
//!
//! Holds one [`InFlightEntry`] per resource key currently being fetched. A
//! request for a key that already has an entry is attached to it instead of
//! starting a second fetch, so there is at most one transport per key at any
//! instant. When the fetch finishes, every attached waiter is answered in the
//! order it was attached.
//!
//! Each entry carries a [`FetchId`]. Completions and progress reports quote
//! the id they were started with; a report whose id no longer matches (the
//! entry was cancelled, possibly replaced by a newer fetch of the same key)
//! is ignored.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::Waiter;
use crate::key::ResourceKey;

/// Smallest progress advance worth publishing.
pub const PROGRESS_STEP: f64 = 0.01;

/// Identifies one fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchId(u64);

impl fmt::Display for FetchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fetch-{}", self.0)
    }
}

/// A resource being fetched and everyone waiting for it.
pub struct InFlightEntry {
    /// The fetch attempt this entry belongs to.
    pub fetch_id: FetchId,
    /// Waiters in registration order.
    pub waiters: Vec<Waiter>,
    /// Cancels the transport task.
    pub cancel: CancellationToken,
    /// When the fetch was dispatched.
    pub started_at: Instant,
    /// Last progress fraction published, if any.
    pub progress: Option<f64>,
}

impl InFlightEntry {
    /// Time since dispatch.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl fmt::Debug for InFlightEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightEntry")
            .field("fetch_id", &self.fetch_id)
            .field("waiters", &self.waiters.len())
            .field("progress", &self.progress)
            .finish()
    }
}

/// Registry of in-flight fetches keyed by resource.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    entries: HashMap<ResourceKey, InFlightEntry>,
    next_id: u64,
}

impl InFlightRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new fetch for `key` with its first waiter.
    ///
    /// The caller must have checked that no entry exists; any previous entry
    /// would be cancelled and its waiters dropped.
    pub fn begin(&mut self, key: ResourceKey, waiter: Waiter) -> (FetchId, CancellationToken) {
        let fetch_id = FetchId(self.next_id);
        self.next_id += 1;
        let cancel = CancellationToken::new();

        let previous = self.entries.insert(
            key,
            InFlightEntry {
                fetch_id,
                waiters: vec![waiter],
                cancel: cancel.clone(),
                started_at: Instant::now(),
                progress: None,
            },
        );
        if let Some(previous) = previous {
            debug_assert!(false, "begin() called for a key already in flight");
            previous.cancel.cancel();
        }

        (fetch_id, cancel)
    }

    /// Attaches a waiter to an existing fetch.
    ///
    /// Returns the number of waiters now attached, or gives the waiter back if
    /// `key` is not in flight.
    pub fn attach(&mut self, key: &ResourceKey, waiter: Waiter) -> Result<usize, Waiter> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.waiters.push(waiter);
                Ok(entry.waiters.len())
            }
            None => Err(waiter),
        }
    }

    /// Records transport progress for a fetch.
    ///
    /// Returns the fraction to publish when it advances at least
    /// [`PROGRESS_STEP`] past the last published value, or first reaches 1.0.
    /// Nothing is returned when the expected length is unknown, when the
    /// advance is smaller than that, or when `fetch_id` is stale.
    pub fn record_progress(
        &mut self,
        key: &ResourceKey,
        fetch_id: FetchId,
        received: u64,
        total: Option<u64>,
    ) -> Option<f64> {
        let entry = self.entries.get_mut(key)?;
        if entry.fetch_id != fetch_id {
            return None;
        }

        let total = total?;
        let fraction = if total == 0 {
            1.0
        } else {
            (received as f64 / total as f64).clamp(0.0, 1.0)
        };

        match entry.progress {
            Some(last) if fraction <= last => None,
            Some(last) if fraction < 1.0 && fraction - last < PROGRESS_STEP => None,
            _ => {
                entry.progress = Some(fraction);
                Some(fraction)
            }
        }
    }

    /// Removes the entry for a finished fetch.
    ///
    /// Returns `None` if the entry is gone or belongs to a different fetch.
    pub fn finish(&mut self, key: &ResourceKey, fetch_id: FetchId) -> Option<InFlightEntry> {
        match self.entries.get(key) {
            Some(entry) if entry.fetch_id == fetch_id => self.entries.remove(key),
            _ => None,
        }
    }

    /// Cancels every fetch and drops all waiters unanswered.
    ///
    /// Returns the number of fetches cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.cancel.cancel();
        }
        cancelled
    }

    /// Number of fetches in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.contains_key(key)
    }

    #[cfg(test)]
    fn waiter_count(&self, key: &ResourceKey) -> usize {
        self.entries.get(key).map_or(0, |e| e.waiters.len())
    }
}
