//! Download events: progress, network activity and errors.
//!
//! Each [`EventReceiver`] gets its own queue, so a subscriber that stops
//! polling never causes another to miss anything. Subscribing is optional;
//! with no subscriber every event is dropped silently.
//!
//! Guarantees:
//! - `Activity` and `Error` are never dropped. `Activity(true)` and
//!   `Activity(false)` strictly alternate, starting with `true`.
//! - `Progress` fractions are in `[0.0, 1.0]` and non-decreasing per fetch.
//!   A subscriber holding `capacity` undelivered progress events misses
//!   further progress until it catches up.
//! - `Error` is published once per failed fetch or failed decode.
//! - Nothing concerning a request cancelled by `clear_queue` is published
//!   after `clear_queue` returns.
//! - Each subscriber sees events in publication order.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::DownloadError;
use crate::key::ResourceKey;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Default number of undelivered progress events kept per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// An observable event emitted by the download manager.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// A transport reported progress for an in-flight resource.
    Progress {
        /// The resource being fetched.
        key: ResourceKey,
        /// Completed fraction in `[0.0, 1.0]`.
        fraction: f64,
    },

    /// The pool went from idle to busy (`true`) or back (`false`).
    Activity(bool),

    /// A fetch or decode failed.
    Error(DownloadError),
}

/// Per-subscriber progress accounting shared by the bus and the receiver.
#[derive(Debug, Default)]
struct ProgressBudget {
    pending: AtomicUsize,
    dropped: AtomicU64,
}

#[derive(Debug)]
struct Subscriber {
    tx: mpsc::UnboundedSender<DownloadEvent>,
    budget: Arc<ProgressBudget>,
}

impl Subscriber {
    /// Returns false once the receiver is gone.
    fn deliver(&self, event: &DownloadEvent, capacity: usize) -> bool {
        if matches!(event, DownloadEvent::Progress { .. }) {
            if self.budget.pending.load(Ordering::Acquire) >= capacity {
                self.budget.dropped.fetch_add(1, Ordering::Relaxed);
                return !self.tx.is_closed();
            }
            self.budget.pending.fetch_add(1, Ordering::AcqRel);
        }
        self.tx.send(event.clone()).is_ok()
    }
}

/// Publisher for [`DownloadEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
}

impl EventBus {
    /// Creates a bus keeping up to `capacity` progress events per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns a receiver for events published from now on.
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let budget = Arc::new(ProgressBudget::default());
        self.subscribers.lock().push(Subscriber {
            tx,
            budget: Arc::clone(&budget),
        });
        EventReceiver { rx, budget }
    }

    /// Publishes an event to every live subscriber. Never blocks.
    pub fn emit(&self, event: DownloadEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| subscriber.deliver(&event, self.capacity));
        if subscribers.is_empty() {
            trace!("No event subscribers");
        }
    }

    pub(crate) fn progress(&self, key: ResourceKey, fraction: f64) {
        self.emit(DownloadEvent::Progress { key, fraction });
    }

    pub(crate) fn activity(&self, active: bool) {
        self.emit(DownloadEvent::Activity(active));
    }

    pub(crate) fn error(&self, error: DownloadError) {
        self.emit(DownloadEvent::Error(error));
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Receiving end of a subscription.
///
/// Dropping it unsubscribes.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<DownloadEvent>,
    budget: Arc<ProgressBudget>,
}

impl EventReceiver {
    /// Waits for the next event. Returns `None` once the manager is gone.
    pub async fn recv(&mut self) -> Option<DownloadEvent> {
        let event = self.rx.recv().await;
        self.account(event.as_ref());
        event
    }

    /// Returns the next event if one is ready.
    pub fn try_recv(&mut self) -> Result<DownloadEvent, TryRecvError> {
        let event = self.rx.try_recv();
        self.account(event.as_ref().ok());
        event
    }

    /// Progress events skipped because this subscriber fell behind.
    pub fn dropped_progress(&self) -> u64 {
        self.budget.dropped.load(Ordering::Relaxed)
    }

    fn account(&self, event: Option<&DownloadEvent>) {
        if let Some(DownloadEvent::Progress { .. }) = event {
            self.budget.pending.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.activity(true);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.activity(true);
        bus.progress(ResourceKey::new("a"), 0.5);
        bus.activity(false);

        assert!(matches!(rx.recv().await, Some(DownloadEvent::Activity(true))));
        assert!(matches!(
            rx.recv().await,
            Some(DownloadEvent::Progress { fraction, .. }) if fraction == 0.5
        ));
        assert!(matches!(rx.recv().await, Some(DownloadEvent::Activity(false))));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.progress(ResourceKey::new("a"), 0.1);
        assert!(matches!(rx.try_recv(), Ok(DownloadEvent::Progress { .. })));
    }

    #[test]
    fn test_slow_subscriber_keeps_signals_and_sheds_progress() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        bus.activity(true);
        for i in 0..100 {
            bus.progress(ResourceKey::new("big"), i as f64 / 100.0);
        }
        bus.error(DownloadError::Runtime("boom".to_string()));
        bus.activity(false);

        let mut progress = 0;
        let mut signals = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                DownloadEvent::Progress { .. } => progress += 1,
                DownloadEvent::Activity(active) => signals.push(format!("activity:{}", active)),
                DownloadEvent::Error(_) => signals.push("error".to_string()),
            }
        }

        assert_eq!(progress, 4);
        assert_eq!(rx.dropped_progress(), 96);
        assert_eq!(signals, vec!["activity:true", "error", "activity:false"]);
    }

    #[test]
    fn test_progress_budget_refills_after_draining() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();

        bus.progress(ResourceKey::new("a"), 0.1);
        bus.progress(ResourceKey::new("a"), 0.2);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        bus.progress(ResourceKey::new("a"), 0.3);
        assert!(matches!(
            rx.try_recv(),
            Ok(DownloadEvent::Progress { fraction, .. }) if fraction == 0.3
        ));
        assert_eq!(rx.dropped_progress(), 1);
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::default();
        let rx = bus.subscribe();
        let _kept = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx);
        bus.activity(true);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_each_subscriber_has_its_own_budget() {
        let bus = EventBus::new(2);
        let mut fast = bus.subscribe();
        let mut slow = bus.subscribe();

        for i in 0..3 {
            bus.progress(ResourceKey::new("a"), i as f64 / 10.0);
            assert!(fast.try_recv().is_ok());
        }

        let mut slow_count = 0;
        while slow.try_recv().is_ok() {
            slow_count += 1;
        }
        assert_eq!(slow_count, 2);
        assert_eq!(fast.dropped_progress(), 0);
        assert_eq!(slow.dropped_progress(), 1);
    }
}
