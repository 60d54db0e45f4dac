//! FIFO queue of admitted requests.
//!
//! Requests leave the queue strictly in admission order. There is no priority
//! reordering; each request carries a sequence number so the order is
//! observable and testable.
//!
//! # Example
//!
//! ```ignore
//! use multifetch::scheduler::RequestQueue;
//!
//! let mut queue = RequestQueue::new();
//! queue.push(key_a, waiter_a);
//! queue.push(key_b, waiter_b);
//!
//! // key_a comes out first
//! let next = queue.pop();
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::Waiter;
use crate::key::ResourceKey;

// =============================================================================
// Queued Request
// =============================================================================

/// A request waiting for a worker slot.
pub struct QueuedRequest {
    /// The resource requested.
    pub key: ResourceKey,

    /// Where the result goes.
    pub waiter: Waiter,

    /// Admission sequence number (lower = older).
    pub sequence: u64,

    /// When the request was admitted (for wait time telemetry).
    pub enqueued_at: Instant,
}

impl QueuedRequest {
    /// Returns how long this request has been waiting.
    pub fn wait_time(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("key", &self.key)
            .field("sequence", &self.sequence)
            .field("waiter_closed", &self.waiter.is_closed())
            .finish()
    }
}

// =============================================================================
// Request Queue
// =============================================================================

/// FIFO queue of requests awaiting dispatch.
#[derive(Debug, Default)]
pub struct RequestQueue {
    requests: VecDeque<QueuedRequest>,
    next_sequence: u64,
}

impl RequestQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request and returns its sequence number.
    pub fn push(&mut self, key: ResourceKey, waiter: Waiter) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.requests.push_back(QueuedRequest {
            key,
            waiter,
            sequence,
            enqueued_at: Instant::now(),
        });
        sequence
    }

    /// Removes and returns the oldest request.
    pub fn pop(&mut self) -> Option<QueuedRequest> {
        self.requests.pop_front()
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Drops every queued request without answering it.
    ///
    /// Returns the number of requests dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.requests.len();
        self.requests.clear();
        dropped
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn waiter() -> Waiter {
        oneshot::channel().0
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = RequestQueue::new();

        queue.push(ResourceKey::new("first"), waiter());
        queue.push(ResourceKey::new("second"), waiter());
        queue.push(ResourceKey::new("third"), waiter());

        assert_eq!(queue.pop().unwrap().key.as_str(), "first");
        assert_eq!(queue.pop().unwrap().key.as_str(), "second");
        assert_eq!(queue.pop().unwrap().key.as_str(), "third");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let mut queue = RequestQueue::new();
        let a = queue.push(ResourceKey::new("a"), waiter());
        let b = queue.push(ResourceKey::new("b"), waiter());
        assert!(a < b);
        assert_eq!(queue.pop().unwrap().sequence, a);
    }

    #[test]
    fn test_queue_operations() {
        let mut queue = RequestQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);

        queue.push(ResourceKey::new("a"), waiter());
        queue.push(ResourceKey::new("a"), waiter());
        queue.push(ResourceKey::new("b"), waiter());

        assert_eq!(queue.len(), 3);
        assert!(!queue.is_empty());

        let keys: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|r| r.key.as_str().to_string())
            .collect();
        assert_eq!(keys, vec!["a", "a", "b"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_clear_drops_waiters_unanswered() {
        let mut queue = RequestQueue::new();
        let (tx, rx) = oneshot::channel();
        queue.push(ResourceKey::new("a"), tx);

        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_wait_time() {
        let mut queue = RequestQueue::new();
        queue.push(ResourceKey::new("a"), waiter());
        std::thread::sleep(Duration::from_millis(10));
        assert!(queue.pop().unwrap().wait_time() >= Duration::from_millis(10));
    }
}
