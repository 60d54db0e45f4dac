//! Scheduling primitives for the download manager.
//!
//! - [`RequestQueue`]: FIFO of admitted requests waiting for a worker slot
//! - [`InFlightRegistry`]: one entry per resource being fetched, holding every
//!   waiter for that resource
//! - [`WorkerPool`]: slot accounting and idle/busy transitions
//!
//! None of these types synchronize internally. The manager owns them inside a
//! single lock, which is what makes dispatch and deduplication race-free.

mod pool;
mod queue;
mod registry;

use bytes::Bytes;
use tokio::sync::oneshot;

pub use pool::{WorkerPool, MIN_WORKERS};
pub use queue::{QueuedRequest, RequestQueue};
pub use registry::{FetchId, InFlightEntry, InFlightRegistry};

/// Bytes handed to a waiting caller.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The resource body.
    pub data: Bytes,
    /// True if the bytes were served from the cache rather than the network.
    pub from_cache: bool,
}

impl Delivery {
    pub(crate) fn cached(data: Bytes) -> Self {
        Self {
            data,
            from_cache: true,
        }
    }

    pub(crate) fn fetched(data: Bytes) -> Self {
        Self {
            data,
            from_cache: false,
        }
    }
}

/// One-shot sender for a caller's result.
///
/// Sending consumes the waiter, so a caller can be answered at most once.
/// Dropping it without sending is how failures and cancellations are
/// expressed.
pub type Waiter = oneshot::Sender<Delivery>;
