//! Byte cache for fetched resources.
//!
//! The cache is keyed by [`ResourceKey`](crate::ResourceKey) and bounded by a
//! byte budget. When an insertion would exceed the budget, least-recently-used
//! entries are evicted first; an entry larger than the whole budget is not
//! stored at all.
//!
//! The cache is not thread-safe on its own. The download manager keeps it
//! inside its single state lock together with the queue and the in-flight
//! registry, so every mutation is serialized.

mod lru;
mod stats;

pub use lru::{ByteLruCache, PutOutcome};
pub use stats::CacheStats;
