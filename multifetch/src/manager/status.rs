//! Point-in-time view of the manager's scheduling state.

use std::fmt;

/// Snapshot returned by [`DownloadManager::status`](crate::DownloadManager::status).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStatus {
    /// Transports currently running.
    pub active: usize,
    /// Cancelled transports whose tasks have not exited yet.
    pub draining: usize,
    /// Requests waiting for a worker slot.
    pub queued: usize,
    /// Distinct resources being fetched.
    pub in_flight: usize,
    /// Highest number of simultaneously running transports so far.
    pub peak_active: usize,
    /// Configured concurrency limit.
    pub max_threads: usize,
    /// Entries in the cache.
    pub cache_entries: usize,
    /// Bytes in the cache.
    pub cache_bytes: u64,
    /// Cache budget in bytes.
    pub cache_limit: u64,
}

impl ManagerStatus {
    /// Returns true when nothing is queued or running.
    ///
    /// Draining transports are not counted; they deliver nothing.
    pub fn is_idle(&self) -> bool {
        self.active == 0 && self.queued == 0
    }
}

impl fmt::Display for ManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} active, {} queued, cache {}/{} bytes in {} entries",
            self.active,
            self.max_threads,
            self.queued,
            self.cache_bytes,
            self.cache_limit,
            self.cache_entries
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle() {
        assert!(ManagerStatus::default().is_idle());
        let busy = ManagerStatus {
            active: 1,
            ..Default::default()
        };
        assert!(!busy.is_idle());
    }

    #[test]
    fn test_display() {
        let status = ManagerStatus {
            active: 2,
            queued: 1,
            max_threads: 2,
            cache_bytes: 50,
            cache_limit: 100,
            cache_entries: 1,
            ..Default::default()
        };
        assert_eq!(
            status.to_string(),
            "2/2 active, 1 queued, cache 50/100 bytes in 1 entries"
        );
    }
}
