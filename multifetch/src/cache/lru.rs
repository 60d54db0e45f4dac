//! Exact LRU-by-size byte cache.
//!
//! Every access stamps the entry with a monotonically increasing tick. The
//! recency index maps ticks to keys, so the oldest entry is always the first
//! element of the index and eviction order is fully deterministic. Ties
//! cannot occur: two accesses never share a tick, and insertion order breaks
//! what would otherwise be a tie.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use tracing::trace;

use super::stats::CacheStats;
use crate::key::ResourceKey;

/// Outcome of a [`ByteLruCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The blob was stored after evicting `evicted` entries.
    Stored { evicted: usize },
    /// The blob is larger than the whole budget and was not stored.
    TooLarge,
}

#[derive(Debug)]
struct CacheEntry {
    data: Bytes,
    tick: u64,
}

/// Byte-bounded cache with least-recently-used eviction.
///
/// Invariant: `size_bytes() <= max_size_bytes()` after every `put` and every
/// `set_max_size`.
#[derive(Debug)]
pub struct ByteLruCache {
    entries: HashMap<ResourceKey, CacheEntry>,
    recency: BTreeMap<u64, ResourceKey>,
    next_tick: u64,
    size_bytes: u64,
    max_size_bytes: u64,
    stats: CacheStats,
}

impl ByteLruCache {
    /// Creates an empty cache holding at most `max_size_bytes`.
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            size_bytes: 0,
            max_size_bytes,
            stats: CacheStats::new(),
        }
    }

    /// Looks up a blob and marks it as most recently used.
    pub fn get(&mut self, key: &ResourceKey) -> Option<Bytes> {
        let tick = self.next_tick;
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.next_tick += 1;
                self.recency.remove(&entry.tick);
                entry.tick = tick;
                self.recency.insert(tick, key.clone());
                self.stats.hits += 1;
                Some(entry.data.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Looks up a blob without touching recency or statistics.
    pub fn peek(&self, key: &ResourceKey) -> Option<&Bytes> {
        self.entries.get(key).map(|entry| &entry.data)
    }

    /// Returns true if the key is cached.
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores a blob, evicting least-recently-used entries as needed.
    ///
    /// A blob larger than the budget is not stored; any previous entry for the
    /// same key is dropped so a stale copy is never served.
    pub fn put(&mut self, key: ResourceKey, data: Bytes) -> PutOutcome {
        let size = data.len() as u64;
        self.remove(&key);

        if size > self.max_size_bytes {
            self.stats.skipped += 1;
            trace!(key = %key, size, limit = self.max_size_bytes, "Blob exceeds cache budget");
            return PutOutcome::TooLarge;
        }

        let evicted = self.evict_until_fits(size);

        let tick = self.next_tick;
        self.next_tick += 1;
        self.recency.insert(tick, key.clone());
        self.entries.insert(key, CacheEntry { data, tick });
        self.size_bytes += size;

        PutOutcome::Stored { evicted }
    }

    /// Removes an entry. Returns true if it existed.
    pub fn remove(&mut self, key: &ResourceKey) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.tick);
                self.size_bytes -= entry.data.len() as u64;
                true
            }
            None => false,
        }
    }

    /// Changes the budget, evicting immediately if the cache is now over it.
    ///
    /// Returns the number of entries evicted.
    pub fn set_max_size(&mut self, max_size_bytes: u64) -> usize {
        self.max_size_bytes = max_size_bytes;
        self.evict_until_fits(0)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes currently stored.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Configured budget in bytes.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> impl Iterator<Item = &ResourceKey> {
        self.recency.values()
    }

    fn evict_until_fits(&mut self, incoming: u64) -> usize {
        let mut evicted = 0;
        while self.size_bytes + incoming > self.max_size_bytes {
            let Some((_, key)) = self.recency.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.size_bytes -= entry.data.len() as u64;
                self.stats.evictions += 1;
                evicted += 1;
                trace!(key = %key, freed = entry.data.len(), "Evicted cache entry");
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new(format!("https://example.com/{}", name))
    }

    fn blob(len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }

    #[test]
    fn test_put_and_get() {
        let mut cache = ByteLruCache::new(1000);
        assert_eq!(
            cache.put(key("a"), Bytes::from_static(b"hello")),
            PutOutcome::Stored { evicted: 0 }
        );

        assert_eq!(cache.get(&key("a")), Some(Bytes::from_static(b"hello")));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), 5);
    }

    #[test]
    fn test_miss() {
        let mut cache = ByteLruCache::new(1000);
        assert_eq!(cache.get(&key("missing")), None);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_eviction_makes_room() {
        let mut cache = ByteLruCache::new(100);
        cache.put(key("a"), blob(60));

        let outcome = cache.put(key("b"), blob(50));

        assert_eq!(outcome, PutOutcome::Stored { evicted: 1 });
        assert!(!cache.contains(&key("a")));
        assert!(cache.contains(&key("b")));
        assert_eq!(cache.size_bytes(), 50);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut cache = ByteLruCache::new(100);
        cache.put(key("a"), blob(40));
        cache.put(key("b"), blob(40));

        // Touch "a" so that "b" becomes the eviction candidate
        cache.get(&key("a"));
        cache.put(key("c"), blob(40));

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
    }

    #[test]
    fn test_peek_does_not_refresh_recency() {
        let mut cache = ByteLruCache::new(100);
        cache.put(key("a"), blob(40));
        cache.put(key("b"), blob(40));

        assert!(cache.peek(&key("a")).is_some());
        cache.put(key("c"), blob(40));

        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_insertion_order_breaks_ties() {
        let mut cache = ByteLruCache::new(30);
        cache.put(key("first"), blob(10));
        cache.put(key("second"), blob(10));
        cache.put(key("third"), blob(10));

        let order: Vec<_> = cache.keys_by_recency().cloned().collect();
        assert_eq!(order, vec![key("first"), key("second"), key("third")]);

        cache.put(key("fourth"), blob(10));
        assert!(!cache.contains(&key("first")));
        assert!(cache.contains(&key("second")));
    }

    #[test]
    fn test_too_large_is_skipped() {
        let mut cache = ByteLruCache::new(100);
        cache.put(key("small"), blob(10));

        assert_eq!(cache.put(key("huge"), blob(101)), PutOutcome::TooLarge);

        assert!(!cache.contains(&key("huge")));
        assert!(cache.contains(&key("small")));
        assert_eq!(cache.size_bytes(), 10);
        assert_eq!(cache.stats().skipped, 1);
    }

    #[test]
    fn test_exactly_at_limit_is_stored() {
        let mut cache = ByteLruCache::new(100);
        assert_eq!(
            cache.put(key("full"), blob(100)),
            PutOutcome::Stored { evicted: 0 }
        );
        assert_eq!(cache.size_bytes(), 100);
    }

    #[test]
    fn test_replace_existing_updates_size() {
        let mut cache = ByteLruCache::new(100);
        cache.put(key("a"), blob(30));
        cache.put(key("a"), blob(70));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), 70);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_oversized_replacement_drops_stale_entry() {
        let mut cache = ByteLruCache::new(100);
        cache.put(key("a"), blob(30));
        cache.put(key("a"), blob(200));

        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn test_shrinking_limit_evicts_immediately() {
        let mut cache = ByteLruCache::new(100);
        cache.put(key("a"), blob(30));
        cache.put(key("b"), blob(30));
        cache.put(key("c"), blob(30));

        let evicted = cache.set_max_size(50);

        assert_eq!(evicted, 2);
        assert_eq!(cache.size_bytes(), 30);
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.max_size_bytes(), 50);
    }

    #[test]
    fn test_zero_limit_stores_nothing_nonempty() {
        let mut cache = ByteLruCache::new(0);
        assert_eq!(cache.put(key("a"), blob(1)), PutOutcome::TooLarge);
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_limit(
            limit in 0u64..512,
            ops in prop::collection::vec((0u8..8, 0usize..200, any::<bool>()), 1..64),
        ) {
            let mut cache = ByteLruCache::new(limit);
            for (name, len, read) in ops {
                let k = key(&name.to_string());
                if read {
                    cache.get(&k);
                } else {
                    cache.put(k, blob(len));
                }
                prop_assert!(cache.size_bytes() <= limit);

                let stored: u64 = cache
                    .keys_by_recency()
                    .map(|k| cache.peek(k).map_or(0, |b| b.len() as u64))
                    .sum();
                prop_assert_eq!(stored, cache.size_bytes());
                prop_assert_eq!(cache.keys_by_recency().count(), cache.len());
            }
        }
    }
}
