//! Cache statistics.

use std::fmt;

/// Counters describing cache effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries removed to make room or after the limit shrank.
    pub evictions: u64,
    /// Insertions skipped because the blob exceeded the whole budget.
    pub skipped: u64,
}

impl CacheStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of lookups that were hits, or 0.0 with no lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hits, {} misses ({:.1}% hit rate), {} evictions, {} skipped",
            self.hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_empty() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display() {
        let stats = CacheStats {
            hits: 1,
            misses: 1,
            evictions: 2,
            skipped: 3,
        };
        let display = stats.to_string();
        assert!(display.contains("50.0%"));
        assert!(display.contains("2 evictions"));
        assert!(display.contains("3 skipped"));
    }
}
