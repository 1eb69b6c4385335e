//! Cache Statistics Module
//!
//! Tracks lookups, stores and evictions for one cache over one run.

use serde::Serialize;

// == Cache Stats ==
/// Counters for a single result cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that fell through to the provider
    pub misses: u64,
    /// Values written (fresh inserts and overwrites)
    pub stores: u64,
    /// Entries removed by the eviction policy
    pub evictions: u64,
    /// Entries restored from the backing store at open
    pub loaded: usize,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_store(&mut self) {
        self.stores += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn set_loaded(&mut self, count: usize) {
        self.loaded = count;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats, CacheStats::default());
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_hit_rate_all_misses() {
        let mut stats = CacheStats::new();
        stats.record_miss();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_counters() {
        let mut stats = CacheStats::new();
        stats.record_store();
        stats.record_eviction();
        stats.record_eviction();
        stats.set_loaded(12);
        stats.set_total_entries(10);

        assert_eq!(stats.stores, 1);
        assert_eq!(stats.evictions, 2);
        assert_eq!(stats.loaded, 12);
        assert_eq!(stats.total_entries, 10);
    }
}
