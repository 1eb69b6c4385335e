//! Result Cache Module
//!
//! Main cache engine combining HashMap storage with a policy-ordered eviction
//! index and an optional on-disk journal.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::cache::{
    CacheEntry, CacheJournal, CacheStats, EvictionIndex, EvictionPolicy, JournalRecord,
};
use crate::error::Result;
use crate::models::{GeocodeMode, Key, Value};

// == Cache Settings ==
/// How a run's cache is built.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// When false the cache is a pass-through that never stores anything
    pub enabled: bool,
    /// Maximum entry count; zero or negative keeps the cache empty
    pub size_limit: i64,
    pub policy: EvictionPolicy,
    /// Directory holding the journal; None keeps the cache in memory only
    pub location: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            size_limit: crate::cache::DEFAULT_SIZE_LIMIT,
            policy: EvictionPolicy::default(),
            location: None,
        }
    }
}

// == Result Cache ==
/// Size-bounded store of provider answers for one geocoding mode.
///
/// Size is measured in entries. A cache is opened once per run and closed
/// exactly once; dropping it without calling [`ResultCache::close`] closes it
/// and logs any failure.
#[derive(Debug)]
pub struct ResultCache {
    mode: GeocodeMode,
    enabled: bool,
    /// Key-value storage
    entries: HashMap<Key, CacheEntry>,
    /// Eviction order for the configured policy
    index: EvictionIndex,
    stats: CacheStats,
    size_limit: i64,
    next_sequence: u64,
    journal: Option<CacheJournal>,
    closed: bool,
}

impl ResultCache {
    // == Constructors ==
    /// Creates an empty, enabled cache with no backing store.
    pub fn in_memory(mode: GeocodeMode, size_limit: i64, policy: EvictionPolicy) -> Self {
        Self {
            mode,
            enabled: true,
            entries: HashMap::new(),
            index: EvictionIndex::new(policy),
            stats: CacheStats::new(),
            size_limit,
            next_sequence: 0,
            journal: None,
            closed: false,
        }
    }

    /// Creates a pass-through cache: every lookup misses, every store is dropped.
    pub fn disabled(mode: GeocodeMode) -> Self {
        let mut cache = Self::in_memory(mode, 0, EvictionPolicy::default());
        cache.enabled = false;
        cache
    }

    /// Builds the cache described by `settings`, replaying its journal when
    /// a location is set.
    pub fn open(mode: GeocodeMode, settings: &CacheSettings) -> Result<Self> {
        if !settings.enabled {
            info!("Result cache disabled for {} geocoding", mode);
            return Ok(Self::disabled(mode));
        }

        let mut cache = Self::in_memory(mode, settings.size_limit, settings.policy);

        if let Some(dir) = &settings.location {
            let (journal, records) = CacheJournal::open(dir, mode)?;
            cache.replay(records);
            cache.journal = Some(journal);
            // the configured limit may be smaller than the persisted set
            cache.enforce_limit();
            cache.compact_if_needed();
            cache.stats.set_total_entries(cache.entries.len());
            info!(
                "Opened {} cache at {} with {} entries (limit={}, policy={})",
                mode,
                dir.display(),
                cache.entries.len(),
                settings.size_limit,
                settings.policy
            );
        } else {
            info!(
                "Opened in-memory {} cache (limit={}, policy={})",
                mode, settings.size_limit, settings.policy
            );
        }

        Ok(cache)
    }

    fn replay(&mut self, records: Vec<JournalRecord>) {
        for record in records {
            match record {
                JournalRecord::Upsert(entry) => {
                    if entry.key.mode() != self.mode || entry.value.mode() != self.mode {
                        warn!("Ignoring persisted entry for {} in {} cache", entry.key, self.mode);
                        continue;
                    }
                    if let Some(previous) = self.entries.remove(&entry.key) {
                        self.index.remove(&previous);
                    }
                    self.next_sequence = self.next_sequence.max(entry.insertion_sequence + 1);
                    self.index.insert(&entry);
                    self.entries.insert(entry.key.clone(), entry);
                }
                JournalRecord::Evict { key } => {
                    if let Some(previous) = self.entries.remove(&key) {
                        self.index.remove(&previous);
                    }
                }
            }
        }
        self.stats.set_loaded(self.entries.len());
    }

    // == Get ==
    /// Looks up a previously stored answer.
    ///
    /// A hit bumps the entry's access count; the value itself is untouched.
    ///
    /// # Panics
    /// If `key` belongs to the other geocoding mode.
    pub fn get(&mut self, key: &Key) -> Option<Value> {
        self.check_key(key);

        if !self.enabled {
            self.stats.record_miss();
            return None;
        }

        match self.entries.get_mut(key) {
            Some(entry) => {
                self.index.remove(entry);
                entry.record_access();
                self.index.insert(entry);
                self.stats.record_hit();
                Some(entry.value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Put ==
    /// Stores an answer.
    ///
    /// A new key starts with no recorded accesses. An existing key gets the
    /// new value and a fresh insertion sequence but keeps its access count.
    /// Entries are then evicted one at a time until the cache is within its
    /// size limit.
    ///
    /// # Panics
    /// If `key` or `value` belongs to the other geocoding mode.
    pub fn put(&mut self, key: Key, value: Value) {
        self.check_key(&key);
        assert!(
            value.mode() == self.mode,
            "{} value stored in a {} cache",
            value.mode(),
            self.mode
        );

        if !self.enabled {
            return;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        match self.entries.get_mut(&key) {
            Some(entry) => {
                self.index.remove(entry);
                entry.restamp(value, sequence);
                self.index.insert(entry);
            }
            None => {
                let entry = CacheEntry::new(key.clone(), value, sequence);
                self.index.insert(&entry);
                self.entries.insert(key.clone(), entry);
            }
        }
        self.stats.record_store();

        if let (Some(journal), Some(entry)) = (self.journal.as_mut(), self.entries.get(&key)) {
            if let Err(e) = journal.append_upsert(entry) {
                warn!("Failed to journal cache entry for {}: {}", key, e);
            }
        }

        self.enforce_limit();
        self.compact_if_needed();
        self.stats.set_total_entries(self.entries.len());
    }

    fn enforce_limit(&mut self) {
        let limit = usize::try_from(self.size_limit).unwrap_or(0);

        while self.entries.len() > limit {
            let Some(victim) = self.index.evict_next() else {
                break;
            };
            if self.entries.remove(&victim).is_none() {
                continue;
            }
            self.stats.record_eviction();
            debug!("Evicted {} from {} cache", victim, self.mode);

            if let Some(journal) = self.journal.as_mut() {
                if let Err(e) = journal.append_evict(&victim) {
                    warn!("Failed to journal eviction of {}: {}", victim, e);
                }
            }
        }
    }

    /// Rewrites the journal mid-run once it is mostly dead records.
    fn compact_if_needed(&mut self) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if !journal.needs_compaction(self.entries.len()) {
            return;
        }

        let before = journal.record_count();
        match journal.compact(store_order(&self.entries)) {
            Ok(written) => debug!(
                "Compacted {} cache journal from {} to {} records",
                self.mode, before, written
            ),
            Err(e) => warn!("Failed to compact {} cache journal: {}", self.mode, e),
        }
    }

    fn check_key(&self, key: &Key) {
        assert!(
            key.mode() == self.mode,
            "{} key used with a {} cache",
            key.mode(),
            self.mode
        );
    }

    // == Close ==
    /// Flushes the backing store and releases it.
    ///
    /// Safe to call more than once; only the first call does any work.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let Some(mut journal) = self.journal.take() else {
            debug!("Closed {} cache with {} entries", self.mode, self.entries.len());
            return Ok(());
        };

        let written = journal.compact(store_order(&self.entries))?;

        info!(
            "Closed {} cache: {} entries written to {}",
            self.mode,
            written,
            journal.path().display()
        );
        Ok(())
    }

    // == Accessors ==
    pub fn mode(&self) -> GeocodeMode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.index.policy()
    }

    /// Returns a snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Reads an entry without counting it as an access.
    pub fn peek(&self, key: &Key) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in the backing journal since its last compaction, or None
    /// for a cache kept in memory.
    pub fn journal_len(&self) -> Option<usize> {
        self.journal.as_ref().map(CacheJournal::record_count)
    }
}

/// Live entries, oldest store first.
fn store_order(entries: &HashMap<Key, CacheEntry>) -> Vec<&CacheEntry> {
    let mut live: Vec<&CacheEntry> = entries.values().collect();
    live.sort_by_key(|entry| entry.insertion_sequence);
    live
}

impl Drop for ResultCache {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close {} cache: {}", self.mode, e);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinates, Feature, FeatureSet};
    use tempfile::TempDir;

    fn addr(s: &str) -> Key {
        Key::Address(s.to_string())
    }

    fn latlng(lat: f64, lng: f64) -> Value {
        Value::LatLng(Coordinates::new(lat, lng).unwrap())
    }

    fn forward(limit: i64, policy: EvictionPolicy) -> ResultCache {
        ResultCache::in_memory(GeocodeMode::Forward, limit, policy)
    }

    fn persisted(dir: &TempDir, limit: i64, policy: EvictionPolicy) -> CacheSettings {
        CacheSettings {
            enabled: true,
            size_limit: limit,
            policy,
            location: Some(dir.path().to_path_buf()),
        }
    }

    #[test]
    fn test_cache_new() {
        let cache = forward(10, EvictionPolicy::LeastRecentlyStored);
        assert!(cache.is_empty());
        assert!(cache.is_enabled());
    }

    #[test]
    fn test_put_and_get() {
        let mut cache = forward(10, EvictionPolicy::LeastRecentlyStored);

        cache.put(addr("a"), latlng(1.0, 2.0));

        assert_eq!(cache.get(&addr("a")), Some(latlng(1.0, 2.0)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let mut cache = forward(10, EvictionPolicy::LeastRecentlyStored);
        assert_eq!(cache.get(&addr("nope")), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_get_counts_access() {
        let mut cache = forward(10, EvictionPolicy::LeastRecentlyStored);
        cache.put(addr("a"), latlng(1.0, 2.0));

        cache.get(&addr("a"));
        cache.get(&addr("a"));

        assert_eq!(cache.peek(&addr("a")).unwrap().access_count, 2);
    }

    #[test]
    fn test_overwrite_keeps_count_and_access() {
        let mut cache = forward(10, EvictionPolicy::LeastFrequentlyUsed);
        cache.put(addr("a"), latlng(1.0, 2.0));
        cache.get(&addr("a"));
        let first_seq = cache.peek(&addr("a")).unwrap().insertion_sequence;

        cache.put(addr("a"), latlng(3.0, 4.0));

        let entry = cache.peek(&addr("a")).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(entry.value, latlng(3.0, 4.0));
        assert_eq!(entry.access_count, 1);
        assert!(entry.insertion_sequence > first_seq);
    }

    #[test]
    fn test_bounded_to_one_recently_stored() {
        let mut cache = forward(1, EvictionPolicy::LeastRecentlyStored);

        cache.put(addr("A"), latlng(1.0, 1.0));
        cache.put(addr("B"), latlng(2.0, 2.0));

        assert_eq!(cache.get(&addr("A")), None);
        assert_eq!(cache.get(&addr("B")), Some(latlng(2.0, 2.0)));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_recently_stored_ignores_reads() {
        let mut cache = forward(2, EvictionPolicy::LeastRecentlyStored);
        cache.put(addr("old"), latlng(1.0, 1.0));
        cache.put(addr("new"), latlng(2.0, 2.0));
        for _ in 0..5 {
            cache.get(&addr("old"));
        }

        cache.put(addr("newest"), latlng(3.0, 3.0));

        assert!(!cache.contains(&addr("old")));
        assert!(cache.contains(&addr("new")));
        assert!(cache.contains(&addr("newest")));
    }

    #[test]
    fn test_overwrite_refreshes_store_order() {
        let mut cache = forward(2, EvictionPolicy::LeastRecentlyStored);
        cache.put(addr("a"), latlng(1.0, 1.0));
        cache.put(addr("b"), latlng(2.0, 2.0));
        cache.put(addr("a"), latlng(1.5, 1.5));

        cache.put(addr("c"), latlng(3.0, 3.0));

        assert!(cache.contains(&addr("a")));
        assert!(!cache.contains(&addr("b")));
    }

    #[test]
    fn test_frequently_used_eviction() {
        let mut cache = forward(3, EvictionPolicy::LeastFrequentlyUsed);
        cache.put(addr("a"), latlng(1.0, 1.0));
        cache.put(addr("b"), latlng(2.0, 2.0));
        cache.put(addr("c"), latlng(3.0, 3.0));
        cache.get(&addr("a"));
        cache.get(&addr("c"));

        cache.put(addr("d"), latlng(4.0, 4.0));

        assert!(!cache.contains(&addr("b")));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_frequently_used_tie_evicts_oldest() {
        let mut cache = forward(2, EvictionPolicy::LeastFrequentlyUsed);
        cache.put(addr("a"), latlng(1.0, 1.0));
        cache.put(addr("b"), latlng(2.0, 2.0));

        cache.put(addr("c"), latlng(3.0, 3.0));

        assert!(!cache.contains(&addr("a")));
        assert!(cache.contains(&addr("b")));
    }

    #[test]
    fn test_non_positive_limit_stays_empty() {
        for limit in [0, -5] {
            let mut cache = forward(limit, EvictionPolicy::LeastRecentlyStored);
            cache.put(addr("a"), latlng(1.0, 1.0));

            assert!(cache.is_empty());
            assert_eq!(cache.get(&addr("a")), None);
            assert_eq!(cache.stats().evictions, 1);
        }
    }

    #[test]
    fn test_disabled_cache_is_pass_through() {
        let mut cache = ResultCache::disabled(GeocodeMode::Forward);

        cache.put(addr("a"), latlng(1.0, 1.0));

        assert!(!cache.is_enabled());
        assert!(cache.is_empty());
        assert_eq!(cache.get(&addr("a")), None);
        assert_eq!(cache.stats().stores, 0);
    }

    #[test]
    fn test_open_disabled_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let settings = CacheSettings {
            enabled: false,
            ..persisted(&dir, 10, EvictionPolicy::LeastRecentlyStored)
        };

        let mut cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
        cache.put(addr("a"), latlng(1.0, 1.0));
        cache.close().unwrap();

        assert!(!CacheJournal::path_for(dir.path(), GeocodeMode::Forward).exists());
    }

    #[test]
    #[should_panic(expected = "reverse key used with a forward cache")]
    fn test_wrong_key_variant_panics() {
        let mut cache = forward(10, EvictionPolicy::LeastRecentlyStored);
        let key = Key::Coordinates(Coordinates::new(1.0, 2.0).unwrap());
        cache.get(&key);
    }

    #[test]
    #[should_panic(expected = "reverse value stored in a forward cache")]
    fn test_wrong_value_variant_panics() {
        let mut cache = forward(10, EvictionPolicy::LeastRecentlyStored);
        cache.put(addr("a"), Value::Features(FeatureSet::new()));
    }

    #[test]
    fn test_persisted_round_trip() {
        let dir = TempDir::new().unwrap();
        let settings = persisted(&dir, 10, EvictionPolicy::LeastFrequentlyUsed);

        {
            let mut cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
            cache.put(addr("a"), latlng(1.0, 1.0));
            cache.put(addr("b"), latlng(2.0, 2.0));
            cache.get(&addr("b"));
            cache.close().unwrap();
        }

        let mut cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
        assert_eq!(cache.stats().loaded, 2);
        assert_eq!(cache.peek(&addr("b")).unwrap().access_count, 1);
        assert_eq!(cache.get(&addr("a")), Some(latlng(1.0, 1.0)));
    }

    #[test]
    fn test_drop_closes_cache() {
        let dir = TempDir::new().unwrap();
        let settings = persisted(&dir, 10, EvictionPolicy::LeastRecentlyStored);

        {
            let mut cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
            cache.put(addr("a"), latlng(1.0, 1.0));
        }

        let cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
        assert!(cache.contains(&addr("a")));
    }

    #[test]
    fn test_evictions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let settings = persisted(&dir, 1, EvictionPolicy::LeastRecentlyStored);

        {
            let mut cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
            cache.put(addr("a"), latlng(1.0, 1.0));
            cache.put(addr("b"), latlng(2.0, 2.0));
            // simulate a crash: the journal is flushed but never compacted
            cache.journal.as_mut().unwrap().flush().unwrap();
            cache.closed = true;
        }

        let cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
        assert!(!cache.contains(&addr("a")));
        assert!(cache.contains(&addr("b")));
    }

    #[test]
    fn test_reopen_with_smaller_limit_evicts() {
        let dir = TempDir::new().unwrap();

        {
            let settings = persisted(&dir, 10, EvictionPolicy::LeastRecentlyStored);
            let mut cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
            for name in ["a", "b", "c"] {
                cache.put(addr(name), latlng(1.0, 1.0));
            }
        }

        let settings = persisted(&dir, 2, EvictionPolicy::LeastRecentlyStored);
        let mut cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&addr("a")));

        // sequence numbering resumes above the persisted entries
        cache.put(addr("d"), latlng(1.0, 1.0));
        assert!(!cache.contains(&addr("b")));
    }

    #[test]
    fn test_reverse_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        let settings = persisted(&dir, 10, EvictionPolicy::LeastRecentlyStored);
        let key = Key::Coordinates(Coordinates::new(48.8444, 2.3718).unwrap());
        let value = Value::Features(
            FeatureSet::new()
                .with(Feature::City, "Paris")
                .with(Feature::Country, "France"),
        );

        {
            let mut cache = ResultCache::open(GeocodeMode::Reverse, &settings).unwrap();
            cache.put(key.clone(), value.clone());
        }

        let mut cache = ResultCache::open(GeocodeMode::Reverse, &settings).unwrap();
        assert_eq!(cache.get(&key), Some(value));
    }

    #[test]
    fn test_journal_stays_bounded_under_churn() {
        let dir = TempDir::new().unwrap();
        let settings = persisted(&dir, 1, EvictionPolicy::LeastRecentlyStored);

        let mut cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
        for i in 0..5000 {
            cache.put(addr(&format!("k{}", i)), latlng(1.0, 1.0));
            assert!(cache.journal_len().unwrap() <= crate::cache::COMPACTION_FLOOR);
        }
        assert_eq!(cache.stats().evictions, 4999);

        let path = CacheJournal::path_for(dir.path(), GeocodeMode::Forward);
        let lines = std::fs::read_to_string(&path).unwrap().lines().count();
        assert!(lines <= crate::cache::COMPACTION_FLOOR);
        drop(cache);

        let cache = ResultCache::open(GeocodeMode::Forward, &settings).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&addr("k4999")));
        assert_eq!(cache.journal_len(), Some(1));
    }

    #[test]
    fn test_in_memory_cache_has_no_journal() {
        assert_eq!(forward(10, EvictionPolicy::default()).journal_len(), None);
    }
}
