//! Eviction Policy Module
//!
//! Orders cache entries by eviction priority for the configured policy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::models::Key;

// == Eviction Policy ==
/// Rule selecting which entry leaves the cache when it is over budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Oldest store goes first, regardless of how often it was read
    #[default]
    LeastRecentlyStored,
    /// Fewest reads goes first, oldest store breaks ties
    LeastFrequentlyUsed,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::LeastRecentlyStored => "least-recently-stored",
            EvictionPolicy::LeastFrequentlyUsed => "least-frequently-used",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "least-recently-stored" => Ok(EvictionPolicy::LeastRecentlyStored),
            "least-frequently-used" => Ok(EvictionPolicy::LeastFrequentlyUsed),
            other => Err(format!("unknown eviction policy '{}'", other)),
        }
    }
}

// == Eviction Index ==
/// Tracks eviction order for the cache entries.
///
/// Entries are keyed by `(rank, insertion_sequence)` where rank is 0 under
/// least-recently-stored and the access count under least-frequently-used.
/// The first key in the map is always the next victim. Because the
/// insertion sequence is unique, ranks never collide.
#[derive(Debug)]
pub struct EvictionIndex {
    policy: EvictionPolicy,
    order: BTreeMap<(u64, u64), Key>,
}

impl EvictionIndex {
    // == Constructor ==
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            order: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    fn rank(&self, entry: &CacheEntry) -> (u64, u64) {
        match self.policy {
            EvictionPolicy::LeastRecentlyStored => (0, entry.insertion_sequence),
            EvictionPolicy::LeastFrequentlyUsed => (entry.access_count, entry.insertion_sequence),
        }
    }

    // == Insert ==
    /// Starts tracking an entry at its current metadata.
    pub fn insert(&mut self, entry: &CacheEntry) {
        let rank = self.rank(entry);
        self.order.insert(rank, entry.key.clone());
    }

    // == Remove ==
    /// Stops tracking an entry.
    ///
    /// Must be called with the metadata the entry had when it was inserted,
    /// i.e. before the caller mutates it.
    pub fn remove(&mut self, entry: &CacheEntry) {
        let rank = self.rank(entry);
        self.order.remove(&rank);
    }

    // == Evict Next ==
    /// Returns and forgets the next victim, or None if nothing is tracked.
    pub fn evict_next(&mut self) -> Option<Key> {
        self.order.pop_first().map(|(_, key)| key)
    }

    // == Peek Next ==
    pub fn peek_next(&self) -> Option<&Key> {
        self.order.first_key_value().map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
