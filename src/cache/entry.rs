//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with eviction metadata.

use serde::{Deserialize, Serialize};

use crate::models::{Key, Value};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The resolution key
    pub key: Key,
    /// The stored value
    pub value: Value,
    /// Monotonic stamp assigned on every store, unique within one cache
    pub insertion_sequence: u64,
    /// Number of successful lookups of this entry
    pub access_count: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a fresh entry with no recorded accesses.
    pub fn new(key: Key, value: Value, insertion_sequence: u64) -> Self {
        Self {
            key,
            value,
            insertion_sequence,
            access_count: 0,
        }
    }

    // == Restamp ==
    /// Replaces the value of an existing entry.
    ///
    /// The entry moves to the newest insertion position; its access count is
    /// carried over.
    pub fn restamp(&mut self, value: Value, insertion_sequence: u64) {
        self.value = value;
        self.insertion_sequence = insertion_sequence;
    }

    // == Record Access ==
    pub fn record_access(&mut self) {
        self.access_count += 1;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;

    fn latlng(lat: f64, lng: f64) -> Value {
        Value::LatLng(Coordinates::new(lat, lng).unwrap())
    }

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new(Key::Address("a".into()), latlng(1.0, 2.0), 7);

        assert_eq!(entry.insertion_sequence, 7);
        assert_eq!(entry.access_count, 0);
    }

    #[test]
    fn test_restamp_keeps_access_count() {
        let mut entry = CacheEntry::new(Key::Address("a".into()), latlng(1.0, 2.0), 1);
        entry.record_access();
        entry.record_access();

        entry.restamp(latlng(3.0, 4.0), 9);

        assert_eq!(entry.value, latlng(3.0, 4.0));
        assert_eq!(entry.insertion_sequence, 9);
        assert_eq!(entry.access_count, 2);
    }
}
