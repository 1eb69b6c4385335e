//! Cache Module
//!
//! Provides the size-bounded result cache with pluggable eviction policy and
//! optional journal persistence.

mod entry;
mod journal;
mod policy;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use journal::{CacheJournal, JournalRecord, COMPACTION_FLOOR};
pub use policy::{EvictionIndex, EvictionPolicy};
pub use stats::CacheStats;
pub use store::{CacheSettings, ResultCache};

// == Public Constants ==
/// Entry budget used when none is configured
pub const DEFAULT_SIZE_LIMIT: i64 = 1_000_000;
