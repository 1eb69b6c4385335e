//! Provider Module
//!
//! The resolution capability the pipeline calls on cache misses, plus the
//! registry that turns a configured provider name into one.
//!
//! Concrete network geocoders are not part of this crate. Hosts register a
//! constructor for them in the [`ProviderRegistry`]; the built-in
//! [`GazetteerProvider`] answers from a local lookup table.

mod gazetteer;
mod registry;

use thiserror::Error;

use crate::models::{Key, Value};

pub use gazetteer::GazetteerProvider;
pub use registry::{ProviderKind, ProviderRegistry, ProviderSettings};

// == Provider Error ==
/// Why a provider could not answer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("no match for {0}")]
    NotFound(String),

    #[error("provider returned an empty result")]
    EmptyResult,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Outcome for one key of a batch.
pub type ItemOutcome = Result<Value, ProviderError>;

// == Provider Trait ==
/// Resolves keys to values. Calls are blocking and made one at a time.
///
/// Timeouts and retries belong to the implementation; callers only see the
/// returned outcome.
pub trait Provider: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Whether [`Provider::resolve_batch`] is a real multi-key call.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Resolves exactly one key.
    fn resolve_single(&self, key: &Key) -> Result<Value, ProviderError>;

    /// Resolves several keys in one call.
    ///
    /// The returned outcomes must be aligned with `keys`: same length, same
    /// order. A top-level error means the whole batch failed.
    fn resolve_batch(&self, keys: &[Key]) -> Result<Vec<ItemOutcome>, ProviderError> {
        Ok(keys.iter().map(|key| self.resolve_single(key)).collect())
    }
}
