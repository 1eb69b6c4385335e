//! Batch Assembler
//!
//! Queues cache-miss keys, sends them to the provider in bounded batches and
//! reconciles each outcome with the row it came from.

use tracing::{debug, error};

use crate::cache::ResultCache;
use crate::error::GeoError;
use crate::models::{Key, Value};
use crate::pipeline::OutputBuffer;
use crate::provider::{ItemOutcome, Provider, ProviderError};

/// A cache miss waiting for the next flush.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
    pub row_index: usize,
    pub key: Key,
}

/// Provider-side counts for one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionCounters {
    pub provider_calls: usize,
    pub failed_items: usize,
    pub failed_batches: usize,
}

// == Batch Assembler ==
pub struct BatchAssembler<'p> {
    provider: &'p dyn Provider,
    batch_size: usize,
    pending: Vec<PendingItem>,
    counters: ResolutionCounters,
}

impl<'p> BatchAssembler<'p> {
    /// A `batch_size` of zero is treated as one.
    pub fn new(provider: &'p dyn Provider, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            provider,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            counters: ResolutionCounters::default(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn pending(&self) -> &[PendingItem] {
        &self.pending
    }

    pub fn counters(&self) -> ResolutionCounters {
        self.counters
    }

    // == Add ==
    /// Queues a miss, flushing as soon as the buffer is full.
    pub fn add(
        &mut self,
        row_index: usize,
        key: Key,
        cache: &mut ResultCache,
        output: &mut OutputBuffer,
    ) {
        self.pending.push(PendingItem { row_index, key });
        if self.pending.len() >= self.batch_size {
            self.flush(cache, output);
        }
    }

    // == Flush ==
    /// Sends every queued key in one provider call.
    ///
    /// Successes are written to `output` and stored in `cache`. Failed items
    /// and failed batches are logged and their rows stay unresolved. The
    /// queue is empty afterwards in every case.
    pub fn flush(&mut self, cache: &mut ResultCache, output: &mut OutputBuffer) {
        if self.pending.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.pending);
        let keys: Vec<Key> = batch.iter().map(|item| item.key.clone()).collect();

        debug!(
            "Sending batch of {} keys to provider '{}'",
            keys.len(),
            self.provider.name()
        );
        self.counters.provider_calls += 1;

        let outcomes = match self.provider.resolve_batch(&keys) {
            Ok(outcomes) if outcomes.len() == keys.len() => outcomes,
            Ok(outcomes) => {
                self.fail_batch(
                    keys.len(),
                    format!("{} results returned for {} keys", outcomes.len(), keys.len()),
                );
                return;
            }
            Err(e) => {
                self.fail_batch(keys.len(), e.to_string());
                return;
            }
        };

        for (item, outcome) in batch.into_iter().zip(outcomes) {
            match accept(&item.key, outcome) {
                Ok(value) => {
                    output.set(item.row_index, value.clone());
                    cache.put(item.key, value);
                }
                Err(e) => {
                    self.counters.failed_items += 1;
                    log_item_failure(&item.key, &e);
                }
            }
        }
    }

    fn fail_batch(&mut self, size: usize, reason: String) {
        self.counters.failed_batches += 1;
        error!("{}", GeoError::BatchResolution { size, reason });
    }
}

// == Outcome Checks ==
/// Turns a provider answer into a value fit for `key`, or the reason it is
/// not one.
pub(crate) fn accept(key: &Key, outcome: ItemOutcome) -> Result<Value, ProviderError> {
    let value = outcome?;
    if value.mode() != key.mode() {
        return Err(ProviderError::Malformed(format!(
            "{} value returned for {} key",
            value.mode(),
            key.mode()
        )));
    }
    if value.is_blank() {
        return Err(ProviderError::EmptyResult);
    }
    Ok(value)
}

pub(crate) fn log_item_failure(key: &Key, e: &ProviderError) {
    error!(
        "{}",
        GeoError::ItemResolution {
            key: key.to_string(),
            reason: e.to_string(),
        }
    );
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionPolicy;
    use crate::models::{Coordinates, Feature, FeatureSet, GeocodeMode};
    use std::sync::Mutex;

    /// Answers from a fixed script and records every batch it receives.
    struct Scripted {
        calls: Mutex<Vec<Vec<Key>>>,
        answer: fn(&[Key]) -> Result<Vec<ItemOutcome>, ProviderError>,
    }

    impl Scripted {
        fn new(answer: fn(&[Key]) -> Result<Vec<ItemOutcome>, ProviderError>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                answer,
            }
        }

        fn calls(&self) -> Vec<Vec<Key>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn supports_batch(&self) -> bool {
            true
        }

        fn resolve_single(&self, key: &Key) -> Result<Value, ProviderError> {
            (self.answer)(std::slice::from_ref(key))?.remove(0)
        }

        fn resolve_batch(&self, keys: &[Key]) -> Result<Vec<ItemOutcome>, ProviderError> {
            self.calls.lock().unwrap().push(keys.to_vec());
            (self.answer)(keys)
        }
    }

    fn key(n: usize) -> Key {
        Key::Address(format!("k{}", n))
    }

    fn point(n: usize) -> Value {
        Value::LatLng(Coordinates::new(n as f64, n as f64).unwrap())
    }

    fn index_of(key: &Key) -> usize {
        match key {
            Key::Address(a) => a[1..].parse().unwrap(),
            Key::Coordinates(_) => unreachable!(),
        }
    }

    fn all_ok(keys: &[Key]) -> Result<Vec<ItemOutcome>, ProviderError> {
        Ok(keys.iter().map(|k| Ok(point(index_of(k)))).collect())
    }

    fn cache() -> ResultCache {
        ResultCache::in_memory(GeocodeMode::Forward, 100, EvictionPolicy::default())
    }

    #[test]
    fn test_flushes_when_full() {
        let provider = Scripted::new(all_ok);
        let mut cache = cache();
        let mut output = OutputBuffer::new(3);
        let mut assembler = BatchAssembler::new(&provider, 2);

        assembler.add(0, key(0), &mut cache, &mut output);
        assert_eq!(assembler.pending().len(), 1);
        assembler.add(1, key(1), &mut cache, &mut output);
        assert!(assembler.pending().is_empty());
        assembler.add(2, key(2), &mut cache, &mut output);
        assembler.flush(&mut cache, &mut output);

        assert_eq!(
            provider.calls(),
            vec![vec![key(0), key(1)], vec![key(2)]]
        );
        assert_eq!(output.get(2), Some(&point(2)));
        assert_eq!(assembler.counters().provider_calls, 2);
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let provider = Scripted::new(all_ok);
        let mut cache = cache();
        let mut output = OutputBuffer::new(0);
        let mut assembler = BatchAssembler::new(&provider, 4);

        assembler.flush(&mut cache, &mut output);

        assert!(provider.calls().is_empty());
        assert_eq!(assembler.counters(), ResolutionCounters::default());
    }

    #[test]
    fn test_partial_failure() {
        fn middle_fails(keys: &[Key]) -> Result<Vec<ItemOutcome>, ProviderError> {
            Ok(keys
                .iter()
                .map(|k| match index_of(k) {
                    1 => Err(ProviderError::NotFound(k.to_string())),
                    n => Ok(point(n)),
                })
                .collect())
        }
        let provider = Scripted::new(middle_fails);
        let mut cache = cache();
        let mut output = OutputBuffer::new(3);
        let mut assembler = BatchAssembler::new(&provider, 3);

        for n in 0..3 {
            assembler.add(n, key(n), &mut cache, &mut output);
        }

        assert_eq!(output.get(0), Some(&point(0)));
        assert_eq!(output.get(1), None);
        assert_eq!(output.get(2), Some(&point(2)));
        assert!(cache.contains(&key(0)));
        assert!(!cache.contains(&key(1)));
        assert_eq!(assembler.counters().failed_items, 1);
    }

    #[test]
    fn test_whole_batch_failure_clears_queue() {
        fn down(_: &[Key]) -> Result<Vec<ItemOutcome>, ProviderError> {
            Err(ProviderError::Unavailable("connection refused".into()))
        }
        let provider = Scripted::new(down);
        let mut cache = cache();
        let mut output = OutputBuffer::new(2);
        let mut assembler = BatchAssembler::new(&provider, 5);

        assembler.add(0, key(0), &mut cache, &mut output);
        assembler.add(1, key(1), &mut cache, &mut output);
        assembler.flush(&mut cache, &mut output);

        assert!(assembler.pending().is_empty());
        assert_eq!(output.resolved_count(), 0);
        assert!(cache.is_empty());
        assert_eq!(assembler.counters().failed_batches, 1);
    }

    #[test]
    fn test_length_mismatch_fails_batch() {
        fn short(keys: &[Key]) -> Result<Vec<ItemOutcome>, ProviderError> {
            Ok(vec![Ok(point(index_of(&keys[0])))])
        }
        let provider = Scripted::new(short);
        let mut cache = cache();
        let mut output = OutputBuffer::new(2);
        let mut assembler = BatchAssembler::new(&provider, 2);

        assembler.add(0, key(0), &mut cache, &mut output);
        assembler.add(1, key(1), &mut cache, &mut output);

        assert_eq!(output.resolved_count(), 0);
        assert!(cache.is_empty());
        assert_eq!(assembler.counters().failed_batches, 1);
    }

    #[test]
    fn test_zero_batch_size_sends_one_at_a_time() {
        let provider = Scripted::new(all_ok);
        let mut cache = cache();
        let mut output = OutputBuffer::new(2);
        let mut assembler = BatchAssembler::new(&provider, 0);

        assembler.add(0, key(0), &mut cache, &mut output);
        assembler.add(1, key(1), &mut cache, &mut output);

        assert_eq!(provider.calls().len(), 2);
    }

    #[test]
    fn test_accept_rejects_wrong_or_blank_values() {
        let address = key(0);
        let features = Value::Features(FeatureSet::new().with(Feature::City, "Paris"));
        assert!(matches!(
            accept(&address, Ok(features)),
            Err(ProviderError::Malformed(_))
        ));

        let reverse = Key::Coordinates(Coordinates::new(1.0, 2.0).unwrap());
        let blank = Value::Features(FeatureSet::new());
        assert_eq!(accept(&reverse, Ok(blank)), Err(ProviderError::EmptyResult));

        assert_eq!(accept(&address, Ok(point(3))), Ok(point(3)));
    }
}
