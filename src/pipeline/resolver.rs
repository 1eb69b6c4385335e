//! Resolution Pipeline
//!
//! Enriches one chunk end to end: column preparation, cache lookups, the
//! single or batch miss path, and the final write-back.

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::error::{GeoError, Result};
use crate::pipeline::batch::{accept, log_item_failure};
use crate::pipeline::{
    BatchAssembler, Chunk, ColumnLayout, OutputBuffer, PipelineSettings, ResolutionCounters,
};
use crate::provider::Provider;

// == Chunk Report ==
/// What happened to the rows of one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkReport {
    pub rows: usize,
    /// Rows that arrived with every output column filled in
    pub already_resolved: usize,
    pub cache_hits: usize,
    /// Rows resolved by the provider during this chunk
    pub resolved: usize,
    pub unresolved: usize,
    pub provider_calls: usize,
    pub failed_items: usize,
    pub failed_batches: usize,
}

impl ChunkReport {
    /// Adds another chunk's counts to this one.
    pub fn absorb(&mut self, other: &ChunkReport) {
        self.rows += other.rows;
        self.already_resolved += other.already_resolved;
        self.cache_hits += other.cache_hits;
        self.resolved += other.resolved;
        self.unresolved += other.unresolved;
        self.provider_calls += other.provider_calls;
        self.failed_items += other.failed_items;
        self.failed_batches += other.failed_batches;
    }
}

// == Resolution Pipeline ==
pub struct ResolutionPipeline<'a> {
    settings: &'a PipelineSettings,
    cache: &'a mut ResultCache,
    provider: &'a dyn Provider,
}

impl<'a> ResolutionPipeline<'a> {
    /// Binds settings, cache and provider for a run.
    ///
    /// Fails when the cache was opened for the other geocoding mode.
    pub fn new(
        settings: &'a PipelineSettings,
        cache: &'a mut ResultCache,
        provider: &'a dyn Provider,
    ) -> Result<Self> {
        if cache.mode() != settings.mode() {
            return Err(GeoError::Configuration(format!(
                "{} cache cannot serve {} geocoding",
                cache.mode(),
                settings.mode()
            )));
        }
        Ok(Self {
            settings,
            cache,
            provider,
        })
    }

    // == Process Chunk ==
    /// Resolves every row of `chunk` in place.
    ///
    /// Only a malformed chunk is an error. Rows that cannot be resolved are
    /// logged and left with empty output columns.
    pub fn process_chunk(&mut self, chunk: &mut Chunk) -> Result<ChunkReport> {
        chunk.validate()?;
        let layout = ColumnLayout::prepare(chunk, self.settings)?;

        let mut report = ChunkReport {
            rows: chunk.len(),
            ..ChunkReport::default()
        };
        let mut output = OutputBuffer::new(chunk.len());
        let mut single = ResolutionCounters::default();
        let provider = self.provider;
        let mut assembler = self
            .settings
            .batch_enabled
            .then(|| BatchAssembler::new(provider, self.settings.batch_size));

        for (row_index, row) in chunk.rows.iter().enumerate() {
            if let Some(existing) = layout.existing_value(row) {
                report.already_resolved += 1;
                if let (Some(value), Ok(key)) = (existing, layout.read_key(row)) {
                    if value.mode() == key.mode() {
                        self.cache.put(key, value);
                    }
                }
                continue;
            }

            let key = match layout.read_key(row) {
                Ok(key) => key,
                Err(reason) => {
                    warn!("Skipping row {}: {}", row_index, reason);
                    continue;
                }
            };

            if let Some(value) = self.cache.get(&key) {
                report.cache_hits += 1;
                output.set(row_index, value);
                continue;
            }

            match assembler.as_mut() {
                Some(assembler) => assembler.add(row_index, key, self.cache, &mut output),
                None => {
                    single.provider_calls += 1;
                    match accept(&key, provider.resolve_single(&key)) {
                        Ok(value) => {
                            output.set(row_index, value.clone());
                            self.cache.put(key, value);
                        }
                        Err(e) => {
                            single.failed_items += 1;
                            log_item_failure(&key, &e);
                        }
                    }
                }
            }
        }

        if let Some(assembler) = assembler.as_mut() {
            assembler.flush(self.cache, &mut output);
            let counters = assembler.counters();
            single.provider_calls += counters.provider_calls;
            single.failed_items += counters.failed_items;
            single.failed_batches += counters.failed_batches;
        }

        report.resolved = output.resolved_count() - report.cache_hits;
        report.unresolved = report.rows - report.already_resolved - output.resolved_count();
        report.provider_calls = single.provider_calls;
        report.failed_items = single.failed_items;
        report.failed_batches = single.failed_batches;

        output.merge_into(chunk, &layout);

        debug!(
            "Chunk done: {} rows, {} already resolved, {} cache hits, {} resolved, {} unresolved, {} provider calls",
            report.rows,
            report.already_resolved,
            report.cache_hits,
            report.resolved,
            report.unresolved,
            report.provider_calls
        );
        Ok(report)
    }
}
