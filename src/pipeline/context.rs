//! Enrichment Context
//!
//! Everything one run needs, built once and passed explicitly: the pipeline
//! settings, the result cache and the provider.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::{CacheStats, ResultCache};
use crate::config::RunSettings;
use crate::error::{GeoError, Result};
use crate::pipeline::{Chunk, ChunkReport, PipelineSettings, ResolutionPipeline};
use crate::provider::{Provider, ProviderRegistry};

/// Totals for a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub chunks: usize,
    pub totals: ChunkReport,
    pub cache: CacheStats,
}

// == Enrichment Context ==
pub struct EnrichmentContext {
    settings: PipelineSettings,
    cache: ResultCache,
    provider: Arc<dyn Provider>,
    chunks: usize,
    totals: ChunkReport,
}

impl EnrichmentContext {
    /// Fails when the cache was opened for the other geocoding mode.
    ///
    /// Batching is switched off when `provider` has no batch endpoint.
    pub fn new(
        mut settings: PipelineSettings,
        cache: ResultCache,
        provider: Arc<dyn Provider>,
    ) -> Result<Self> {
        if cache.mode() != settings.mode() {
            return Err(GeoError::Configuration(format!(
                "{} cache cannot serve {} geocoding",
                cache.mode(),
                settings.mode()
            )));
        }
        if settings.batch_enabled && !provider.supports_batch() {
            warn!(
                "Provider '{}' cannot resolve batches; resolving one key at a time",
                provider.name()
            );
            settings.batch_enabled = false;
        }
        Ok(Self {
            settings,
            cache,
            provider,
            chunks: 0,
            totals: ChunkReport::default(),
        })
    }

    /// Builds the provider, then opens the cache.
    pub fn from_settings(settings: &RunSettings, registry: &ProviderRegistry) -> Result<Self> {
        let provider = registry.build(&settings.provider)?;
        let cache = ResultCache::open(settings.mode, &settings.cache)?;
        Self::new(settings.pipeline.clone(), cache, provider)
    }

    // == Process Chunk ==
    pub fn process_chunk(&mut self, chunk: &mut Chunk) -> Result<ChunkReport> {
        let report =
            ResolutionPipeline::new(&self.settings, &mut self.cache, self.provider.as_ref())?
                .process_chunk(chunk)?;
        self.chunks += 1;
        self.totals.absorb(&report);
        Ok(report)
    }

    // == Run ==
    /// Enriches every chunk in order and hands each one to `sink`.
    ///
    /// The cache is closed once the stream ends or as soon as a chunk or the
    /// sink fails; the first error is returned.
    pub fn run<I, F>(mut self, chunks: I, mut sink: F) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Chunk>,
        F: FnMut(Chunk, ChunkReport) -> Result<()>,
    {
        let started_at = Utc::now();
        info!("Starting {} enrichment run", self.settings.mode());

        let outcome = chunks.into_iter().try_for_each(|mut chunk| {
            let report = self.process_chunk(&mut chunk)?;
            sink(chunk, report)
        });

        let closed = self.close();
        if let Err(e) = &outcome {
            error!("Enrichment run aborted after {} chunks: {}", self.chunks, e);
        }
        outcome?;
        closed?;

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            chunks: self.chunks,
            totals: self.totals,
            cache: self.cache.stats(),
        };
        info!(
            "Enrichment run finished: {} chunks, {} rows, {} unresolved, {} provider calls",
            summary.chunks, summary.totals.rows, summary.totals.unresolved, summary.totals.provider_calls
        );
        Ok(summary)
    }

    /// Flushes and releases the cache. Later calls do nothing.
    pub fn close(&mut self) -> Result<()> {
        self.cache.close()
    }

    // == Accessors ==
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn chunks_processed(&self) -> usize {
        self.chunks
    }

    /// Sums of every chunk report so far.
    pub fn totals(&self) -> ChunkReport {
        self.totals
    }
}
