//! Pipeline Module
//!
//! Chunk-level enrichment: column layout, cache lookups, batch assembly and
//! write-back, plus the per-run context that owns the cache.

mod batch;
mod chunk;
mod context;
mod layout;
mod resolver;

pub use batch::{BatchAssembler, PendingItem, ResolutionCounters};
pub use chunk::{cell_as_f64, cell_as_text, is_empty_cell, Chunk, OutputBuffer};
pub use context::{EnrichmentContext, RunSummary};
pub use layout::{ColumnLayout, KeyColumns, OutputColumn, OutputField, PipelineSettings};
pub use resolver::{ChunkReport, ResolutionPipeline};
