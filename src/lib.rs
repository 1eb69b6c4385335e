//! Geo Enricher - cache-and-batch geocoding for tabular records
//!
//! Resolves addresses to coordinates, or coordinates to locality features,
//! through a pluggable provider. A size-bounded, optionally persisted result
//! cache and a batch assembler sit between the row stream and the provider.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod provider;

pub use api::AppState;
pub use config::{Config, RunSettings};
pub use error::{GeoError, Result};
pub use pipeline::{EnrichmentContext, ResolutionPipeline};
