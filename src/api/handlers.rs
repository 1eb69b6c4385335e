//! API Handlers
//!
//! HTTP request handlers for each enrichment service endpoint.

use std::sync::Arc;
use tokio::sync::Mutex;

use axum::{extract::State, Json};

use crate::error::{GeoError, Result};
use crate::models::{EnrichRequest, EnrichResponse, HealthResponse, StatsResponse};
use crate::pipeline::EnrichmentContext;

/// Application state shared across all handlers.
///
/// Chunks are processed one at a time: the context is locked for the whole
/// of a chunk.
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<Mutex<EnrichmentContext>>,
}

impl AppState {
    pub fn new(context: EnrichmentContext) -> Self {
        Self {
            context: Arc::new(Mutex::new(context)),
        }
    }

    /// Closes the run's cache. Later calls do nothing.
    pub async fn close(&self) -> Result<()> {
        self.context.lock().await.close()
    }
}

/// Handler for POST /enrich
///
/// Resolves the chunk on a blocking thread, since cache persistence and
/// provider calls are synchronous.
pub async fn enrich_handler(
    State(state): State<AppState>,
    Json(req): Json<EnrichRequest>,
) -> Result<Json<EnrichResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(GeoError::InvalidRequest(error_msg));
    }

    let mut chunk = req.into_chunk();
    let context = state.context.clone();
    let (chunk, report) = tokio::task::spawn_blocking(move || {
        let mut context = context.blocking_lock();
        let report = context.process_chunk(&mut chunk)?;
        Ok::<_, GeoError>((chunk, report))
    })
    .await
    .map_err(|e| GeoError::Internal(format!("enrichment task failed: {}", e)))??;

    Ok(Json(EnrichResponse::new(chunk, report)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let context = state.context.lock().await;
    let cache = context.cache_stats();

    Json(StatsResponse {
        provider: context.provider_name().to_string(),
        mode: context.settings().mode().to_string(),
        chunks_processed: context.chunks_processed(),
        hit_rate: cache.hit_rate(),
        cache,
        totals: context.totals(),
    })
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
