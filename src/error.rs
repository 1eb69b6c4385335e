//! Error types for the enrichment engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Geo Error Enum ==
/// Unified error type for the enrichment engine.
///
/// Resolution-level variants are produced for logging only; the pipeline never
/// propagates them out of a chunk.
#[derive(Error, Debug)]
pub enum GeoError {
    /// Missing or invalid setting, fatal before any row is processed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single key failed to resolve
    #[error("Failed to geocode {key} ({reason})")]
    ItemResolution { key: String, reason: String },

    /// A whole batch call failed
    #[error("Failed to geocode batch of {size} keys ({reason})")]
    BatchResolution { size: usize, reason: String },

    /// Malformed chunk or request body
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backing store I/O failure
    #[error("Cache persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    /// Journal record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for GeoError {
    fn into_response(self) -> Response {
        let status = match &self {
            GeoError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GeoError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GeoError::ItemResolution { .. } | GeoError::BatchResolution { .. } => {
                StatusCode::BAD_GATEWAY
            }
            GeoError::Persistence(_) | GeoError::Serialization(_) | GeoError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the enrichment engine.
pub type Result<T> = std::result::Result<T, GeoError>;
