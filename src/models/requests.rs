//! Request DTOs for the enrichment API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::pipeline::Chunk;

/// Maximum number of rows accepted in one request
pub const MAX_CHUNK_ROWS: usize = 100_000;

/// Request body for POST /enrich
///
/// One chunk of the record stream: column names plus rows of JSON cells,
/// each row in column order.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichRequest {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl EnrichRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.columns.is_empty() {
            return Some("Chunk must name at least one column".to_string());
        }
        if self.rows.len() > MAX_CHUNK_ROWS {
            return Some(format!(
                "Chunk exceeds maximum of {} rows",
                MAX_CHUNK_ROWS
            ));
        }
        None
    }

    pub fn into_chunk(self) -> Chunk {
        Chunk::new(self.columns, self.rows)
    }
}
