//! Domain types and HTTP DTOs
//!
//! `geo` holds the keys and values shared by the cache, providers and
//! pipeline. `requests` and `responses` are the bodies of the enrichment API.

pub mod geo;
pub mod requests;
pub mod responses;

pub use geo::{Coordinates, Feature, FeatureSet, GeocodeMode, Key, Value};
pub use requests::EnrichRequest;
pub use responses::{EnrichResponse, ErrorResponse, HealthResponse, StatsResponse};
