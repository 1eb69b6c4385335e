//! API Module
//!
//! HTTP handlers and routing for the enrichment service.
//!
//! # Endpoints
//! - `POST /enrich` - Enrich one chunk of rows
//! - `GET /stats` - Cache and run statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
