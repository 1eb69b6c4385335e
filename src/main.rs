//! Geo Enricher - HTTP enrichment service
//!
//! Serves the enrichment pipeline over HTTP for one configured run.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geo_enricher::api::create_router;
use geo_enricher::provider::ProviderRegistry;
use geo_enricher::{AppState, Config, EnrichmentContext};

/// Main entry point for the enrichment service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the provider and open the result cache
/// 4. Start HTTP server on configured port
/// 5. On SIGINT/SIGTERM, stop accepting requests and close the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geo_enricher=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Geo Enricher");

    let config = Config::from_env();
    let settings = config.settings().context("invalid configuration")?;
    info!(
        "Configuration loaded: mode={}, provider={}, cache_enabled={}, batch_enabled={}, port={}",
        settings.mode,
        settings.provider.kind,
        settings.cache.enabled,
        settings.pipeline.batch_enabled,
        settings.server_port
    );

    let registry = ProviderRegistry::with_builtin();
    let context = EnrichmentContext::from_settings(&settings, &registry)
        .context("failed to prepare enrichment run")?;
    let state = AppState::new(context);

    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.close().await.context("failed to close result cache")?;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
