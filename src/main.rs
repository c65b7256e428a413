//! aquahub-ingest server entry point.
//!
//! Loads configuration, opens the store and serves the ingestion API.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use aquahub_ingest::api;
use aquahub_ingest::app_state::AppState;
use aquahub_ingest::config::IngestConfig;
use aquahub_ingest::persistence::{MemoryStore, PostgresStore, TelemetryStore};
use aquahub_ingest::service::IngestService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IngestConfig::from_env()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting aquahub-ingest");

    // Build persistence layer
    let store: Arc<dyn TelemetryStore> = if config.persistence_enabled {
        let store = PostgresStore::connect(&config)
            .await
            .context("connecting to database")?;
        if config.run_migrations {
            store.migrate().await.context("running migrations")?;
            tracing::info!("migrations applied");
        }
        Arc::new(store)
    } else {
        tracing::warn!("persistence disabled, readings are kept in memory only");
        Arc::new(MemoryStore::new())
    };

    // Build service layer
    let ingest_service = IngestService::new(store, config.identity_cache_ttl());
    let app = api::build_app(AppState::new(ingest_service), config.request_timeout());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
