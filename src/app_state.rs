//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::IngestService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Ingestion pipeline.
    pub ingest_service: Arc<IngestService>,
}

impl AppState {
    /// Wraps a pipeline into handler state.
    #[must_use]
    pub fn new(ingest_service: IngestService) -> Self {
        Self {
            ingest_service: Arc::new(ingest_service),
        }
    }
}
