//! HTTP endpoint handlers.

pub mod ingest;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes ingestion and system routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(ingest::routes())
        .merge(system::routes())
}
