//! HTTP layer: route handlers, DTOs, OpenAPI document and router composition.
//!
//! Ingestion endpoints live under `/v1`, system endpoints at the root.

pub mod dto;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// Path the OpenAPI document is served from.
pub const OPENAPI_PATH: &str = "/docs/openapi.json";

/// OpenAPI description of every documented endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "aquahub-ingest",
        description = "Telemetry ingestion gateway for AquaHub IoT hubs."
    ),
    paths(
        handlers::ingest::sensor_data,
        handlers::ingest::device_add,
        handlers::ingest::device_meta,
        handlers::ingest::sensor_add,
        handlers::ingest::sensor_meta,
        handlers::system::health_handler,
    ),
    components(schemas(dto::StatusResponse, dto::HealthResponse)),
    tags(
        (name = "Ingest", description = "Hub telemetry and registration"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete router with all endpoints and the API docs.
pub fn build_router() -> Router<AppState> {
    with_docs(Router::new().merge(handlers::routes()))
}

/// Builds the served application: router, middleware and state.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    build_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}

#[cfg(feature = "swagger-ui")]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()),
    )
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router.route(
        OPENAPI_PATH,
        axum::routing::get(|| async { axum::Json(ApiDoc::openapi()) }),
    )
}
