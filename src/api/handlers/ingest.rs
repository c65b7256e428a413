//! Hub ingestion endpoints.
//!
//! Every handler passes the raw request target to the pipeline and answers
//! `200 {"status":"Ok"}` regardless of the outcome; failures only show up
//! in the logs.

use axum::extract::{OriginalUri, State};
use axum::http::Uri;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::StatusResponse;
use crate::app_state::AppState;
use crate::domain::Route;

async fn ingest(state: &AppState, uri: &Uri) -> Json<StatusResponse> {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());
    state.ingest_service.handle(target).await;
    Json(StatusResponse::ok())
}

/// `GET /v1/sensor`: Telemetry readings.
#[utoipa::path(
    get,
    path = "/v1/sensor",
    tag = "Ingest",
    summary = "Submit sensor readings",
    description = "Payload pairs are `f<device*100+sensor>=<value>`. Readings are attributed to registered sensors of the hub.",
    params(("api_key" = String, Query, description = "`<hardware_token>:<user_token>`, followed by `&`-joined payload pairs")),
    responses(
        (status = 200, description = "Request acknowledged", body = StatusResponse),
    )
)]
pub async fn sensor_data(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Json<StatusResponse> {
    ingest(&state, &uri).await
}

/// `GET /v1/device/add`: Device registration.
#[utoipa::path(
    get,
    path = "/v1/device/add",
    tag = "Ingest",
    summary = "Register devices",
    description = "`id=<n>` selects the device; any other pair's value becomes its title.",
    params(("api_key" = String, Query, description = "`<hardware_token>:<user_token>`, followed by `&`-joined payload pairs")),
    responses(
        (status = 200, description = "Request acknowledged", body = StatusResponse),
    )
)]
pub async fn device_add(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Json<StatusResponse> {
    ingest(&state, &uri).await
}

/// `GET /v1/device/meta`: Device meta data.
#[utoipa::path(
    get,
    path = "/v1/device/meta",
    tag = "Ingest",
    summary = "Report device meta data",
    description = "`id` or `device_id` selects the device; `devdata=<type>:<value>;...` carries the entries.",
    params(("api_key" = String, Query, description = "`<hardware_token>:<user_token>`, followed by `&`-joined payload pairs")),
    responses(
        (status = 200, description = "Request acknowledged", body = StatusResponse),
    )
)]
pub async fn device_meta(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Json<StatusResponse> {
    ingest(&state, &uri).await
}

/// `GET /v1/sensor/add`: Sensor registration.
#[utoipa::path(
    get,
    path = "/v1/sensor/add",
    tag = "Ingest",
    summary = "Register sensors",
    description = "`device_id=<n>` selects the device; other values are `f<id>,f<id>,...` sensor lists.",
    params(("api_key" = String, Query, description = "`<hardware_token>:<user_token>`, followed by `&`-joined payload pairs")),
    responses(
        (status = 200, description = "Request acknowledged", body = StatusResponse),
    )
)]
pub async fn sensor_add(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Json<StatusResponse> {
    ingest(&state, &uri).await
}

/// `GET /v1/sensor/meta`: Sensor titles.
#[utoipa::path(
    get,
    path = "/v1/sensor/meta",
    tag = "Ingest",
    summary = "Set sensor titles",
    description = "`device_id=<n>` selects the device; `f<id>=<title>` names a sensor.",
    params(("api_key" = String, Query, description = "`<hardware_token>:<user_token>`, followed by `&`-joined payload pairs")),
    responses(
        (status = 200, description = "Request acknowledged", body = StatusResponse),
    )
)]
pub async fn sensor_meta(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Json<StatusResponse> {
    ingest(&state, &uri).await
}

/// Any other path under `/v1/`: logged as an unknown route, still acknowledged.
pub async fn unknown(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> Json<StatusResponse> {
    ingest(&state, &uri).await
}

/// Ingestion routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(Route::SensorData.path(), get(sensor_data))
        .route(Route::DeviceAdd.path(), get(device_add))
        .route(Route::DeviceMeta.path(), get(device_meta))
        .route(Route::SensorAdd.path(), get(sensor_add))
        .route(Route::SensorMeta.path(), get(sensor_meta))
        .route("/v1/{*rest}", get(unknown))
}
