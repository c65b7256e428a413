//! Response bodies of the ingestion and system endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Acknowledgement returned to hubs for every ingestion request.
///
/// Always `{"status":"Ok"}`; outcomes are reported through logs only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    /// Literal `"Ok"`.
    #[schema(example = "Ok")]
    pub status: String,
}

impl StatusResponse {
    /// The acknowledgement body.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "Ok".to_string(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `"healthy"` while the process serves requests.
    pub status: String,
    /// RFC 3339 server time.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Active storage backend (`postgres` or `memory`).
    pub backend: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_serializes_to_hub_contract() {
        let body = serde_json::to_string(&StatusResponse::ok()).ok();
        assert_eq!(body.as_deref(), Some(r#"{"status":"Ok"}"#));
    }
}
