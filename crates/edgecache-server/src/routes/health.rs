//! Liveness route: `GET /v1/health`.

use axum::Json;
use chrono::Utc;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    /// Server time, unix seconds.
    pub time: i64,
}

/// Report that the service is up. Touches no storage.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: "edgecache-license-api",
        time: Utc::now().timestamp(),
    })
}
