//! Internal admin routes: `/v1/internal/licenses`
//!
//! Issue or update licenses and list the most recent ones. Guarded by the
//! admin token.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use edgecache_core::LicenseSummary;
use serde::Serialize;

use crate::error::AppError;
use crate::payload::Payload;
use crate::routes::license::op_response;
use crate::state::AppState;

/// Licenses returned by a listing.
const LIST_LIMIT: usize = 100;

#[derive(Debug, Serialize)]
pub struct LicenseListResponse {
    pub items: Vec<LicenseSummary>,
}

/// List the most recently created licenses, newest first.
pub async fn list_licenses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LicenseListResponse>, AppError> {
    let items = state
        .engine
        .list_licenses(LIST_LIMIT)
        .await
        .map_err(|e| state.internal_error(&e))?;

    Ok(Json(LicenseListResponse { items }))
}

/// Create or replace a license.
pub async fn issue_license(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload = Payload::parse(&body);
    let result = state
        .engine
        .issue_or_update_license(
            &payload.string("license_key", ""),
            &payload.string("plan", "pro"),
            &payload.string("status", "active"),
            &payload.string_list("features"),
            payload.timestamp("expires_at"),
        )
        .await
        .map_err(|e| state.internal_error(&e))?;

    Ok(op_response(result))
}
