//! Client license routes: `/v1/license/*`
//!
//! Activate, verify, and deactivate a license for a site. Validation
//! failures are not HTTP errors: they answer 422 with the engine's result
//! body.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use edgecache_core::{LicenseResult, OpResult};

use crate::error::AppError;
use crate::middleware::ClientAddr;
use crate::payload::Payload;
use crate::state::AppState;

/// Activate a license for a site.
pub async fn activate(
    State(state): State<Arc<AppState>>,
    ClientAddr(caller): ClientAddr,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload = Payload::parse(&body);
    let result = state
        .engine
        .activate(
            &payload.string("license_key", ""),
            &payload.string("site_url", ""),
            &caller,
        )
        .await
        .map_err(|e| state.internal_error(&e))?;

    Ok(license_response(result))
}

/// Verify a license for a site and refresh its activation.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    ClientAddr(caller): ClientAddr,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload = Payload::parse(&body);
    let result = state
        .engine
        .verify(
            &payload.string("license_key", ""),
            &payload.string("site_url", ""),
            &caller,
        )
        .await
        .map_err(|e| state.internal_error(&e))?;

    Ok(license_response(result))
}

/// Deactivate a license on a site.
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let payload = Payload::parse(&body);
    let result = state
        .engine
        .deactivate(
            &payload.string("license_key", ""),
            &payload.string("site_url", ""),
        )
        .await
        .map_err(|e| state.internal_error(&e))?;

    Ok(op_response(result))
}

fn license_response(result: LicenseResult) -> Response {
    let status = if result.is_active() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(result)).into_response()
}

/// 200 when the operation succeeded, 422 otherwise.
pub(crate) fn op_response(result: OpResult) -> Response {
    let status = if result.ok {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(result)).into_response()
}
