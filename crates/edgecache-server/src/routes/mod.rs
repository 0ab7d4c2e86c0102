//! HTTP route handlers for the license API.
//!
//! Routes are organized by audience:
//! - `health`: liveness probe
//! - `license`: signed client calls (activate, verify, deactivate)
//! - `admin`: token-guarded license issuance and listing

pub mod admin;
pub mod health;
pub mod license;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::middleware::{require_admin_token, require_signature};
use crate::state::AppState;

/// Concurrent requests allowed on the admin routes.
const ADMIN_CONCURRENCY_LIMIT: usize = 10;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let license_routes = Router::new()
        .route("/v1/license/activate", post(license::activate))
        .route("/v1/license/verify", post(license::verify))
        .route("/v1/license/deactivate", post(license::deactivate))
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            require_signature,
        ));

    let admin_routes = Router::new()
        .route(
            "/v1/internal/licenses",
            get(admin::list_licenses).post(admin::issue_license),
        )
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            require_admin_token,
        ))
        .layer(ConcurrencyLimitLayer::new(ADMIN_CONCURRENCY_LIMIT));

    Router::new()
        .route("/v1/health", get(health::health))
        .merge(license_routes)
        .merge(admin_routes)
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound
}
