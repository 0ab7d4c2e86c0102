//! Shared application state for the license API.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use edgecache_core::LicenseEngine;

use crate::error::AppError;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    pub engine: Arc<LicenseEngine>,
    /// HMAC secret for request signatures. Empty disables the check.
    pub signing_secret: String,
    /// Admin route token. Empty means admin routes are unavailable.
    pub admin_token: String,
    /// Expose failure details in 500 responses.
    pub debug: bool,
}

impl AppState {
    /// Turn an engine failure into a 500, honouring the debug flag.
    pub fn internal_error(&self, err: &impl std::fmt::Display) -> AppError {
        AppError::internal(err, self.debug)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
