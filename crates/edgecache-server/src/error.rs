//! HTTP error types for the license API.
//!
//! Every error renders as a JSON object with a `message` field. Internal
//! errors also carry an `error` field holding the failure detail when the
//! server runs in debug mode, and `null` otherwise.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

/// Application-level error returned from handlers and guards.
#[derive(Debug)]
pub enum AppError {
    /// The admin guard has no token to compare against.
    AdminTokenNotConfigured,
    /// Missing or wrong credentials (admin token or request signature).
    Unauthorized(&'static str),
    /// No route matches the request.
    NotFound,
    /// The request body exceeds the signature guard's buffer.
    PayloadTooLarge,
    /// An engine or storage failure.
    Internal { detail: Option<String> },
}

impl AppError {
    /// Log `err` and wrap it, keeping its text only when `debug` is set.
    pub fn internal(err: &impl std::fmt::Display, debug: bool) -> Self {
        let detail = err.to_string();
        error!(error = %detail, "request failed");
        Self::Internal {
            detail: debug.then_some(detail),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::AdminTokenNotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "admin token not configured" }),
            ),
            Self::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, json!({ "message": message }))
            }
            Self::NotFound => (StatusCode::NOT_FOUND, json!({ "message": "not found" })),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({ "message": "payload too large" }),
            ),
            Self::Internal { detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "internal error", "error": detail }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn internal_error_hides_detail_outside_debug() {
        let (status, body) = body_of(AppError::internal(&"disk on fire", false)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "message": "internal error", "error": null }));

        let (_, body) = body_of(AppError::internal(&"disk on fire", true)).await;
        assert_eq!(body["error"], "disk on fire");
    }

    #[tokio::test]
    async fn guard_errors_render_plain_messages() {
        let (status, body) = body_of(AppError::Unauthorized("invalid signature")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "message": "invalid signature" }));

        let (status, body) = body_of(AppError::AdminTokenNotConfigured).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "message": "admin token not configured" }));
    }
}
