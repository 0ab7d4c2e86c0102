//! Request guards for the license API.
//!
//! Public license routes are protected by an HMAC-SHA256 signature over the
//! raw request body (`X-EdgeCache-Signature`). Internal admin routes require
//! a static token (`X-EdgeCache-Admin-Token`). Both comparisons are
//! constant-time.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use edgecache_core::hasher::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-edgecache-signature";
pub const ADMIN_TOKEN_HEADER: &str = "x-edgecache-admin-token";

/// Largest body the signature guard will buffer.
const MAX_SIGNED_BODY_BYTES: usize = 1024 * 1024;

/// Caller address used when the peer address is unknown.
const FALLBACK_CALLER: &str = "127.0.0.1";

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
#[must_use]
pub fn sign_body(body: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length, so this never takes the error path.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a presented signature header against the body.
///
/// An empty secret disables the check. An empty header never matches.
#[must_use]
pub fn verify_signature(body: &[u8], header: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return true;
    }
    if header.is_empty() {
        return false;
    }
    constant_time_eq(&sign_body(body, secret), header.trim())
}

/// Reject requests whose body signature does not verify.
///
/// The body is buffered to be hashed and then handed on unchanged.
pub async fn require_signature(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.signing_secret.is_empty() {
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_SIGNED_BODY_BYTES)
        .await
        .map_err(|_| AppError::PayloadTooLarge)?;

    let header = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !verify_signature(&bytes, header, &state.signing_secret) {
        warn!(path = %parts.uri.path(), "rejected request with invalid signature");
        return Err(AppError::Unauthorized("invalid signature"));
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

/// Reject admin requests without the configured token.
pub async fn require_admin_token(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.admin_token.is_empty() {
        return Err(AppError::AdminTokenNotConfigured);
    }

    let presented = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .trim();

    if !constant_time_eq(&state.admin_token, presented) {
        warn!(path = %req.uri().path(), "rejected admin request");
        return Err(AppError::Unauthorized("unauthorized"));
    }

    Ok(next.run(req).await)
}

/// The caller's IP address, used to key the rate limiter.
///
/// Taken from the peer socket; falls back to `127.0.0.1` when the server
/// was not started with connect info (e.g. in-process tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(
                || FALLBACK_CALLER.to_owned(),
                |ConnectInfo(addr)| addr.ip().to_string(),
            );
        Ok(Self(addr))
    }
}
