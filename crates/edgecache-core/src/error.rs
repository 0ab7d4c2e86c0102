//! Error types for `edgecache-core`.
//!
//! Validation problems are never errors: they come back as ordinary
//! `invalid` / `ok: false` results. Everything here is an infrastructure
//! failure that the HTTP boundary turns into a 500. No variant ever
//! carries a raw license key.

use edgecache_storage::StorageError;

/// Errors from the license, activation, and rate-limit record stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage backend failed.
    #[error("store backend error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be encoded or decoded.
    #[error("record at '{key}' could not be (de)serialized: {reason}")]
    Serialization { key: String, reason: String },

    /// A compare-and-swap update kept losing to concurrent writers.
    #[error("gave up updating '{key}' after {attempts} conflicting writes")]
    Contention { key: String, attempts: u32 },
}

/// Errors from audit logging.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Every registered audit backend failed to write the entry.
    #[error("all audit backends failed (fail-closed)")]
    AllBackendsFailed,

    /// A specific audit backend failed.
    #[error("audit backend '{name}' failed: {reason}")]
    BackendFailure { name: String, reason: String },

    /// Serialization of the audit entry failed.
    #[error("audit serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Errors surfaced by [`LicenseEngine`](crate::engine::LicenseEngine)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A record store or the rate limiter failed.
    #[error("engine store error: {0}")]
    Store(#[from] StoreError),

    /// The audit trail could not be written.
    #[error("engine audit error: {0}")]
    Audit(#[from] AuditError),
}
