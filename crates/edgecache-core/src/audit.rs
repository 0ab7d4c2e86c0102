//! Audit trail for license operations.
//!
//! Every successful activation, verification, deactivation and issue, plus
//! every rejected activation attempt, produces an [`AuditEntry`] before the
//! engine returns. Entries are append-only.
//!
//! The [`AuditManager`] fans an entry out to every registered backend. If
//! all of them fail the operation fails too (fail-closed). Entries carry the
//! site and the outcome, never a raw license key.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use edgecache_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::AuditError;

const AUDIT_PREFIX: &str = "audit_logs/";

/// A single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID (UUID v4).
    pub id: String,
    /// Event name, e.g. `license.activate`.
    pub event: String,
    /// Structured event payload.
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Stamp a new entry with a fresh id and the current time.
    #[must_use]
    pub fn new(event: &str, details: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event: event.to_owned(),
            details,
            created_at: Utc::now(),
        }
    }
}

/// Trait for audit log backends.
///
/// Implementations must be safe to share across async tasks.
#[async_trait::async_trait]
pub trait AuditBackend: Send + Sync {
    /// The backend's name (for error reporting).
    fn name(&self) -> &str;

    /// Write an audit entry. Must not silently drop entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be persisted.
    async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Fans audit entries out to its backends, fail-closed.
///
/// One successful backend is enough. With no backends registered, logging
/// is a no-op.
pub struct AuditManager {
    backends: RwLock<Vec<Arc<dyn AuditBackend>>>,
}

impl AuditManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
        }
    }

    /// Register an audit backend.
    pub async fn add_backend(&self, backend: Arc<dyn AuditBackend>) {
        self.backends.write().await.push(backend);
    }

    /// Write `entry` to every backend.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AllBackendsFailed`] if every backend fails.
    pub async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let backends = self.backends.read().await;

        if backends.is_empty() {
            return Ok(());
        }

        let mut any_success = false;
        for backend in backends.iter() {
            match backend.log(entry).await {
                Ok(()) => any_success = true,
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        event = %entry.event,
                        error = %e,
                        "audit backend failed"
                    );
                }
            }
        }

        if any_success {
            Ok(())
        } else {
            Err(AuditError::AllBackendsFailed)
        }
    }

    /// Build an entry for `event` and log it.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::AllBackendsFailed`] if every backend fails.
    pub async fn record(&self, event: &str, details: serde_json::Value) -> Result<(), AuditError> {
        self.log(&AuditEntry::new(event, details)).await
    }

    /// Check whether any audit backends are configured.
    pub async fn has_backends(&self) -> bool {
        !self.backends.read().await.is_empty()
    }
}

impl Default for AuditManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuditManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditManager").finish_non_exhaustive()
    }
}

/// Audit backend that appends entries to the storage backend under
/// `audit_logs/<created_at_nanos>-<seq>-<id>`, so a prefix listing is
/// chronological. `seq` orders entries written within the same clock tick.
pub struct StorageAuditBackend {
    storage: Arc<dyn StorageBackend>,
    seq: AtomicU64,
}

impl StorageAuditBackend {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            seq: AtomicU64::new(0),
        }
    }

    fn entry_key(&self, entry: &AuditEntry) -> String {
        let nanos = entry
            .created_at
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .max(0);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{AUDIT_PREFIX}{nanos:020}-{seq:020}-{}", entry.id)
    }

    /// The `limit` most recent entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::BackendFailure`] if storage fails and
    /// [`AuditError::Serialization`] if an entry is corrupt.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let mut keys = self
            .storage
            .list(AUDIT_PREFIX)
            .await
            .map_err(|e| self.failure(&e))?;
        keys.sort_unstable_by(|a, b| b.cmp(a));

        let mut entries = Vec::new();
        for key in keys.iter().take(limit) {
            if let Some(bytes) = self.storage.get(key).await.map_err(|e| self.failure(&e))? {
                let entry = serde_json::from_slice(&bytes).map_err(|e| {
                    AuditError::Serialization {
                        reason: e.to_string(),
                    }
                })?;
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn failure(&self, err: &impl std::fmt::Display) -> AuditError {
        AuditError::BackendFailure {
            name: self.name().to_owned(),
            reason: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl AuditBackend for StorageAuditBackend {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "storage"
    }

    async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let bytes = serde_json::to_vec(entry).map_err(|e| AuditError::Serialization {
            reason: e.to_string(),
        })?;
        self.storage
            .put(&self.entry_key(entry), &bytes)
            .await
            .map_err(|e| self.failure(&e))
    }
}

impl std::fmt::Debug for StorageAuditBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAuditBackend").finish_non_exhaustive()
    }
}
