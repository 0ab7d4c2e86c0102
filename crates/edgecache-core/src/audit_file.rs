//! JSON-lines file mirror of the audit trail.
//!
//! Each line is one complete [`AuditEntry`]. The file is only ever opened
//! for append; writes are serialized behind a `tokio::sync::Mutex` and
//! flushed before `log` returns.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::audit::{AuditBackend, AuditEntry};
use crate::error::AuditError;

/// Audit backend that appends JSON lines to a file.
pub struct FileAuditBackend {
    path: PathBuf,
    /// Opened lazily on the first write.
    writer: Mutex<Option<File>>,
}

impl FileAuditBackend {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    fn failure(&self, reason: String) -> AuditError {
        AuditError::BackendFailure {
            name: self.name().to_owned(),
            reason,
        }
    }
}

#[async_trait::async_trait]
impl AuditBackend for FileAuditBackend {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "file"
    }

    async fn log(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry).map_err(|e| AuditError::Serialization {
            reason: e.to_string(),
        })?;
        line.push(b'\n');

        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| {
                    self.failure(format!(
                        "failed to open audit file '{}': {e}",
                        self.path.display()
                    ))
                })?;
            *guard = Some(file);
        }
        let Some(file) = guard.as_mut() else {
            return Err(self.failure("audit file handle missing after open".to_owned()));
        };

        file.write_all(&line)
            .await
            .map_err(|e| self.failure(format!("write failed: {e}")))?;
        file.flush()
            .await
            .map_err(|e| self.failure(format!("flush failed: {e}")))
    }
}

impl std::fmt::Debug for FileAuditBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
