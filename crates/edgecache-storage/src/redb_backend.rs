//! Pure-Rust redb storage backend, the default for single-node deployments.
//!
//! Every operation runs inside a redb transaction on the Tokio blocking
//! pool. redb allows only one write transaction at a time, which is what
//! makes [`compare_and_swap`](StorageBackend::compare_and_swap) atomic here:
//! the read, the comparison and the write all happen inside a single write
//! transaction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::{StorageBackend, StorageError};

/// Single table for every record; key prefixes separate the record kinds.
const DATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("data");

/// A storage backend backed by a redb database file.
///
/// # Examples
///
/// ```no_run
/// # use edgecache_storage::RedbBackend;
/// let backend = RedbBackend::open("storage/license.redb").unwrap();
/// ```
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn txn_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Transaction {
        reason: e.to_string(),
    }
}

fn table_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::MissingTable {
        name: format!("data: {e}"),
    }
}

fn join_err(e: &tokio::task::JoinError) -> StorageError {
    StorageError::Transaction {
        reason: format!("blocking task panicked: {e}"),
    }
}

impl RedbBackend {
    /// Open or create a redb database at the given path.
    ///
    /// The parent directory must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`] if redb fails to open or create the
    /// database file, or [`StorageError::MissingTable`] if the data table
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(|e| StorageError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // Opening the table in a write transaction creates it if missing.
        let txn = db.begin_write().map_err(txn_err)?;
        {
            let _table = txn.open_table(DATA_TABLE).map_err(table_err)?;
        }
        txn.commit().map_err(txn_err)?;

        Ok(Self {
            db: Arc::new(db),
            path: path.to_path_buf(),
        })
    }

    /// Return the filesystem path of this database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_read().map_err(txn_err)?;
            let table = txn.open_table(DATA_TABLE).map_err(table_err)?;
            let value = table
                .get(key.as_str())
                .map_err(|e| StorageError::Read {
                    key: key.clone(),
                    reason: e.to_string(),
                })?
                .map(|v| v.value().to_vec());
            Ok(value)
        })
        .await
        .map_err(|e| join_err(&e))?
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(DATA_TABLE).map_err(table_err)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(|e| StorageError::Write {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(txn_err)
        })
        .await
        .map_err(|e| join_err(&e))?
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let db = Arc::clone(&self.db);
        let prefix = prefix.to_owned();
        tokio::task::spawn_blocking(move || {
            let list_err = |e: &dyn std::fmt::Display| StorageError::List {
                prefix: prefix.clone(),
                reason: e.to_string(),
            };
            let txn = db.begin_read().map_err(txn_err)?;
            let table = txn.open_table(DATA_TABLE).map_err(table_err)?;

            let mut keys = Vec::new();
            for item in table.range(prefix.as_str()..).map_err(|e| list_err(&e))? {
                let (k, _) = item.map_err(|e| list_err(&e))?;
                let key = k.value();
                if !key.starts_with(prefix.as_str()) {
                    break;
                }
                keys.push(key.to_owned());
            }
            Ok(keys)
        })
        .await
        .map_err(|e| join_err(&e))?
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StorageError> {
        let db = Arc::clone(&self.db);
        let key = key.to_owned();
        let expected = expected.map(<[u8]>::to_vec);
        let new = new.to_vec();
        tokio::task::spawn_blocking(move || {
            let txn = db.begin_write().map_err(txn_err)?;
            {
                let mut table = txn.open_table(DATA_TABLE).map_err(table_err)?;
                let current = table
                    .get(key.as_str())
                    .map_err(|e| StorageError::Read {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?
                    .map(|v| v.value().to_vec());
                if current != expected {
                    return Ok(false);
                }
                table
                    .insert(key.as_str(), new.as_slice())
                    .map_err(|e| StorageError::Write {
                        key: key.clone(),
                        reason: e.to_string(),
                    })?;
            }
            txn.commit().map_err(txn_err)?;
            Ok(true)
        })
        .await
        .map_err(|e| join_err(&e))?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, RedbBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("license.redb")).unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn put_get_and_list() {
        let (_dir, backend) = open_temp();
        backend.put("licenses/a", b"1").await.unwrap();
        backend.put("licenses/b", b"2").await.unwrap();
        backend.put("rate_limits/a", b"3").await.unwrap();

        assert_eq!(backend.get("licenses/a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(
            backend.list("licenses/").await.unwrap(),
            vec!["licenses/a", "licenses/b"]
        );
    }

    #[tokio::test]
    async fn cas_semantics() {
        let (_dir, backend) = open_temp();
        assert!(backend.compare_and_swap("k", None, b"1").await.unwrap());
        assert!(!backend.compare_and_swap("k", None, b"x").await.unwrap());
        assert!(!backend.compare_and_swap("k", Some(b"0"), b"x").await.unwrap());
        assert!(backend.compare_and_swap("k", Some(b"1"), b"2").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("license.redb");
        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.put("licenses/a", b"1").await.unwrap();
        }
        let backend = RedbBackend::open(&path).unwrap();
        assert_eq!(backend.get("licenses/a").await.unwrap(), Some(b"1".to_vec()));
    }
}
