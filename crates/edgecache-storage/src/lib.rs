//! Storage backend abstraction for the `EdgeCache` license service.
//!
//! This crate defines the [`StorageBackend`] trait, a pure key-value storage
//! interface that knows nothing about licenses, activations, or rate limits.
//! The record stores in `edgecache-core` lay their JSON documents out on top
//! of it under fixed key prefixes.
//!
//! Besides plain reads and writes, every backend provides an atomic
//! [`compare_and_swap`](StorageBackend::compare_and_swap). Upserts and the
//! rate-limit counter are built on it so concurrent writers never lose
//! updates.
//!
//! Four implementations are provided:
//!
//! - [`RedbBackend`]: production default, pure Rust (feature `redb-backend`)
//! - [`RocksDbBackend`]: backed by `RocksDB` (feature `rocksdb-backend`)
//! - [`PostgresBackend`]: shared store for multi-instance deployments (feature `postgres-backend`)
//! - [`MemoryBackend`]: in-memory, for testing and development

mod error;
mod memory;
#[cfg(feature = "postgres-backend")]
mod postgres_backend;
#[cfg(feature = "redb-backend")]
mod redb_backend;
#[cfg(feature = "rocksdb-backend")]
mod rocksdb_backend;

pub use error::StorageError;
pub use memory::MemoryBackend;
#[cfg(feature = "postgres-backend")]
pub use postgres_backend::PostgresBackend;
#[cfg(feature = "redb-backend")]
pub use redb_backend::RedbBackend;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_backend::RocksDbBackend;

/// A pluggable key-value storage backend.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g.
/// `licenses/<hash>`, `rate_limits/<hash>`). Values are opaque byte arrays.
///
/// Implementations must be safe to share across async tasks (`Send + Sync`).
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the underlying backend fails.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// List all keys that start with the given prefix, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the underlying backend fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Atomically replace the value at `key` if it currently equals
    /// `expected`.
    ///
    /// `expected == None` means "only if the key is absent". Returns `true`
    /// when the swap happened and `false` when the current value did not
    /// match, in which case nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] or [`StorageError::Transaction`] if the
    /// underlying backend fails.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StorageError>;

    /// Check whether a key exists in storage.
    ///
    /// The default implementation calls [`get`](StorageBackend::get) and checks
    /// for `Some`. Backends may override this with a more efficient check.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] if the underlying backend fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }
}
