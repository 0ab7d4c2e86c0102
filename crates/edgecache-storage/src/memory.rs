//! In-memory storage backend.
//!
//! Stores all data in a `BTreeMap` behind a `RwLock`. Nothing is persisted;
//! use it for tests and for throwaway development servers.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{StorageBackend, StorageError};

/// An in-memory storage backend backed by a `BTreeMap`.
///
/// Clones share the same underlying map. Compare-and-swap holds the write
/// lock across the comparison and the write, so it is atomic with respect to
/// every other operation on the map.
///
/// # Examples
///
/// ```
/// # use edgecache_storage::{MemoryBackend, StorageBackend};
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MemoryBackend::new();
/// backend.put("licenses/abc", b"{}").await.unwrap();
/// let val = backend.get("licenses/abc").await.unwrap();
/// assert_eq!(val, Some(b"{}".to_vec()));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().await;
        let keys = data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(keys)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StorageError> {
        let mut data = self.data.write().await;
        if data.get(key).map(Vec::as_slice) != expected {
            return Ok(false);
        }
        data.insert(key.to_owned(), new.to_vec());
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let data = self.data.read().await;
        Ok(data.contains_key(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_nonexistent_returns_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("licenses/missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_overwrites_existing() {
        let backend = MemoryBackend::new();
        backend.put("key", b"v1").await.unwrap();
        backend.put("key", b"v2").await.unwrap();
        assert_eq!(backend.get("key").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn list_with_prefix() {
        let backend = MemoryBackend::new();
        backend.put("activations/aa/01", b"1").await.unwrap();
        backend.put("activations/aa/02", b"2").await.unwrap();
        backend.put("activations/ab/01", b"3").await.unwrap();
        backend.put("licenses/aa", b"4").await.unwrap();

        let keys = backend.list("activations/aa/").await.unwrap();
        assert_eq!(keys, vec!["activations/aa/01", "activations/aa/02"]);
    }

    #[tokio::test]
    async fn cas_inserts_only_when_absent() {
        let backend = MemoryBackend::new();
        assert!(backend.compare_and_swap("k", None, b"first").await.unwrap());
        assert!(!backend.compare_and_swap("k", None, b"second").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn cas_replaces_matching_value() {
        let backend = MemoryBackend::new();
        backend.put("k", b"1").await.unwrap();
        assert!(backend.compare_and_swap("k", Some(b"1"), b"2").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn cas_rejects_stale_value() {
        let backend = MemoryBackend::new();
        backend.put("k", b"2").await.unwrap();
        assert!(!backend.compare_and_swap("k", Some(b"1"), b"3").await.unwrap());
        assert!(!backend.compare_and_swap("missing", Some(b"1"), b"3").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), Some(b"2".to_vec()));
        assert!(!backend.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.put("key", b"val").await.unwrap();
        assert_eq!(clone.get("key").await.unwrap(), Some(b"val".to_vec()));
    }
}
