//! License and activation record stores.
//!
//! Records are JSON documents in the storage backend:
//!
//! | Record | Key |
//! |---|---|
//! | [`License`] | `licenses/<key_hash>` |
//! | [`Activation`] | `activations/<key_hash>/<hex(site_url)>` |
//! | license id index | `licenses_by_id/<id:020>` → key hash |
//! | license id sequence | `meta/license_seq` |
//!
//! Every mutation is a compare-and-swap loop: read the current bytes,
//! compute the replacement, and commit it only if nobody wrote in between.
//! Concurrent upserts of the same identity therefore resolve as
//! last-writer-wins without lost updates.

use std::sync::Arc;

use chrono::Utc;
use edgecache_storage::StorageBackend;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StoreError;
use crate::hasher::hash_prefix;
use crate::model::{Activation, ActivationStatus, License, LicenseDraft, LicenseSummary};

const LICENSE_PREFIX: &str = "licenses/";
const LICENSE_ID_PREFIX: &str = "licenses_by_id/";
const ACTIVATION_PREFIX: &str = "activations/";
const LICENSE_SEQ_KEY: &str = "meta/license_seq";

/// Upper bound on lost compare-and-swap races before giving up.
pub(crate) const MAX_CAS_ATTEMPTS: u32 = 32;

pub(crate) fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

pub(crate) fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization {
        key: key.to_owned(),
        reason: e.to_string(),
    })
}

/// Atomically read-modify-write the JSON record at `key`.
///
/// `apply` sees the current record (if any) and returns the replacement, or
/// `None` to leave storage untouched. It may run several times when other
/// writers race us, so it must be free of side effects. Returns the record
/// that was committed, or `None` if `apply` declined to write.
pub(crate) async fn update_record<T, F>(
    storage: &dyn StorageBackend,
    key: &str,
    mut apply: F,
) -> Result<Option<T>, StoreError>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<&T>) -> Option<T>,
{
    for _ in 0..MAX_CAS_ATTEMPTS {
        let current_bytes = storage.get(key).await?;
        let current: Option<T> = current_bytes
            .as_deref()
            .map(|bytes| decode(key, bytes))
            .transpose()?;

        let Some(next) = apply(current.as_ref()) else {
            return Ok(None);
        };

        let next_bytes = encode(key, &next)?;
        if storage
            .compare_and_swap(key, current_bytes.as_deref(), &next_bytes)
            .await?
        {
            return Ok(Some(next));
        }
        debug!(key, "compare-and-swap lost a race, retrying");
    }

    Err(StoreError::Contention {
        key: key.to_owned(),
        attempts: MAX_CAS_ATTEMPTS,
    })
}

fn license_key(key_hash: &str) -> String {
    format!("{LICENSE_PREFIX}{key_hash}")
}

fn license_id_key(id: u64) -> String {
    format!("{LICENSE_ID_PREFIX}{id:020}")
}

pub(crate) fn activation_key(key_hash: &str, site_url: &str) -> String {
    format!(
        "{ACTIVATION_PREFIX}{key_hash}/{}",
        hex::encode(site_url.as_bytes())
    )
}

/// Persisted licenses, keyed by key hash.
pub struct LicenseStore {
    storage: Arc<dyn StorageBackend>,
}

impl LicenseStore {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Look up a license by key hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage fails or the record is corrupt.
    pub async fn find(&self, key_hash: &str) -> Result<Option<License>, StoreError> {
        let key = license_key(key_hash);
        self.storage
            .get(&key)
            .await?
            .map(|bytes| decode(&key, &bytes))
            .transpose()
    }

    /// Insert a license or fully replace the mutable fields of an existing
    /// one. `id` and `created_at` survive replacement; `updated_at` is
    /// refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage fails or the update keeps losing
    /// races.
    pub async fn upsert(&self, key_hash: &str, draft: &LicenseDraft) -> Result<License, StoreError> {
        let key = license_key(key_hash);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current_bytes = self.storage.get(&key).await?;
            let now = Utc::now().timestamp();

            let record = match current_bytes.as_deref() {
                Some(bytes) => {
                    let existing: License = decode(&key, bytes)?;
                    License {
                        plan: draft.plan,
                        status: draft.status,
                        features: draft.features.clone(),
                        expires_at: draft.expires_at,
                        updated_at: now,
                        ..existing
                    }
                }
                None => License {
                    id: self.next_id().await?,
                    key_hash: key_hash.to_owned(),
                    plan: draft.plan,
                    status: draft.status,
                    features: draft.features.clone(),
                    expires_at: draft.expires_at,
                    created_at: now,
                    updated_at: now,
                },
            };

            let record_bytes = encode(&key, &record)?;
            if self
                .storage
                .compare_and_swap(&key, current_bytes.as_deref(), &record_bytes)
                .await?
            {
                // Rewritten on every upsert so a lost index write heals on
                // the next issue of the same key.
                self.storage
                    .put(&license_id_key(record.id), key_hash.as_bytes())
                    .await?;
                return Ok(record);
            }
            debug!(
                key_hash = hash_prefix(key_hash),
                "license upsert raced another writer, retrying"
            );
        }

        Err(StoreError::Contention {
            key,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// The `limit` most recently created licenses, newest first.
    ///
    /// Walks the id index from the top, so only `limit` records are read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage fails or a record is corrupt.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<LicenseSummary>, StoreError> {
        let mut index_keys = self.storage.list(LICENSE_ID_PREFIX).await?;
        // Zero-padded ids sort numerically as strings.
        index_keys.sort_unstable_by(|a, b| b.cmp(a));

        let mut summaries = Vec::with_capacity(limit.min(index_keys.len()));
        for index_key in index_keys.iter().take(limit) {
            let Some(hash_bytes) = self.storage.get(index_key).await? else {
                continue;
            };
            let key_hash = String::from_utf8(hash_bytes).map_err(|e| StoreError::Serialization {
                key: index_key.clone(),
                reason: e.to_string(),
            })?;
            if let Some(license) = self.find(&key_hash).await? {
                summaries.push(license.summary());
            }
        }
        Ok(summaries)
    }

    /// Allocate the next license id from the shared sequence.
    async fn next_id(&self) -> Result<u64, StoreError> {
        let next = update_record::<u64, _>(self.storage.as_ref(), LICENSE_SEQ_KEY, |current| {
            Some(current.copied().unwrap_or(0).saturating_add(1))
        })
        .await?;
        // `apply` always writes, so a committed value is always returned.
        Ok(next.unwrap_or_default())
    }
}

impl std::fmt::Debug for LicenseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseStore").finish_non_exhaustive()
    }
}

/// Persisted activations, keyed by (key hash, site).
pub struct ActivationStore {
    storage: Arc<dyn StorageBackend>,
}

impl ActivationStore {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Look up the activation binding a license to a site.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage fails or the record is corrupt.
    pub async fn find(
        &self,
        key_hash: &str,
        site_url: &str,
    ) -> Result<Option<Activation>, StoreError> {
        let key = activation_key(key_hash, site_url);
        self.storage
            .get(&key)
            .await?
            .map(|bytes| decode(&key, &bytes))
            .transpose()
    }

    /// Create the binding, or set its status and refresh
    /// `last_verified_at` if it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage fails or the update keeps losing
    /// races.
    pub async fn upsert(
        &self,
        key_hash: &str,
        site_url: &str,
        status: ActivationStatus,
    ) -> Result<Activation, StoreError> {
        let key = activation_key(key_hash, site_url);
        let now = Utc::now().timestamp();

        let written = update_record::<Activation, _>(self.storage.as_ref(), &key, |current| {
            Some(match current {
                Some(existing) => Activation {
                    status,
                    last_verified_at: now,
                    updated_at: now,
                    ..existing.clone()
                },
                None => Activation {
                    key_hash: key_hash.to_owned(),
                    site_url: site_url.to_owned(),
                    status,
                    last_verified_at: now,
                    created_at: now,
                    updated_at: now,
                },
            })
        })
        .await?;

        // `apply` always returns a record, so `None` is never produced here.
        written.ok_or(StoreError::Contention {
            key,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    /// Mark an existing binding inactive.
    ///
    /// Returns `false` when no binding exists for the pair. An already
    /// inactive binding still counts as found.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage fails or the update keeps losing
    /// races.
    pub async fn deactivate(&self, key_hash: &str, site_url: &str) -> Result<bool, StoreError> {
        let key = activation_key(key_hash, site_url);
        let now = Utc::now().timestamp();

        let written = update_record::<Activation, _>(self.storage.as_ref(), &key, |current| {
            current.map(|existing| Activation {
                status: ActivationStatus::Inactive,
                updated_at: now,
                ..existing.clone()
            })
        })
        .await?;

        Ok(written.is_some())
    }
}

impl std::fmt::Debug for ActivationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationStore").finish_non_exhaustive()
    }
}
