//! Fixed-window rate limiter.
//!
//! One [`RateLimitCounter`] per limiter key, stored at
//! `rate_limits/<limiter_key>`. A window opens on the first hit and lasts
//! `window_secs`; within it at most `max_requests` hits pass. Once the
//! window has elapsed the next hit resets it. Counts are reset, never
//! decremented.
//!
//! Each decision is committed with a single compare-and-swap against the
//! counter bytes it was computed from. Two callers sharing a key can never
//! both pass on the same stale count: the loser re-reads and decides again.
//! A rejected hit writes nothing.

use std::sync::Arc;

use chrono::Utc;
use edgecache_storage::StorageBackend;
use tracing::debug;

use crate::error::StoreError;
use crate::hasher::hash_prefix;
use crate::model::RateLimitCounter;
use crate::store::{decode, update_record};

const RATE_LIMIT_PREFIX: &str = "rate_limits/";

/// Per-key fixed-window throttle over the storage backend.
pub struct RateLimiter {
    storage: Arc<dyn StorageBackend>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Record a hit for `limiter_key` now.
    ///
    /// Returns `true` when the caller is over the limit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage fails or the counter keeps losing
    /// races.
    pub async fn hit(
        &self,
        limiter_key: &str,
        window_secs: u64,
        max_requests: u64,
    ) -> Result<bool, StoreError> {
        self.hit_at(limiter_key, window_secs, max_requests, Utc::now().timestamp())
            .await
    }

    /// Record a hit at an explicit unix timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage fails or the counter keeps losing
    /// races.
    pub async fn hit_at(
        &self,
        limiter_key: &str,
        window_secs: u64,
        max_requests: u64,
        now: i64,
    ) -> Result<bool, StoreError> {
        let key = counter_key(limiter_key);
        let window = i64::try_from(window_secs).unwrap_or(i64::MAX);

        let written = update_record::<RateLimitCounter, _>(self.storage.as_ref(), &key, |current| {
            match current {
                Some(counter) if now.saturating_sub(counter.window_start) < window => {
                    if counter.count >= max_requests {
                        None
                    } else {
                        Some(RateLimitCounter {
                            count: counter.count.saturating_add(1),
                            ..*counter
                        })
                    }
                }
                // No counter yet, or the window has elapsed.
                _ => Some(RateLimitCounter {
                    window_start: now,
                    count: 1,
                }),
            }
        })
        .await?;

        let limited = written.is_none();
        if limited {
            debug!(limiter_key = hash_prefix(limiter_key), "rate limit exceeded");
        }
        Ok(limited)
    }

    /// Current counter for `limiter_key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if storage fails or the record is corrupt.
    pub async fn counter(&self, limiter_key: &str) -> Result<Option<RateLimitCounter>, StoreError> {
        let key = counter_key(limiter_key);
        self.storage
            .get(&key)
            .await?
            .map(|bytes| decode(&key, &bytes))
            .transpose()
    }
}

fn counter_key(limiter_key: &str) -> String {
    format!("{RATE_LIMIT_PREFIX}{limiter_key}")
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}
