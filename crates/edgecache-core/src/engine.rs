//! The license validation and activation engine.
//!
//! [`LicenseEngine`] owns no state between calls: every decision re-reads
//! the stores. Validation outcomes (bad input, unknown key, inactive or
//! expired license, rate limiting) are returned as [`LicenseResult`] /
//! [`OpResult`] values. Only infrastructure failures become
//! [`EngineError`].

use std::sync::Arc;

use chrono::Utc;
use edgecache_storage::StorageBackend;
use serde_json::json;
use tracing::{debug, info};

use crate::audit::AuditManager;
use crate::error::EngineError;
use crate::hasher::{constant_time_eq, hash_key, hash_prefix, limiter_key};
use crate::model::{
    ActivationStatus, License, LicenseDraft, LicenseResult, LicenseStatus, LicenseSummary,
    OpResult, Plan,
};
use crate::rate_limit::RateLimiter;
use crate::store::{ActivationStore, LicenseStore};

const MSG_REQUIRED: &str = "license_key and site_url are required";
const MSG_RATE_LIMITED: &str = "rate limit exceeded";
const MSG_INVALID_KEY: &str = "invalid license key";

/// Features granted to a license bootstrapped from the master key.
const MASTER_KEY_FEATURES: [&str; 2] = ["prefetch", "analytics"];

/// Engine settings, normally read from the environment by the server.
#[derive(Clone)]
pub struct EngineConfig {
    /// Bootstrap key that creates a `pro` license on first activation.
    pub master_key: Option<String>,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_requests: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            master_key: None,
            rate_limit_window_secs: 60,
            rate_limit_max_requests: 60,
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field(
                "master_key",
                &self.master_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .finish()
    }
}

/// Decides license status and manages activations.
pub struct LicenseEngine {
    licenses: LicenseStore,
    activations: ActivationStore,
    limiter: RateLimiter,
    audit: Arc<AuditManager>,
    /// Trimmed; `None` when unset or blank.
    master_key: Option<String>,
    window_secs: u64,
    max_requests: u64,
}

impl LicenseEngine {
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        audit: Arc<AuditManager>,
        config: EngineConfig,
    ) -> Self {
        let master_key = config
            .master_key
            .map(|key| key.trim().to_owned())
            .filter(|key| !key.is_empty());

        Self {
            licenses: LicenseStore::new(Arc::clone(&storage)),
            activations: ActivationStore::new(Arc::clone(&storage)),
            limiter: RateLimiter::new(storage),
            audit,
            master_key,
            window_secs: config.rate_limit_window_secs,
            max_requests: config.rate_limit_max_requests,
        }
    }

    #[must_use]
    pub fn licenses(&self) -> &LicenseStore {
        &self.licenses
    }

    #[must_use]
    pub fn activations(&self) -> &ActivationStore {
        &self.activations
    }

    /// Activate `license_key` for `site_url`.
    ///
    /// An unknown key equal to the configured master key bootstraps a `pro`
    /// license for it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if storage or the audit trail fails.
    pub async fn activate(
        &self,
        license_key: &str,
        site_url: &str,
        caller_address: &str,
    ) -> Result<LicenseResult, EngineError> {
        let license_key = license_key.trim();
        let site_url = site_url.trim();

        if license_key.is_empty() || site_url.is_empty() {
            return Ok(LicenseResult::denied(LicenseStatus::Invalid, MSG_REQUIRED));
        }
        if self.rate_limited(license_key, caller_address).await? {
            return Ok(LicenseResult::denied(LicenseStatus::Inactive, MSG_RATE_LIMITED));
        }

        let key_hash = hash_key(license_key);

        if let Some(license) = self.licenses.find(&key_hash).await? {
            if license.status != LicenseStatus::Active {
                return Ok(LicenseResult::denied(
                    LicenseStatus::Invalid,
                    "license is not active",
                ));
            }
            if license.is_expired_at(Utc::now().timestamp()) {
                return Ok(LicenseResult::expired(license.expires_at));
            }

            self.activations
                .upsert(&key_hash, site_url, ActivationStatus::Active)
                .await?;
            self.audit
                .record(
                    "license.activate",
                    json!({ "site_url": site_url, "via": "stored" }),
                )
                .await?;
            debug!(key_hash = hash_prefix(&key_hash), site_url, "license activated");

            return Ok(grant(license, "license activated"));
        }

        if self.is_master_key(license_key) {
            let draft = LicenseDraft {
                plan: Plan::Pro,
                status: LicenseStatus::Active,
                features: MASTER_KEY_FEATURES.iter().map(|f| (*f).to_owned()).collect(),
                expires_at: None,
            };
            let license = self.licenses.upsert(&key_hash, &draft).await?;
            self.activations
                .upsert(&key_hash, site_url, ActivationStatus::Active)
                .await?;
            self.audit
                .record(
                    "license.activate",
                    json!({ "site_url": site_url, "via": "master_key" }),
                )
                .await?;
            info!(
                key_hash = hash_prefix(&key_hash),
                site_url, "license bootstrapped from master key"
            );

            return Ok(grant(license, "license activated"));
        }

        self.audit
            .record("license.activate_invalid", json!({ "site_url": site_url }))
            .await?;
        Ok(LicenseResult::denied(LicenseStatus::Invalid, MSG_INVALID_KEY))
    }

    /// Check `license_key` for `site_url`, refreshing the activation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if storage or the audit trail fails.
    pub async fn verify(
        &self,
        license_key: &str,
        site_url: &str,
        caller_address: &str,
    ) -> Result<LicenseResult, EngineError> {
        let license_key = license_key.trim();
        let site_url = site_url.trim();

        if license_key.is_empty() || site_url.is_empty() {
            return Ok(LicenseResult::denied(LicenseStatus::Invalid, MSG_REQUIRED));
        }
        if self.rate_limited(license_key, caller_address).await? {
            return Ok(LicenseResult::denied(LicenseStatus::Inactive, MSG_RATE_LIMITED));
        }

        let key_hash = hash_key(license_key);
        let Some(license) = self.licenses.find(&key_hash).await? else {
            return Ok(LicenseResult::denied(LicenseStatus::Invalid, MSG_INVALID_KEY));
        };

        if license.status != LicenseStatus::Active {
            return Ok(LicenseResult::denied(
                LicenseStatus::Inactive,
                "license inactive",
            ));
        }
        if license.is_expired_at(Utc::now().timestamp()) {
            return Ok(LicenseResult::expired(license.expires_at));
        }

        self.activations
            .upsert(&key_hash, site_url, ActivationStatus::Active)
            .await?;
        self.audit
            .record("license.verify", json!({ "site_url": site_url }))
            .await?;

        Ok(grant(license, "license valid"))
    }

    /// Mark the activation of `license_key` on `site_url` inactive.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if storage or the audit trail fails.
    pub async fn deactivate(
        &self,
        license_key: &str,
        site_url: &str,
    ) -> Result<OpResult, EngineError> {
        let license_key = license_key.trim();
        let site_url = site_url.trim();

        if license_key.is_empty() || site_url.is_empty() {
            return Ok(OpResult::new(false, MSG_REQUIRED));
        }

        let key_hash = hash_key(license_key);
        let found = self.activations.deactivate(&key_hash, site_url).await?;
        self.audit
            .record(
                "license.deactivate",
                json!({ "site_url": site_url, "ok": found }),
            )
            .await?;

        if found {
            info!(key_hash = hash_prefix(&key_hash), site_url, "activation deactivated");
            Ok(OpResult::new(true, "deactivated"))
        } else {
            Ok(OpResult::new(false, "activation not found"))
        }
    }

    /// Create or fully replace the license for `license_key`.
    ///
    /// Unknown plans fall back to `pro` and unknown statuses to `active`.
    /// Features are trimmed and blanks dropped; order and duplicates are
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if storage or the audit trail fails.
    pub async fn issue_or_update_license(
        &self,
        license_key: &str,
        plan: &str,
        status: &str,
        features: &[String],
        expires_at: Option<i64>,
    ) -> Result<OpResult, EngineError> {
        let license_key = license_key.trim();
        if license_key.is_empty() {
            return Ok(OpResult::new(false, "license_key is required"));
        }

        let draft = LicenseDraft {
            plan: Plan::parse(plan).unwrap_or(Plan::Pro),
            status: LicenseStatus::parse(status).unwrap_or(LicenseStatus::Active),
            features: features
                .iter()
                .map(String::as_str)
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_owned)
                .collect(),
            expires_at,
        };

        let key_hash = hash_key(license_key);
        let license = self.licenses.upsert(&key_hash, &draft).await?;
        self.audit
            .record(
                "license.issue",
                json!({ "plan": draft.plan.as_str(), "status": draft.status.as_str() }),
            )
            .await?;
        info!(
            key_hash = hash_prefix(&key_hash),
            id = license.id,
            plan = draft.plan.as_str(),
            status = draft.status.as_str(),
            "license upserted"
        );

        Ok(OpResult::new(true, "license upserted"))
    }

    /// The `limit` most recently created licenses, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if storage fails.
    pub async fn list_licenses(&self, limit: usize) -> Result<Vec<LicenseSummary>, EngineError> {
        Ok(self.licenses.list_recent(limit).await?)
    }

    async fn rate_limited(&self, license_key: &str, caller_address: &str) -> Result<bool, EngineError> {
        Ok(self
            .limiter
            .hit(
                &limiter_key(license_key, caller_address),
                self.window_secs,
                self.max_requests,
            )
            .await?)
    }

    fn is_master_key(&self, license_key: &str) -> bool {
        self.master_key
            .as_deref()
            .is_some_and(|master| constant_time_eq(master, license_key))
    }
}

fn grant(license: License, message: &str) -> LicenseResult {
    LicenseResult::granted(license.plan, license.features, license.expires_at, message)
}

impl std::fmt::Debug for LicenseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseEngine")
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .field("window_secs", &self.window_secs)
            .field("max_requests", &self.max_requests)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::audit::{AuditBackend, AuditEntry, StorageAuditBackend};
    use crate::error::AuditError;
    use crate::model::Activation;
    use crate::store::activation_key;
    use edgecache_storage::MemoryBackend;

    const SITE: &str = "https://shop.example";
    const CALLER: &str = "10.0.0.1";

    struct Harness {
        engine: LicenseEngine,
        storage: Arc<dyn StorageBackend>,
        audit_log: Arc<StorageAuditBackend>,
    }

    impl Harness {
        async fn new(config: EngineConfig) -> Self {
            let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
            let audit_log = Arc::new(StorageAuditBackend::new(Arc::clone(&storage)));
            let audit = Arc::new(AuditManager::new());
            audit
                .add_backend(Arc::clone(&audit_log) as Arc<dyn AuditBackend>)
                .await;
            Self {
                engine: LicenseEngine::new(Arc::clone(&storage), audit, config),
                storage,
                audit_log,
            }
        }

        async fn events(&self) -> Vec<AuditEntry> {
            let mut entries = self.audit_log.recent(usize::MAX).await.unwrap();
            entries.reverse();
            entries
        }

        async fn issue(&self, key: &str, plan: &str, status: &str, expires_at: Option<i64>) {
            let features = vec!["prefetch".to_owned(), "edge".to_owned()];
            let result = self
                .engine
                .issue_or_update_license(key, plan, status, &features, expires_at)
                .await
                .unwrap();
            assert!(result.ok);
        }
    }

    fn master_config() -> EngineConfig {
        EngineConfig {
            master_key: Some(" MASTER-KEY ".to_owned()),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn verify_active_license_grants_and_refreshes_activation() {
        let h = Harness::new(EngineConfig::default()).await;
        h.issue("KEY-1", "enterprise", "active", None).await;

        let result = h.engine.verify("KEY-1", SITE, CALLER).await.unwrap();
        assert_eq!(result.status, LicenseStatus::Active);
        assert_eq!(result.plan, Plan::Enterprise);
        assert_eq!(result.features, vec!["prefetch", "edge"]);
        assert_eq!(result.message, "license valid");

        let activation = h
            .engine
            .activations()
            .find(&hash_key("KEY-1"), SITE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(activation.status, ActivationStatus::Active);
        assert!(activation.last_verified_at > 0);

        let events = h.events().await;
        assert_eq!(events.last().unwrap().event, "license.verify");
        assert_eq!(events.last().unwrap().details["site_url"], SITE);
    }

    #[tokio::test]
    async fn verify_reactivates_stale_binding_and_bumps_timestamp() {
        let h = Harness::new(EngineConfig::default()).await;
        h.issue("KEY-1", "pro", "active", None).await;

        let key_hash = hash_key("KEY-1");
        let stale = Activation {
            key_hash: key_hash.clone(),
            site_url: SITE.to_owned(),
            status: ActivationStatus::Inactive,
            last_verified_at: 1_000,
            created_at: 900,
            updated_at: 1_000,
        };
        let key = activation_key(&key_hash, SITE);
        h.storage
            .put(&key, &serde_json::to_vec(&stale).unwrap())
            .await
            .unwrap();

        assert!(h.engine.verify("KEY-1", SITE, CALLER).await.unwrap().is_active());

        let activation = h
            .engine
            .activations()
            .find(&key_hash, SITE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(activation.status, ActivationStatus::Active);
        assert!(activation.last_verified_at > 1_000);
        assert_eq!(activation.created_at, 900);
    }

    #[tokio::test]
    async fn inputs_are_trimmed() {
        let h = Harness::new(EngineConfig::default()).await;
        h.issue("KEY-1", "pro", "active", None).await;

        let result = h
            .engine
            .verify("  KEY-1\n", &format!(" {SITE} "), CALLER)
            .await
            .unwrap();
        assert!(result.is_active());
        assert!(
            h.engine
                .activations()
                .find(&hash_key("KEY-1"), SITE)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn expired_license_is_reported_by_verify_and_activate() {
        let h = Harness::new(EngineConfig::default()).await;
        h.issue("OLD", "pro", "active", Some(1_000)).await;

        for result in [
            h.engine.verify("OLD", SITE, CALLER).await.unwrap(),
            h.engine.activate("OLD", SITE, CALLER).await.unwrap(),
        ] {
            assert_eq!(result.status, LicenseStatus::Expired);
            assert_eq!(result.expires_at, Some(1_000));
            assert_eq!(result.plan, Plan::Free);
            assert!(result.features.is_empty());
            assert_eq!(result.message, "license expired");
        }
        assert!(
            h.engine
                .activations()
                .find(&hash_key("OLD"), SITE)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn non_positive_expiry_never_expires() {
        let h = Harness::new(EngineConfig::default()).await;
        h.issue("ZERO", "pro", "active", Some(0)).await;
        assert!(h.engine.verify("ZERO", SITE, CALLER).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn empty_inputs_are_invalid() {
        let h = Harness::new(EngineConfig::default()).await;
        for (key, site) in [("", SITE), ("KEY", ""), ("   ", "  ")] {
            let result = h.engine.activate(key, site, CALLER).await.unwrap();
            assert_eq!(result.status, LicenseStatus::Invalid);
            assert_eq!(result.message, "license_key and site_url are required");

            let result = h.engine.verify(key, site, CALLER).await.unwrap();
            assert_eq!(result.status, LicenseStatus::Invalid);

            let op = h.engine.deactivate(key, site).await.unwrap();
            assert!(!op.ok);
            assert_eq!(op.message, "license_key and site_url are required");
        }
        assert!(h.events().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_key_is_invalid() {
        let h = Harness::new(master_config()).await;

        let verified = h.engine.verify("NOPE", SITE, CALLER).await.unwrap();
        assert_eq!(verified.status, LicenseStatus::Invalid);
        assert_eq!(verified.message, "invalid license key");

        let activated = h.engine.activate("NOPE", SITE, CALLER).await.unwrap();
        assert_eq!(activated.status, LicenseStatus::Invalid);
        assert_eq!(activated.message, "invalid license key");

        let events = h.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "license.activate_invalid");
        assert_eq!(events[0].details["site_url"], SITE);
    }

    #[tokio::test]
    async fn non_active_license_is_rejected_differently_by_each_operation() {
        let h = Harness::new(EngineConfig::default()).await;
        h.issue("OFF", "pro", "inactive", None).await;

        let verified = h.engine.verify("OFF", SITE, CALLER).await.unwrap();
        assert_eq!(verified.status, LicenseStatus::Inactive);
        assert_eq!(verified.message, "license inactive");

        let activated = h.engine.activate("OFF", SITE, CALLER).await.unwrap();
        assert_eq!(activated.status, LicenseStatus::Invalid);
        assert_eq!(activated.message, "license is not active");
    }

    #[tokio::test]
    async fn master_key_bootstraps_exactly_one_license() {
        let h = Harness::new(master_config()).await;

        let first = h.engine.activate("MASTER-KEY", SITE, CALLER).await.unwrap();
        assert_eq!(first.status, LicenseStatus::Active);
        assert_eq!(first.plan, Plan::Pro);
        assert_eq!(first.features, vec!["prefetch", "analytics"]);
        assert_eq!(first.expires_at, None);
        assert_eq!(first.message, "license activated");

        let second = h
            .engine
            .activate("MASTER-KEY", "https://other.example", CALLER)
            .await
            .unwrap();
        assert_eq!(second.status, LicenseStatus::Active);

        assert_eq!(h.engine.list_licenses(100).await.unwrap().len(), 1);
        let via: Vec<String> = h
            .events()
            .await
            .iter()
            .map(|e| e.details["via"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(via, vec!["master_key", "stored"]);
    }

    #[tokio::test]
    async fn master_key_does_not_bootstrap_on_verify() {
        let h = Harness::new(master_config()).await;
        let result = h.engine.verify("MASTER-KEY", SITE, CALLER).await.unwrap();
        assert_eq!(result.status, LicenseStatus::Invalid);
        assert!(h.engine.list_licenses(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_master_key_is_disabled() {
        let h = Harness::new(EngineConfig {
            master_key: Some("   ".to_owned()),
            ..EngineConfig::default()
        })
        .await;
        let result = h.engine.activate("   x", SITE, CALLER).await.unwrap();
        assert_eq!(result.status, LicenseStatus::Invalid);
        assert_eq!(result.message, "invalid license key");
    }

    #[tokio::test]
    async fn rate_limit_folds_into_inactive() {
        let h = Harness::new(EngineConfig {
            rate_limit_max_requests: 2,
            ..EngineConfig::default()
        })
        .await;
        h.issue("KEY-1", "pro", "active", None).await;

        assert!(h.engine.verify("KEY-1", SITE, CALLER).await.unwrap().is_active());
        assert!(h.engine.activate("KEY-1", SITE, CALLER).await.unwrap().is_active());

        let limited = h.engine.verify("KEY-1", SITE, CALLER).await.unwrap();
        assert_eq!(limited.status, LicenseStatus::Inactive);
        assert_eq!(limited.message, "rate limit exceeded");
        assert_eq!(limited.plan, Plan::Free);

        // A different caller has its own window.
        assert!(h.engine.verify("KEY-1", SITE, "10.0.0.2").await.unwrap().is_active());
    }

    #[tokio::test]
    async fn deactivate_reports_whether_binding_existed() {
        let h = Harness::new(EngineConfig::default()).await;
        h.issue("KEY-1", "pro", "active", None).await;

        let missing = h.engine.deactivate("KEY-1", SITE).await.unwrap();
        assert_eq!(missing, OpResult::new(false, "activation not found"));

        h.engine.activate("KEY-1", SITE, CALLER).await.unwrap();
        let done = h.engine.deactivate("KEY-1", SITE).await.unwrap();
        assert_eq!(done, OpResult::new(true, "deactivated"));

        let activation = h
            .engine
            .activations()
            .find(&hash_key("KEY-1"), SITE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(activation.status, ActivationStatus::Inactive);

        let deactivations: Vec<bool> = h
            .events()
            .await
            .iter()
            .filter(|e| e.event == "license.deactivate")
            .map(|e| e.details["ok"].as_bool().unwrap())
            .collect();
        assert_eq!(deactivations, vec![false, true]);
    }

    #[tokio::test]
    async fn issue_normalizes_unknown_plan_and_status() {
        let h = Harness::new(EngineConfig::default()).await;
        let op = h
            .engine
            .issue_or_update_license("KEY-1", "bogus", "bogus", &[], None)
            .await
            .unwrap();
        assert_eq!(op, OpResult::new(true, "license upserted"));

        let license = h.engine.licenses().find(&hash_key("KEY-1")).await.unwrap().unwrap();
        assert_eq!(license.plan, Plan::Pro);
        assert_eq!(license.status, LicenseStatus::Active);

        let events = h.events().await;
        assert_eq!(events[0].event, "license.issue");
        assert_eq!(events[0].details, json!({"plan": "pro", "status": "active"}));
    }

    #[tokio::test]
    async fn issue_matches_plan_case_sensitively() {
        let h = Harness::new(EngineConfig::default()).await;
        h.engine
            .issue_or_update_license("KEY-1", "Enterprise", "INACTIVE", &[], None)
            .await
            .unwrap();
        let license = h.engine.licenses().find(&hash_key("KEY-1")).await.unwrap().unwrap();
        assert_eq!(license.plan, Plan::Pro);
        assert_eq!(license.status, LicenseStatus::Active);
    }

    #[tokio::test]
    async fn issue_trims_and_drops_blank_features() {
        let h = Harness::new(EngineConfig::default()).await;
        let features: Vec<String> = ["a", "", " b ", "a"].iter().map(|f| (*f).to_owned()).collect();
        h.engine
            .issue_or_update_license("KEY-1", "pro", "active", &features, None)
            .await
            .unwrap();
        let license = h.engine.licenses().find(&hash_key("KEY-1")).await.unwrap().unwrap();
        assert_eq!(license.features, vec!["a", "b", "a"]);
    }

    #[tokio::test]
    async fn issue_requires_key() {
        let h = Harness::new(EngineConfig::default()).await;
        let op = h
            .engine
            .issue_or_update_license("  ", "pro", "active", &[], None)
            .await
            .unwrap();
        assert_eq!(op, OpResult::new(false, "license_key is required"));
        assert!(h.engine.list_licenses(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reissue_replaces_license_in_place() {
        let h = Harness::new(EngineConfig::default()).await;
        h.issue("KEY-1", "pro", "active", None).await;
        h.issue("KEY-1", "free", "inactive", Some(99)).await;

        let listed = h.engine.list_licenses(100).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].plan, Plan::Free);
        assert_eq!(listed[0].status, LicenseStatus::Inactive);
        assert_eq!(listed[0].expires_at, Some(99));
    }

    #[tokio::test]
    async fn audit_failure_fails_the_operation() {
        struct Broken;

        #[async_trait::async_trait]
        impl AuditBackend for Broken {
            fn name(&self) -> &str {
                "broken"
            }

            async fn log(&self, _entry: &AuditEntry) -> Result<(), AuditError> {
                Err(AuditError::BackendFailure {
                    name: "broken".to_owned(),
                    reason: "unavailable".to_owned(),
                })
            }
        }

        let audit = Arc::new(AuditManager::new());
        audit.add_backend(Arc::new(Broken)).await;
        let engine = LicenseEngine::new(
            Arc::new(MemoryBackend::new()),
            audit,
            EngineConfig::default(),
        );

        let err = engine
            .issue_or_update_license("KEY-1", "pro", "active", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Audit(AuditError::AllBackendsFailed)));
    }

    #[test]
    fn config_debug_redacts_master_key() {
        let rendered = format!("{:?}", master_config());
        assert!(!rendered.contains("MASTER-KEY"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
