//! Persisted records and engine result types.
//!
//! Timestamps are unix seconds (`i64`), matching what clients send for
//! `expires_at` and what the API returns.

use serde::{Deserialize, Serialize};

/// License plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    /// Parse an exact, lower-case plan name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }

    /// The wire name of this plan.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

/// License lifecycle status, also the status alphabet of engine results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Inactive,
    Expired,
    Invalid,
}

impl LicenseStatus {
    /// Parse an exact, lower-case status name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "expired" => Some(Self::Expired),
            "invalid" => Some(Self::Invalid),
            _ => None,
        }
    }

    /// The wire name of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
        }
    }
}

/// Whether a site currently uses a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
    Active,
    Inactive,
}

/// A stored license, keyed by the hash of its raw key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Insertion sequence number; newer licenses have larger ids.
    pub id: u64,
    /// SHA-256 of the raw key (hex). The raw key is never stored.
    pub key_hash: String,
    pub plan: Plan,
    pub status: LicenseStatus,
    /// Ordered feature flags; duplicates are kept.
    pub features: Vec<String>,
    /// Unix seconds. `None` or `<= 0` means the license never expires.
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl License {
    /// Whether the license has a positive expiry strictly before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at > 0 && at < now)
    }

    /// The listing projection of this license.
    #[must_use]
    pub fn summary(&self) -> LicenseSummary {
        LicenseSummary {
            plan: self.plan,
            status: self.status,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// The mutable part of a license, supplied on every upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseDraft {
    pub plan: Plan,
    pub status: LicenseStatus,
    pub features: Vec<String>,
    pub expires_at: Option<i64>,
}

/// Read-only projection returned by license listing.
///
/// Carries no key material: neither the raw key nor its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseSummary {
    pub plan: Plan,
    pub status: LicenseStatus,
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A binding between a license and a consuming site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub key_hash: String,
    pub site_url: String,
    pub status: ActivationStatus,
    pub last_verified_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fixed-window request counter for one limiter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitCounter {
    pub window_start: i64,
    pub count: u64,
}

/// Outcome of `activate` and `verify`.
///
/// `plan` is [`Plan::Free`] and `features` is empty whenever `status` is not
/// [`LicenseStatus::Active`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseResult {
    pub status: LicenseStatus,
    pub plan: Plan,
    pub features: Vec<String>,
    pub expires_at: Option<i64>,
    pub message: String,
}

impl LicenseResult {
    /// A non-active result carrying only a status and message.
    #[must_use]
    pub fn denied(status: LicenseStatus, message: &str) -> Self {
        Self {
            status,
            plan: Plan::Free,
            features: Vec::new(),
            expires_at: None,
            message: message.to_owned(),
        }
    }

    /// The result for a license whose expiry has passed.
    #[must_use]
    pub fn expired(expires_at: Option<i64>) -> Self {
        Self {
            expires_at,
            ..Self::denied(LicenseStatus::Expired, "license expired")
        }
    }

    /// An active result exposing the license's entitlements.
    #[must_use]
    pub fn granted(
        plan: Plan,
        features: Vec<String>,
        expires_at: Option<i64>,
        message: &str,
    ) -> Self {
        Self {
            status: LicenseStatus::Active,
            plan,
            features,
            expires_at,
            message: message.to_owned(),
        }
    }

    /// Whether the license was accepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == LicenseStatus::Active
    }
}

/// Outcome of `deactivate` and `issue_or_update_license`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpResult {
    pub ok: bool,
    pub message: String,
}

impl OpResult {
    #[must_use]
    pub fn new(ok: bool, message: &str) -> Self {
        Self {
            ok,
            message: message.to_owned(),
        }
    }
}
