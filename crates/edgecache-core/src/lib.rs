//! Core library for the EdgeCache license service.
//!
//! Contains key hashing, the license and activation record stores, the
//! fixed-window rate limiter, the audit trail, and the [`LicenseEngine`]
//! that ties them together. This crate depends on `edgecache-storage` for
//! the storage backend trait and knows nothing about HTTP.
//!
//! [`LicenseEngine`]: engine::LicenseEngine

pub mod audit;
pub mod audit_file;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod model;
pub mod rate_limit;
pub mod store;

pub use engine::{EngineConfig, LicenseEngine};
pub use error::{AuditError, EngineError, StoreError};
pub use model::{LicenseResult, LicenseStatus, LicenseSummary, OpResult, Plan};
