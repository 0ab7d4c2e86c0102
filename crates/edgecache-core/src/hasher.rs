//! License key hashing.
//!
//! Raw license keys are never stored. Records are keyed by
//! `SHA-256(key)`, hex-encoded; the caller presents the plaintext key and
//! we hash it to find the record. Keys are unique identifiers by
//! construction, so the hash is deliberately unsalted: the same key must
//! always map to the same record.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hash a raw license key with SHA-256, returning the hex-encoded digest.
#[must_use]
pub fn hash_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}

/// Derive the rate-limiter key for a (license key, caller address) pair.
///
/// Both parts are trimmed and joined with `|` before hashing, so the
/// limiter key reveals neither the license key nor the caller.
#[must_use]
pub fn limiter_key(raw_key: &str, caller_address: &str) -> String {
    hash_key(&format!("{}|{}", raw_key.trim(), caller_address.trim()))
}

/// Compare two strings in constant time.
///
/// Unequal lengths return `false` immediately; only the length leaks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// First eight characters of a key hash, for log lines.
#[must_use]
pub fn hash_prefix(key_hash: &str) -> &str {
    key_hash
        .char_indices()
        .nth(8)
        .map_or(key_hash, |(end, _)| &key_hash[..end])
}
