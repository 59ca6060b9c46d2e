//! Shared utility helpers.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 fingerprint of script content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Remove double quotes from an identifier, so `"Db"."T1"` and `Db.T1`
/// compare equal once case-normalized.
#[inline]
pub fn unquote(identifier: &str) -> String {
    identifier.chars().filter(|c| *c != '"').collect()
}

/// Case-insensitive starts_with check without allocating.
#[inline]
pub fn starts_with_ci(haystack: &str, needle: &str) -> bool {
    haystack.len() >= needle.len()
        && haystack.as_bytes()[..needle.len()].eq_ignore_ascii_case(needle.as_bytes())
}
