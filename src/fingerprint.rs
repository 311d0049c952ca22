//! Content fingerprinting for deduplication and idempotent resume.
//!
//! The fingerprint is a SHA-256 hex digest of a chunk's final (possibly
//! summarized) text. Identical final text always yields the same digest,
//! which is the sole criterion for "already processed."

use sha2::{Digest, Sha256};

/// Compute the hex fingerprint of a chunk's final text.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
