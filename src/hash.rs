// src/hash.rs

//! Package content hashing
//!
//! The packages folder records a SHA-512 of every package file, base64
//! encoded, in `<Id>.<Version>.nupkg.sha512`. The prefetcher compares it to
//! decide whether a package is already present with the right content.

use crate::error::{Error, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha512};

/// Base64 SHA-512 of `data`
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(data);
    BASE64.encode(hasher.finalize())
}

/// Check `data` against an expected base64 SHA-512
pub fn verify_content_hash(data: &[u8], expected: &str) -> Result<()> {
    let actual = content_hash(data);
    if actual == expected.trim() {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}
