//! JCS canonicalization and hashing.

use crate::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Canonicalize a value using JCS (RFC 8785).
///
/// This produces a deterministic byte representation suitable for signing.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_jcs::to_vec(value).map_err(Error::Serialization)
}

/// SHA-256 hash of canonical JSON.
pub fn hash<T: Serialize>(value: &T) -> Result<[u8; 32]> {
    let canonical = canonicalize(value)?;
    Ok(Sha256::digest(&canonical).into())
}
