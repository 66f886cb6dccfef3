//! SHA-256 helpers.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::CoordinatorResult;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 over the concatenation of `parts`.
pub fn sha256_hex_parts(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

/// SHA-256 of the canonical JSON encoding of `value`.
///
/// Canonical here means serde_json's output for the value as given; callers
/// must use ordered collections for the hash to be stable.
pub fn canonical_hash<T: Serialize>(value: &T) -> CoordinatorResult<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parts_match_concatenation() {
        assert_eq!(sha256_hex_parts(&[b"ab", b"c"]), sha256_hex(b"abc"));
    }
}
