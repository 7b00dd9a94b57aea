//! SHA-256 content hashing.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of arbitrary data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 rendered as 64 lowercase hex characters.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn sha256_hex_multi(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
