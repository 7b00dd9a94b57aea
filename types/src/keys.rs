//! String-encoded key and signature types.
//!
//! Key material is carried as the canonical base64 text produced by
//! `tally_crypto`, so it can be embedded in JSON messages and persisted files
//! without re-encoding. These types only hold the text; decoding and
//! validation live in the crypto crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A base64-encoded Ed25519 public key. Doubles as a voter identity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "PublicKey({prefix}\u{2026})")
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PublicKey {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

/// A base64-encoded Ed25519 secret seed.
///
/// This type intentionally does not implement `Debug` output of its contents
/// or `Clone`. The text is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// A base64-encoded Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A public/private key pair.
///
/// Use `tally_crypto::generate_keypair()` or `tally_crypto::keypair_from_seed()`
/// to construct key pairs. This struct is intentionally just data.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_debug_is_redacted() {
        let key = PrivateKey::new("c2VjcmV0");
        assert_eq!(format!("{key:?}"), "PrivateKey(<redacted>)");
    }

    #[test]
    fn public_key_serializes_as_plain_string() {
        let key = PublicKey::new("AAAA");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"AAAA\"");
    }
}
