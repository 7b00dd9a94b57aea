//! Ed25519 key generation and canonical key encoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use tally_types::{KeyPair, PrivateKey, PublicKey};

use crate::CryptoError;

/// Generate a new Ed25519 key pair from a secure random source.
pub fn generate_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    encode_keypair(&signing_key)
}

/// Derive a key pair from a 32-byte seed (deterministic).
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    encode_keypair(&signing_key)
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> Result<PublicKey, CryptoError> {
    let signing_key = decode_signing_key(private)?;
    Ok(encode_public(&signing_key.verifying_key()))
}

fn encode_keypair(signing_key: &SigningKey) -> KeyPair {
    KeyPair {
        public: encode_public(&signing_key.verifying_key()),
        private: PrivateKey::new(STANDARD.encode(signing_key.to_bytes())),
    }
}

fn encode_public(verifying_key: &VerifyingKey) -> PublicKey {
    PublicKey::new(STANDARD.encode(verifying_key.to_bytes()))
}

pub(crate) fn decode_signing_key(private: &PrivateKey) -> Result<SigningKey, CryptoError> {
    let bytes = decode_fixed::<32>(private.as_str())
        .map_err(|e| CryptoError::MalformedKey(format!("private key: {e}")))?;
    Ok(SigningKey::from_bytes(&bytes))
}

pub(crate) fn decode_verifying_key(public: &PublicKey) -> Result<VerifyingKey, CryptoError> {
    let bytes = decode_fixed::<32>(public.as_str())
        .map_err(|e| CryptoError::MalformedKey(format!("public key: {e}")))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| CryptoError::MalformedKey(format!("public key is not a curve point: {e}")))
}

/// Decode base64 text into exactly `N` bytes.
pub(crate) fn decode_fixed<const N: usize>(text: &str) -> Result<[u8; N], String> {
    let bytes = STANDARD.decode(text).map_err(|e| e.to_string())?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("expected {N} bytes, got {}", bytes.len()))
}
