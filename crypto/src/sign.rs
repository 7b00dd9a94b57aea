//! Ed25519 message signing and verification over base64-encoded material.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{Signer, Verifier};
use tally_types::{PrivateKey, PublicKey, Signature};

use crate::keys::{decode_fixed, decode_signing_key, decode_verifying_key};
use crate::CryptoError;

/// Sign a message with a private key, returning the base64 signature.
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Result<Signature, CryptoError> {
    let signing_key = decode_signing_key(private_key)?;
    let sig = signing_key.sign(message);
    Ok(Signature::new(STANDARD.encode(sig.to_bytes())))
}

/// Verify a signature against a message and public key.
///
/// Returns `Ok(false)` for a well-formed signature that does not match.
/// Malformed key or signature encodings are errors, not `false`, so callers
/// can report what was wrong with the input.
pub fn verify_signature(
    message: &[u8],
    signature: &Signature,
    public_key: &PublicKey,
) -> Result<bool, CryptoError> {
    let verifying_key = decode_verifying_key(public_key)?;
    let bytes = decode_fixed::<64>(signature.as_str()).map_err(CryptoError::MalformedSignature)?;
    let dalek_sig = ed25519_dalek::Signature::from_bytes(&bytes);
    Ok(verifying_key.verify(message, &dalek_sig).is_ok())
}
