//! Cryptographic primitives for the tally ledger.
//!
//! - **Ed25519** for signing ballots and network messages
//! - **SHA-256** for block hashes and message de-duplication
//! - **base64** as the one canonical text encoding for keys and signatures,
//!   so key material can cross the wire and the disk unchanged

pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use error::CryptoError;
pub use hash::{sha256, sha256_hex, sha256_hex_multi};
pub use keys::{generate_keypair, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
