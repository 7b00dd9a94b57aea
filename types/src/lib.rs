//! Fundamental types for the tally ledger.
//!
//! This crate defines the value types shared across every other crate in the
//! workspace: string-encoded keys and signatures, block hashes, peer records,
//! and timestamps. Everything here crosses the wire or the disk unchanged, so
//! all types serialize as plain JSON strings or objects.

pub mod hash;
pub mod keys;
pub mod peer;
pub mod time;

pub use hash::BlockHash;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use peer::RemotePeer;
pub use time::Timestamp;
