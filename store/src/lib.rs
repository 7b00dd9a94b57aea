//! Persistence traits and the JSON-file backend.
//!
//! The node depends only on the traits. Every `load_*` returns `Ok(None)`
//! (or an empty list) when nothing has been saved yet, so first start and
//! restart share one code path.

pub mod error;
pub mod identity;
pub mod json_file;
pub mod ledger;
pub mod peer;
pub mod voters;

pub use error::StoreError;
pub use identity::IdentityStore;
pub use json_file::JsonFileStore;
pub use ledger::LedgerStore;
pub use peer::PeerStore;
pub use voters::VoterRegistry;

/// Everything a running node persists, behind one object.
pub trait NodeStore: LedgerStore + PeerStore + IdentityStore + VoterRegistry + Send + Sync {}

impl<T> NodeStore for T where T: LedgerStore + PeerStore + IdentityStore + VoterRegistry + Send + Sync {}
