//! Registry of every voter identity registered through this node.
//!
//! Seeds the remaining-voter set of a fresh ledger when no ledger state
//! survives a restart.

use tally_types::PublicKey;

use crate::StoreError;

pub trait VoterRegistry {
    fn load_registered_voters(&self) -> Result<Vec<PublicKey>, StoreError>;

    /// Returns `false` if the voter was already registered.
    fn add_registered_voter(&self, voter: &PublicKey) -> Result<bool, StoreError>;
}
