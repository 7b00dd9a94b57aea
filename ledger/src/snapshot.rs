//! Serializable views of a ledger.
//!
//! [`ChainSnapshot`] is what peers exchange during chain-sync. It carries
//! only the chain and its difficulty; pending votes and remaining voters are
//! local to each node. [`LedgerState`] adds that local state for persistence.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::pending::PendingVotes;
use crate::voters::RemainingVoters;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub difficulty: usize,
    pub chain: Vec<Block>,
}

impl ChainSnapshot {
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    pub difficulty: usize,
    pub chain: Vec<Block>,
    #[serde(default)]
    pub remaining_voters: RemainingVoters,
    #[serde(default)]
    pub pending_votes: PendingVotes,
}
