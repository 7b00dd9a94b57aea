//! Proof-of-work voting ledger.
//!
//! A single linear chain of mined blocks, each holding signed ballots.
//! Every registered voter may have exactly one ballot accepted over the
//! lifetime of the ledger. Replicas converge on the longest valid chain.

pub mod block;
pub mod chain;
pub mod error;
pub mod pending;
pub mod shared;
pub mod snapshot;
pub mod vote;
pub mod voters;

pub use block::Block;
pub use chain::{validate_chain, Blockchain, DEFAULT_DIFFICULTY};
pub use error::{BlockError, ChainError, LedgerError, VoteError};
pub use pending::PendingVotes;
pub use shared::SharedLedger;
pub use snapshot::{ChainSnapshot, LedgerState};
pub use vote::Vote;
pub use voters::RemainingVoters;
