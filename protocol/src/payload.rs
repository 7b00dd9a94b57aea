//! Typed `data` payloads that are not ledger types.
//!
//! Votes and blocks travel as their ledger JSON; a rejection is `{"reason": ...}`.

use serde::{Deserialize, Serialize};
use tally_types::PublicKey;

/// `send_voter` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterPayload {
    pub voter: PublicKey,
}
