//! Block hash type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A hex-encoded block hash.
///
/// Stored as text rather than raw bytes because the genesis block's
/// `previous_hash` is a run of `'0'` characters whose length equals the
/// ledger difficulty, not a full-width digest.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The all-zero placeholder used as the genesis block's predecessor.
    pub fn zeros(len: usize) -> Self {
        Self("0".repeat(len))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the first `difficulty` characters are all `'0'`.
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        self.0.len() >= difficulty && self.0.bytes().take(difficulty).all(|b| b == b'0')
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(12).collect();
        write!(f, "BlockHash({prefix}\u{2026})")
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
