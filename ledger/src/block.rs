//! Mined containers of votes, chained by hash.

use serde::{Deserialize, Serialize};
use tally_types::{BlockHash, Timestamp};

use crate::error::BlockError;
use crate::vote::Vote;

const FIELD_SEPARATOR: &str = "||||||";

/// A block of votes.
///
/// `hash == sha256(votes ‖ previous_hash ‖ timestamp ‖ nonce)` and must carry
/// `difficulty` leading `'0'` characters once mined.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub hash: BlockHash,
    pub previous_hash: BlockHash,
    pub timestamp: Timestamp,
    pub nonce: u64,
    pub votes: Vec<Vote>,
}

impl Block {
    /// A fresh, unmined block stamped with the current time.
    pub fn new(previous_hash: BlockHash, votes: Vec<Vote>) -> Self {
        let mut block = Self {
            hash: BlockHash::default(),
            previous_hash,
            timestamp: Timestamp::now(),
            nonce: 0,
            votes,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Rebuild a block from stored or received fields, verbatim.
    ///
    /// Nothing is recomputed; a corrupt block is representable and is caught
    /// by [`Block::is_valid`].
    pub fn from_parts(
        hash: BlockHash,
        previous_hash: BlockHash,
        timestamp: Timestamp,
        nonce: u64,
        votes: Vec<Vote>,
    ) -> Self {
        Self {
            hash,
            previous_hash,
            timestamp,
            nonce,
            votes,
        }
    }

    /// Everything in the hash input except the nonce.
    fn hash_prefix(&self) -> String {
        let mut prefix: String = self.votes.iter().map(Vote::to_canonical_string).collect();
        prefix.push_str(FIELD_SEPARATOR);
        prefix.push_str(self.previous_hash.as_str());
        prefix.push_str(FIELD_SEPARATOR);
        prefix.push_str(&self.timestamp.as_millis().to_string());
        prefix.push_str(FIELD_SEPARATOR);
        prefix
    }

    pub fn compute_hash(&self) -> BlockHash {
        hash_with_nonce(&self.hash_prefix(), self.nonce)
    }

    /// Increment the nonce until the hash meets `difficulty`.
    ///
    /// CPU-bound with no upper bound on iterations. Callers on an async
    /// runtime should run this on a blocking thread.
    pub fn mine_block(&mut self, difficulty: usize) {
        let prefix = self.hash_prefix();
        let mut hash = hash_with_nonce(&prefix, self.nonce);
        while !hash.meets_difficulty(difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
            hash = hash_with_nonce(&prefix, self.nonce);
        }
        self.hash = hash;
    }

    /// Hash integrity, then proof-of-work, then every vote in order.
    pub fn is_valid(&self, difficulty: usize) -> Result<(), BlockError> {
        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(BlockError::HashMismatch {
                stored: self.hash.clone(),
                computed,
            });
        }
        if !self.hash.meets_difficulty(difficulty) {
            return Err(BlockError::InsufficientWork {
                hash: self.hash.clone(),
                difficulty,
            });
        }
        for (index, vote) in self.votes.iter().enumerate() {
            vote.is_valid().map_err(|source| BlockError::InvalidVote {
                hash: self.hash.clone(),
                index,
                source,
            })?;
        }
        Ok(())
    }

    pub fn voters(&self) -> impl Iterator<Item = &tally_types::PublicKey> {
        self.votes.iter().map(|v| &v.voter)
    }
}

fn hash_with_nonce(prefix: &str, nonce: u64) -> BlockHash {
    BlockHash::new(tally_crypto::sha256_hex_multi(&[
        prefix.as_bytes(),
        nonce.to_string().as_bytes(),
    ]))
}
