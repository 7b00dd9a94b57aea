use tally_crypto::CryptoError;
use tally_types::{BlockHash, PublicKey};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("vote from {voter} is unsigned")]
    Unsigned { voter: PublicKey },

    #[error("vote from {voter} has a signature that does not verify")]
    BadSignature { voter: PublicKey },

    #[error("vote from {voter} could not be verified: {source}")]
    Crypto {
        voter: PublicKey,
        #[source]
        source: CryptoError,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("stored hash {stored} does not match computed hash {computed}")]
    HashMismatch { stored: BlockHash, computed: BlockHash },

    #[error("hash {hash} does not meet difficulty {difficulty}")]
    InsufficientWork { hash: BlockHash, difficulty: usize },

    #[error("block {hash} holds invalid vote #{index}: {source}")]
    InvalidVote {
        hash: BlockHash,
        index: usize,
        #[source]
        source: VoteError,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain has no genesis block")]
    Empty,

    #[error("block {index} links to {found}, expected {expected}")]
    BrokenLink {
        index: usize,
        expected: BlockHash,
        found: BlockHash,
    },

    #[error("block {index} is invalid: {source}")]
    InvalidBlock {
        index: usize,
        #[source]
        source: BlockError,
    },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("mining task failed: {0}")]
    Mining(String),

    #[error("invalid ledger state: {0}")]
    InvalidState(#[from] ChainError),
}
