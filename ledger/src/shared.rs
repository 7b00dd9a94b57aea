//! Concurrency-safe ledger handle shared by the network handlers, the
//! miner and the front-end.
//!
//! All chain mutations go through one write lock. Mining runs on a blocking
//! thread with no ledger lock held, serialized by a separate mining mutex so
//! at most one block is mined at a time.

use std::sync::Arc;

use tally_types::PublicKey;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::block::Block;
use crate::chain::{validate_chain, Blockchain};
use crate::error::{ChainError, LedgerError};
use crate::snapshot::{ChainSnapshot, LedgerState};
use crate::vote::Vote;

#[derive(Clone)]
pub struct SharedLedger {
    inner: Arc<RwLock<Blockchain>>,
    mining: Arc<Mutex<()>>,
}

impl SharedLedger {
    pub fn new(chain: Blockchain) -> Self {
        Self {
            inner: Arc::new(RwLock::new(chain)),
            mining: Arc::new(Mutex::new(())),
        }
    }

    /// Run a closure against a read-locked view of the ledger.
    pub async fn read<R>(&self, f: impl FnOnce(&Blockchain) -> R) -> R {
        let chain = self.inner.read().await;
        f(&chain)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn difficulty(&self) -> usize {
        self.inner.read().await.difficulty()
    }

    pub async fn tip(&self) -> Block {
        self.inner.read().await.tip().clone()
    }

    pub async fn snapshot(&self) -> ChainSnapshot {
        self.inner.read().await.snapshot()
    }

    pub async fn state(&self) -> LedgerState {
        self.inner.read().await.state()
    }

    pub async fn is_valid(&self) -> Result<(), ChainError> {
        self.inner.read().await.is_valid()
    }

    pub async fn add_vote(&self, vote: Vote) {
        self.inner.write().await.add_vote(vote);
    }

    pub async fn handle_incoming_vote(&self, vote: Vote) {
        self.inner.write().await.handle_incoming_vote(vote);
    }

    pub async fn handle_incoming_voter(&self, voter: PublicKey) -> bool {
        self.inner.write().await.handle_incoming_voter(voter)
    }

    /// Drain, mine and append. Returns the appended block, if any.
    ///
    /// If a peer block or adopted chain moved the tip while mining, the
    /// candidate is abandoned and its votes requeued for the next round.
    pub async fn create_block(&self) -> Result<Option<Block>, LedgerError> {
        let _mining = self.mining.lock().await;

        let (candidate, difficulty) = {
            let mut chain = self.inner.write().await;
            match chain.take_candidate() {
                Some(block) => (block, chain.difficulty()),
                None => return Ok(None),
            }
        };

        let backup = candidate.clone();
        let mined = tokio::task::spawn_blocking(move || {
            let mut block = candidate;
            block.mine_block(difficulty);
            block
        })
        .await;

        let mut chain = self.inner.write().await;
        match mined {
            Ok(block) => {
                let appended = chain.append_mined(block.clone());
                Ok(appended.then_some(block))
            }
            Err(e) => {
                warn!(error = %e, "mining task did not complete");
                chain.abandon_candidate(backup);
                Err(LedgerError::Mining(e.to_string()))
            }
        }
    }

    /// Validate a peer block outside the lock, then link it to the tip.
    pub async fn handle_incoming_block(&self, block: Block) -> Result<(), ChainError> {
        let (difficulty, index) = self.read(|c| (c.difficulty(), c.len())).await;
        block
            .is_valid(difficulty)
            .map_err(|source| ChainError::InvalidBlock { index, source })?;

        let mut chain = self.inner.write().await;
        if chain.difficulty() != difficulty {
            // Adopted a chain at a different difficulty in the meantime.
            return chain.handle_incoming_block(block);
        }
        chain.link_validated_block(block)
    }

    /// Consensus adoption with full validation performed outside the lock.
    pub async fn attempt_consensus(&self, candidate: ChainSnapshot) -> bool {
        if !self.read(|c| c.outranked_by(&candidate)).await {
            return false;
        }

        let candidate = match tokio::task::spawn_blocking(move || {
            validate_chain(&candidate.chain, candidate.difficulty).map(|()| candidate)
        })
        .await
        {
            Ok(Ok(candidate)) => candidate,
            Ok(Err(e)) => {
                warn!(error = %e, "rejecting invalid candidate chain");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "candidate validation task did not complete");
                return false;
            }
        };

        let mut chain = self.inner.write().await;
        // Re-check: the local chain may have grown while validating.
        if !chain.outranked_by(&candidate) {
            debug!("local chain caught up during validation");
            return false;
        }
        chain.adopt(candidate);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_crypto::generate_keypair;

    #[tokio::test]
    async fn create_block_appends_and_returns_block() {
        let kp = generate_keypair();
        let ledger = SharedLedger::new(Blockchain::with_voters(2, [kp.public.clone()]));
        ledger.add_vote(Vote::signed(&kp, 1).unwrap()).await;

        let block = ledger.create_block().await.unwrap().expect("block mined");
        assert_eq!(ledger.len().await, 2);
        assert_eq!(ledger.tip().await, block);
        assert!(ledger.is_valid().await.is_ok());
    }

    #[tokio::test]
    async fn create_block_without_votes_is_none() {
        let ledger = SharedLedger::new(Blockchain::new(2));
        assert!(ledger.create_block().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_create_block_mines_each_vote_once() {
        let keys: Vec<_> = (0..4).map(|_| generate_keypair()).collect();
        let ledger = SharedLedger::new(Blockchain::with_voters(
            2,
            keys.iter().map(|k| k.public.clone()),
        ));
        for kp in &keys {
            ledger.add_vote(Vote::signed(kp, 1).unwrap()).await;
        }

        let a = tokio::spawn({
            let l = ledger.clone();
            async move { l.create_block().await }
        });
        let b = tokio::spawn({
            let l = ledger.clone();
            async move { l.create_block().await }
        });
        let mined = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        assert_eq!(mined.iter().filter(|m| m.is_some()).count(), 1);

        let total_votes: usize = ledger
            .read(|c| c.chain().iter().map(|b| b.votes.len()).sum())
            .await;
        assert_eq!(total_votes, 4);
        assert!(ledger.is_valid().await.is_ok());
    }

    #[tokio::test]
    async fn state_read_while_mining_still_holds_the_ballot() {
        let kp = generate_keypair();
        let ledger = SharedLedger::new(Blockchain::with_voters(5, [kp.public.clone()]));
        ledger.add_vote(Vote::signed(&kp, 1).unwrap()).await;

        let miner = tokio::spawn({
            let l = ledger.clone();
            async move { l.create_block().await }
        });

        // Catch the window between the drain and the append.
        let mid_mine = loop {
            let (mining, appended, state) = ledger
                .read(|c| (c.in_flight().is_some(), c.len() > 1, c.state()))
                .await;
            if mining || appended {
                break mining.then_some(state);
            }
            tokio::task::yield_now().await;
        };

        if let Some(state) = mid_mine {
            let restored = Blockchain::from_state(state).unwrap();
            assert!(restored.is_eligible(&kp.public));
            assert_eq!(restored.pending_votes().len(), 1);
            assert_eq!(restored.len(), 1);
        }

        let block = miner.await.unwrap().unwrap().expect("block mined");
        assert_eq!(block.votes.len(), 1);
        let state = ledger.state().await;
        assert!(state.pending_votes.is_empty());
        assert!(!state.remaining_voters.contains(&kp.public));
        assert!(ledger.read(|c| c.in_flight().is_none()).await);
    }

    #[tokio::test]
    async fn incoming_block_and_consensus_through_handle() {
        let kp = generate_keypair();
        let base = Blockchain::with_voters(2, [kp.public.clone()]);
        let a = SharedLedger::new(base.clone());
        let b = SharedLedger::new(base.clone());
        let c = SharedLedger::new(base);

        a.add_vote(Vote::signed(&kp, 1).unwrap()).await;
        let block = a.create_block().await.unwrap().unwrap();

        b.handle_incoming_block(block).await.unwrap();
        assert_eq!(b.len().await, 2);

        assert!(c.attempt_consensus(a.snapshot().await).await);
        assert_eq!(c.tip().await, a.tip().await);
        assert!(!c.attempt_consensus(b.snapshot().await).await);
    }
}
