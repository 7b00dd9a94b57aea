//! The blockchain: chain, pending-vote queue and voter eligibility.

use std::collections::HashSet;

use tally_types::{BlockHash, PublicKey};
use tracing::{debug, info, warn};

use crate::block::Block;
use crate::error::ChainError;
use crate::pending::PendingVotes;
use crate::snapshot::{ChainSnapshot, LedgerState};
use crate::vote::Vote;
use crate::voters::RemainingVoters;

/// Leading zero hex characters required of every block hash.
pub const DEFAULT_DIFFICULTY: usize = 4;

/// A single node's replica of the ledger.
///
/// Invariants: `chain` is never empty; `chain[i].previous_hash ==
/// chain[i-1].hash`; every block satisfies [`Block::is_valid`] at
/// `difficulty`; a voter is removed from `remaining` when its ballot is
/// accepted and never re-added while the chain spends it.
#[derive(Clone, Debug)]
pub struct Blockchain {
    chain: Vec<Block>,
    pending: PendingVotes,
    remaining: RemainingVoters,
    difficulty: usize,
    /// Candidate handed out by `take_candidate` and not yet appended or
    /// abandoned. Its ballots live nowhere else until then.
    in_flight: Option<Block>,
}

impl Blockchain {
    /// An empty ledger holding only a freshly mined genesis block.
    pub fn new(difficulty: usize) -> Self {
        Self::with_voters(difficulty, std::iter::empty())
    }

    /// A fresh ledger whose voter set is seeded from a registry.
    pub fn with_voters(difficulty: usize, voters: impl IntoIterator<Item = PublicKey>) -> Self {
        Self {
            chain: vec![genesis_block(difficulty)],
            pending: PendingVotes::new(),
            remaining: voters.into_iter().collect(),
            difficulty,
            in_flight: None,
        }
    }

    /// Restore a persisted ledger. The chain must validate.
    pub fn from_state(state: LedgerState) -> Result<Self, ChainError> {
        validate_chain(&state.chain, state.difficulty)?;
        Ok(Self {
            chain: state.chain,
            pending: state.pending_votes,
            remaining: state.remaining_voters,
            difficulty: state.difficulty,
            in_flight: None,
        })
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always `false`: a ledger holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn tip(&self) -> &Block {
        // `chain` is never empty; every constructor installs a genesis block.
        &self.chain[self.chain.len() - 1]
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn pending_votes(&self) -> &PendingVotes {
        &self.pending
    }

    pub fn remaining_voters(&self) -> &RemainingVoters {
        &self.remaining
    }

    /// The block currently being mined, if any.
    pub fn in_flight(&self) -> Option<&Block> {
        self.in_flight.as_ref()
    }

    pub fn is_eligible(&self, voter: &PublicKey) -> bool {
        self.remaining.contains(voter)
    }

    /// The chain-sync payload.
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            difficulty: self.difficulty,
            chain: self.chain.clone(),
        }
    }

    /// The full persisted state, including local-only queues.
    ///
    /// A block still being mined is reported as if it had been abandoned:
    /// its votes head the queue and its voters are eligible again.
    pub fn state(&self) -> LedgerState {
        let mut pending_votes = self.pending.clone();
        let mut remaining_voters = self.remaining.clone();
        if let Some(block) = &self.in_flight {
            let spent = self.spent_voters();
            remaining_voters.extend(block.voters().filter(|v| !spent.contains(*v)).cloned());
            pending_votes.requeue_front(block.votes.clone());
        }
        LedgerState {
            difficulty: self.difficulty,
            chain: self.chain.clone(),
            remaining_voters,
            pending_votes,
        }
    }

    // ── Intake ──────────────────────────────────────────────────────────

    /// Queue a vote. Validation is deferred to block creation.
    pub fn add_vote(&mut self, vote: Vote) {
        self.pending.push(vote);
    }

    pub fn handle_incoming_vote(&mut self, vote: Vote) {
        self.add_vote(vote);
    }

    /// Register a voter identity. Idempotent; returns `true` if newly added.
    ///
    /// A voter already spent by the chain stays spent.
    pub fn handle_incoming_voter(&mut self, voter: PublicKey) -> bool {
        if self.chain_spends(&voter) {
            debug!(voter = %voter, "voter already has a ballot on chain");
            return false;
        }
        self.remaining.insert(voter)
    }

    // ── Block creation ──────────────────────────────────────────────────

    /// Drain the queue, mine a block over the eligible votes and append it.
    ///
    /// Returns `false` if nothing was queued or no queued vote was accepted.
    pub fn create_block(&mut self) -> bool {
        let Some(mut candidate) = self.take_candidate() else {
            return false;
        };
        candidate.mine_block(self.difficulty);
        self.append_mined(candidate)
    }

    /// Drain the pending queue and build an unmined block on the current tip.
    ///
    /// A vote is accepted iff it is valid and its voter is still eligible;
    /// eligibility is consumed on acceptance, so a second ballot from the
    /// same voter in one drain is discarded. Discarded votes are dropped.
    pub fn take_candidate(&mut self) -> Option<Block> {
        if self.pending.is_empty() {
            return None;
        }
        let mut accepted = Vec::new();
        for vote in self.pending.drain_all() {
            if let Err(e) = vote.is_valid() {
                warn!(voter = %vote.voter, error = %e, "discarding invalid vote");
                continue;
            }
            if !self.remaining.take(&vote.voter) {
                warn!(voter = %vote.voter, "discarding vote from ineligible voter");
                continue;
            }
            accepted.push(vote);
        }
        if accepted.is_empty() {
            return None;
        }
        let candidate = Block::new(self.tip().hash.clone(), accepted);
        self.in_flight = Some(candidate.clone());
        Some(candidate)
    }

    /// Append a block mined from [`Blockchain::take_candidate`].
    ///
    /// If the tip moved while mining, the block is abandoned instead and its
    /// votes return to the queue. Returns `true` if appended.
    pub fn append_mined(&mut self, block: Block) -> bool {
        if block.previous_hash != self.tip().hash || !block.hash.meets_difficulty(self.difficulty) {
            debug!(hash = %block.hash, "tip moved while mining; abandoning candidate");
            self.abandon_candidate(block);
            return false;
        }
        info!(
            hash = %block.hash,
            height = self.chain.len(),
            votes = block.votes.len(),
            "block appended"
        );
        self.in_flight = None;
        self.chain.push(block);
        true
    }

    /// Return a candidate's votes to the front of the queue and restore
    /// eligibility for voters the chain has not spent in the meantime.
    pub fn abandon_candidate(&mut self, block: Block) {
        self.in_flight = None;
        let spent = self.spent_voters();
        for voter in block.voters() {
            if !spent.contains(voter) {
                self.remaining.insert(voter.clone());
            }
        }
        self.pending.requeue_front(block.votes);
    }

    // ── Validation ──────────────────────────────────────────────────────

    pub fn is_valid(&self) -> Result<(), ChainError> {
        validate_chain(&self.chain, self.difficulty)
    }

    // ── Network-sourced blocks ──────────────────────────────────────────

    /// Accept a peer's block if it is valid and extends the current tip.
    ///
    /// Voters in the block lose eligibility without a history check; the
    /// hash link to our tip already establishes lineage.
    pub fn handle_incoming_block(&mut self, block: Block) -> Result<(), ChainError> {
        let index = self.chain.len();
        block
            .is_valid(self.difficulty)
            .map_err(|source| ChainError::InvalidBlock { index, source })?;
        self.link_validated_block(block)
    }

    /// Tip check and append for a block whose own validity is established.
    pub(crate) fn link_validated_block(&mut self, block: Block) -> Result<(), ChainError> {
        let index = self.chain.len();
        let tip = &self.tip().hash;
        if &block.previous_hash != tip {
            return Err(ChainError::BrokenLink {
                index,
                expected: tip.clone(),
                found: block.previous_hash,
            });
        }
        for voter in block.voters() {
            self.remaining.take(voter);
        }
        info!(hash = %block.hash, height = index, "accepted block from peer");
        self.chain.push(block);
        Ok(())
    }

    // ── Consensus ───────────────────────────────────────────────────────

    /// Adopt `candidate` iff it is strictly longer, at least as difficult,
    /// and fully valid. Checks run cheapest first.
    pub fn attempt_consensus(&mut self, candidate: ChainSnapshot) -> bool {
        if !self.outranked_by(&candidate) {
            return false;
        }
        if let Err(e) = validate_chain(&candidate.chain, candidate.difficulty) {
            warn!(error = %e, "rejecting invalid candidate chain");
            return false;
        }
        self.adopt(candidate);
        true
    }

    /// The length and difficulty preconditions of consensus adoption.
    pub(crate) fn outranked_by(&self, candidate: &ChainSnapshot) -> bool {
        if candidate.chain.len() <= self.chain.len() {
            debug!(
                ours = self.chain.len(),
                theirs = candidate.chain.len(),
                "candidate chain not longer"
            );
            return false;
        }
        if candidate.difficulty < self.difficulty {
            debug!(
                ours = self.difficulty,
                theirs = candidate.difficulty,
                "candidate chain has lower difficulty"
            );
            return false;
        }
        true
    }

    /// Replace chain and difficulty with a validated candidate.
    ///
    /// Remaining voters become every identity this node knows as registered
    /// (still eligible, or spent by the old chain) minus those the candidate
    /// spends. The pending queue is untouched.
    pub(crate) fn adopt(&mut self, candidate: ChainSnapshot) {
        let mut known: HashSet<PublicKey> = self.spent_voters();
        known.extend(self.remaining.iter().cloned());

        let spent_by_candidate: HashSet<&PublicKey> =
            candidate.chain.iter().flat_map(Block::voters).collect();
        self.remaining = known
            .into_iter()
            .filter(|v| !spent_by_candidate.contains(v))
            .collect();

        info!(
            old_len = self.chain.len(),
            new_len = candidate.chain.len(),
            difficulty = candidate.difficulty,
            "adopted longer chain from peer"
        );
        self.chain = candidate.chain;
        self.difficulty = candidate.difficulty;
    }

    fn spent_voters(&self) -> HashSet<PublicKey> {
        self.chain.iter().flat_map(Block::voters).cloned().collect()
    }

    fn chain_spends(&self, voter: &PublicKey) -> bool {
        self.chain.iter().flat_map(Block::voters).any(|v| v == voter)
    }
}

/// Genesis: no votes, `previous_hash` of `difficulty` zeros, mined.
fn genesis_block(difficulty: usize) -> Block {
    let mut genesis = Block::new(BlockHash::zeros(difficulty), Vec::new());
    genesis.mine_block(difficulty);
    genesis
}

/// Check hash linkage and the validity of every block, genesis included.
pub fn validate_chain(chain: &[Block], difficulty: usize) -> Result<(), ChainError> {
    if chain.is_empty() {
        return Err(ChainError::Empty);
    }
    let genesis_parent = BlockHash::zeros(difficulty);
    for (index, block) in chain.iter().enumerate() {
        let expected = match index {
            0 => &genesis_parent,
            _ => &chain[index - 1].hash,
        };
        if &block.previous_hash != expected {
            return Err(ChainError::BrokenLink {
                index,
                expected: expected.clone(),
                found: block.previous_hash.clone(),
            });
        }
        block
            .is_valid(difficulty)
            .map_err(|source| ChainError::InvalidBlock { index, source })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlockError;
    use tally_crypto::generate_keypair;
    use tally_types::KeyPair;

    const D: usize = 2;

    fn registered(n: usize) -> (Blockchain, Vec<KeyPair>) {
        let keys: Vec<KeyPair> = (0..n).map(|_| generate_keypair()).collect();
        let chain = Blockchain::with_voters(D, keys.iter().map(|k| k.public.clone()));
        (chain, keys)
    }

    #[test]
    fn genesis_only_chain_is_valid() {
        let chain = Blockchain::new(D);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.tip().previous_hash.as_str(), "00");
        assert!(chain.tip().hash.meets_difficulty(D));
        assert!(chain.is_valid().is_ok());
    }

    #[test]
    fn one_ballot_per_voter_scenario() {
        let (mut chain, keys) = registered(1);
        let v = &keys[0];

        chain.add_vote(Vote::signed(v, 1).unwrap());
        assert!(chain.create_block());
        assert_eq!(chain.len(), 2);
        assert!(!chain.is_eligible(&v.public));
        assert!(chain.is_valid().is_ok());

        chain.add_vote(Vote::signed(v, 0).unwrap());
        assert!(!chain.create_block());
        assert_eq!(chain.len(), 2);
        assert!(chain.pending_votes().is_empty());
    }

    #[test]
    fn empty_queue_creates_nothing() {
        let mut chain = Blockchain::new(D);
        assert!(!chain.create_block());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn duplicate_ballots_in_one_drain_first_wins() {
        let (mut chain, keys) = registered(1);
        for value in [10, 20, 30] {
            chain.add_vote(Vote::signed(&keys[0], value).unwrap());
        }
        assert!(chain.create_block());
        let votes = &chain.tip().votes;
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].vote_value, 10);
    }

    #[test]
    fn invalid_vote_discarded_not_batch() {
        let (mut chain, keys) = registered(2);
        let mut forged = Vote::signed(&keys[0], 1).unwrap();
        forged.vote_value = 2;
        chain.add_vote(forged);
        chain.add_vote(Vote::signed(&keys[1], 1).unwrap());

        assert!(chain.create_block());
        assert_eq!(chain.tip().votes.len(), 1);
        assert_eq!(chain.tip().votes[0].voter, keys[1].public);
        // The forged ballot did not consume eligibility.
        assert!(chain.is_eligible(&keys[0].public));
    }

    #[test]
    fn unregistered_voter_is_discarded() {
        let mut chain = Blockchain::new(D);
        chain.add_vote(Vote::signed(&generate_keypair(), 1).unwrap());
        assert!(!chain.create_block());
        assert!(chain.pending_votes().is_empty());
    }

    #[test]
    fn tampered_interior_block_reports_index() {
        let (mut chain, keys) = registered(2);
        chain.add_vote(Vote::signed(&keys[0], 1).unwrap());
        assert!(chain.create_block());
        chain.add_vote(Vote::signed(&keys[1], 1).unwrap());
        assert!(chain.create_block());

        let mut blocks = chain.chain().to_vec();
        blocks[1].votes[0].vote_value = 99;
        match validate_chain(&blocks, D) {
            Err(ChainError::InvalidBlock { index, source }) => {
                assert_eq!(index, 1);
                assert!(matches!(source, BlockError::HashMismatch { .. }));
            }
            other => panic!("expected invalid block at 1, got {other:?}"),
        }
    }

    #[test]
    fn broken_link_reports_index() {
        let (mut chain, keys) = registered(1);
        chain.add_vote(Vote::signed(&keys[0], 1).unwrap());
        assert!(chain.create_block());

        let mut blocks = chain.chain().to_vec();
        let mut orphan = Block::new(BlockHash::new("00ff"), vec![]);
        orphan.mine_block(D);
        blocks.push(orphan);
        assert!(matches!(
            validate_chain(&blocks, D),
            Err(ChainError::BrokenLink { index: 2, .. })
        ));
    }

    #[test]
    fn genesis_must_follow_the_zero_hash() {
        let mut genesis = Block::new(BlockHash::new("0abc"), vec![]);
        genesis.mine_block(D);
        assert!(matches!(
            validate_chain(&[genesis], D),
            Err(ChainError::BrokenLink { index: 0, .. })
        ));

        let mut candidate = Blockchain::new(D);
        candidate.chain[0] = {
            let mut forged = Block::new(BlockHash::new("ffff"), vec![]);
            forged.mine_block(D);
            forged
        };
        let keys = generate_keypair();
        candidate.remaining.insert(keys.public.clone());
        candidate.add_vote(Vote::signed(&keys, 1).unwrap());
        assert!(candidate.create_block());

        let mut ours = Blockchain::new(D);
        assert!(!ours.attempt_consensus(candidate.snapshot()));
        assert_eq!(ours.len(), 1);
    }

    #[test]
    fn state_during_mining_keeps_the_ballot() {
        let (mut chain, keys) = registered(1);
        chain.add_vote(Vote::signed(&keys[0], 1).unwrap());
        let mut candidate = chain.take_candidate().unwrap();
        assert!(chain.in_flight().is_some());
        assert!(chain.pending_votes().is_empty());

        let restored = Blockchain::from_state(chain.state()).unwrap();
        assert!(restored.is_eligible(&keys[0].public));
        assert_eq!(restored.pending_votes().len(), 1);
        assert!(restored.in_flight().is_none());

        candidate.mine_block(D);
        assert!(chain.append_mined(candidate));
        assert!(chain.in_flight().is_none());
        let state = chain.state();
        assert!(state.pending_votes.is_empty());
        assert!(!state.remaining_voters.contains(&keys[0].public));
    }

    #[test]
    fn empty_chain_is_invalid() {
        assert_eq!(validate_chain(&[], D), Err(ChainError::Empty));
    }

    #[test]
    fn incoming_block_on_tip_is_accepted() {
        let (mut a, keys) = registered(1);
        let mut b = a.clone();

        a.add_vote(Vote::signed(&keys[0], 1).unwrap());
        assert!(a.create_block());

        let block = a.tip().clone();
        assert!(b.handle_incoming_block(block).is_ok());
        assert_eq!(b.len(), 2);
        assert!(!b.is_eligible(&keys[0].public));
        assert!(b.is_valid().is_ok());
    }

    #[test]
    fn incoming_block_off_tip_is_rejected() {
        let mut chain = Blockchain::new(D);
        let mut stray = Block::new(BlockHash::new("00abc"), vec![]);
        stray.mine_block(D);
        assert!(matches!(
            chain.handle_incoming_block(stray),
            Err(ChainError::BrokenLink { index: 1, .. })
        ));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn incoming_invalid_block_is_rejected() {
        let mut chain = Blockchain::new(D);
        let mut block = Block::new(chain.tip().hash.clone(), vec![]);
        block.mine_block(D);
        block.nonce += 1;
        assert!(matches!(
            chain.handle_incoming_block(block),
            Err(ChainError::InvalidBlock { index: 1, .. })
        ));
    }

    #[test]
    fn incoming_voter_is_idempotent() {
        let mut chain = Blockchain::new(D);
        let kp = generate_keypair();
        assert!(chain.handle_incoming_voter(kp.public.clone()));
        assert!(!chain.handle_incoming_voter(kp.public.clone()));
        assert_eq!(chain.remaining_voters().len(), 1);
    }

    #[test]
    fn spent_voter_cannot_be_reregistered() {
        let (mut chain, keys) = registered(1);
        chain.add_vote(Vote::signed(&keys[0], 1).unwrap());
        assert!(chain.create_block());
        assert!(!chain.handle_incoming_voter(keys[0].public.clone()));
        assert!(!chain.is_eligible(&keys[0].public));
    }

    #[test]
    fn consensus_adopts_longer_valid_chain() {
        let (mut ours, keys) = registered(2);
        let mut theirs = ours.clone();
        theirs.add_vote(Vote::signed(&keys[0], 1).unwrap());
        assert!(theirs.create_block());

        assert!(ours.attempt_consensus(theirs.snapshot()));
        assert_eq!(ours.len(), 2);
        assert!(ours.is_valid().is_ok());
        assert!(!ours.is_eligible(&keys[0].public));
        assert!(ours.is_eligible(&keys[1].public));
    }

    #[test]
    fn consensus_rejects_equal_length() {
        let mut ours = Blockchain::new(D);
        let theirs = Blockchain::new(D);
        assert!(!ours.attempt_consensus(theirs.snapshot()));
    }

    #[test]
    fn consensus_rejects_lower_difficulty_even_if_longer() {
        let (mut ours, _) = registered(0);
        let keys = generate_keypair();
        let mut theirs = Blockchain::with_voters(1, [keys.public.clone()]);
        theirs.add_vote(Vote::signed(&keys, 1).unwrap());
        assert!(theirs.create_block());

        let before = ours.tip().hash.clone();
        assert!(!ours.attempt_consensus(theirs.snapshot()));
        assert_eq!(ours.tip().hash, before);
    }

    #[test]
    fn consensus_rejects_invalid_longer_chain() {
        let (mut ours, keys) = registered(1);
        let mut theirs = ours.clone();
        theirs.add_vote(Vote::signed(&keys[0], 1).unwrap());
        assert!(theirs.create_block());

        let mut snapshot = theirs.snapshot();
        snapshot.chain[1].previous_hash = BlockHash::new("00dead");
        assert!(!ours.attempt_consensus(snapshot));
        assert_eq!(ours.len(), 1);
        assert!(ours.is_eligible(&keys[0].public));
    }

    #[test]
    fn adoption_restores_voters_spent_only_in_old_chain() {
        let keys: Vec<KeyPair> = (0..2).map(|_| generate_keypair()).collect();
        let base = Blockchain::with_voters(D, keys.iter().map(|k| k.public.clone()));

        // Ours spends voter 0 once.
        let mut ours = base.clone();
        ours.add_vote(Vote::signed(&keys[0], 1).unwrap());
        assert!(ours.create_block());

        // Theirs spends voter 1 and a voter only it knows, in two blocks.
        let mut theirs = base;
        let extra = generate_keypair();
        theirs.handle_incoming_voter(extra.public.clone());
        theirs.add_vote(Vote::signed(&keys[1], 1).unwrap());
        assert!(theirs.create_block());
        theirs.add_vote(Vote::signed(&extra, 1).unwrap());
        assert!(theirs.create_block());

        assert!(ours.attempt_consensus(theirs.snapshot()));
        assert!(ours.is_eligible(&keys[0].public));
        assert!(!ours.is_eligible(&keys[1].public));
    }

    #[test]
    fn consensus_leaves_pending_queue_alone() {
        let (mut ours, keys) = registered(1);
        let mut theirs = ours.clone();
        theirs.add_vote(Vote::signed(&keys[0], 1).unwrap());
        assert!(theirs.create_block());

        ours.add_vote(Vote::signed(&keys[0], 2).unwrap());
        assert!(ours.attempt_consensus(theirs.snapshot()));
        assert_eq!(ours.pending_votes().len(), 1);
        // The queued ballot's voter was spent by the adopted chain.
        assert!(!ours.create_block());
    }

    #[test]
    fn candidate_abandoned_when_tip_moves() {
        let (mut chain, keys) = registered(2);
        chain.add_vote(Vote::signed(&keys[0], 1).unwrap());
        let mut candidate = chain.take_candidate().unwrap();
        assert!(!chain.is_eligible(&keys[0].public));

        // A peer block for voter 1 lands first.
        let mut peer = chain.clone();
        peer.add_vote(Vote::signed(&keys[1], 1).unwrap());
        assert!(peer.create_block());
        chain.handle_incoming_block(peer.tip().clone()).unwrap();

        candidate.mine_block(D);
        assert!(!chain.append_mined(candidate));
        assert_eq!(chain.pending_votes().len(), 1);
        assert!(chain.is_eligible(&keys[0].public));

        assert!(chain.create_block());
        assert_eq!(chain.len(), 3);
        assert!(chain.is_valid().is_ok());
    }

    #[test]
    fn state_roundtrip_through_from_state() {
        let (mut chain, keys) = registered(2);
        chain.add_vote(Vote::signed(&keys[0], 1).unwrap());
        assert!(chain.create_block());
        chain.add_vote(Vote::signed(&keys[1], 4).unwrap());

        let json = serde_json::to_string(&chain.state()).unwrap();
        assert!(json.contains("remainingVoters"));
        let restored = Blockchain::from_state(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.pending_votes().len(), 1);
        assert!(restored.is_eligible(&keys[1].public));
    }

    #[test]
    fn from_state_rejects_corrupt_chain() {
        let mut state = Blockchain::new(D).state();
        state.chain[0].nonce += 1;
        assert!(Blockchain::from_state(state).is_err());
    }
}
