//! Integration tests running several in-process nodes over real loopback
//! TCP: connection requests, voter and vote gossip, block gossip, chain-sync
//! adoption and restart from the JSON store.
//!
//! Timers are set far in the future so every round is driven explicitly.

use std::future::Future;
use std::time::Duration;

use tally_crypto::generate_keypair;
use tally_ledger::Vote;
use tally_network::NetworkError;
use tally_node::{NodeConfig, NodeError, TallyNode};
use tally_types::BlockHash;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_config(dir: &TempDir) -> NodeConfig {
    NodeConfig {
        port: 0,
        data_dir: dir.path().to_path_buf(),
        difficulty: 1,
        mining_interval_secs: 3600,
        sync_interval_secs: 3600,
        persist_interval_secs: 3600,
        send_timeout_ms: 2000,
        ..NodeConfig::default()
    }
}

async fn start_node(config: NodeConfig) -> TallyNode {
    let mut node = TallyNode::new(config).await.expect("node builds");
    node.start().await.expect("node starts");
    node
}

/// Poll `condition` every 20 ms for up to 5 s.
async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn chain_hashes(node: &TallyNode) -> Vec<BlockHash> {
    node.ledger_snapshot()
        .await
        .chain
        .into_iter()
        .map(|b| b.hash)
        .collect()
}

async fn connect(from: &TallyNode, to: &TallyNode) {
    let target = to.peer_id();
    let peer = from
        .connect(&target.host, target.port)
        .await
        .expect("connection accepted");
    assert_eq!(peer, target);
}

// ---------------------------------------------------------------------------
// 1. Three nodes converge through gossip and chain-sync
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_nodes_converge_on_one_chain() {
    let (dir_a, dir_b, dir_c) = (
        TempDir::new().unwrap(),
        TempDir::new().unwrap(),
        TempDir::new().unwrap(),
    );
    let mut a = start_node(test_config(&dir_a)).await;
    let mut b = start_node(test_config(&dir_b)).await;
    let mut c = start_node(test_config(&dir_c)).await;

    connect(&b, &a).await;
    connect(&c, &a).await;
    assert_eq!(a.known_peers().await.len(), 2);

    // Every node mined its own genesis.
    assert_ne!(chain_hashes(&a).await, chain_hashes(&b).await);

    let alice = generate_keypair();
    let bob = generate_keypair();
    a.register_voter(alice.public.clone()).await.unwrap();
    a.register_voter(bob.public.clone()).await.unwrap();

    let (a_ref, b_ref, c_ref) = (&a, &b, &c);
    wait_until("voter gossip", move || async move {
        let b_state = b_ref.ledger_state().await;
        let c_state = c_ref.ledger_state().await;
        b_state.remaining_voters.len() == 2 && c_state.remaining_voters.len() == 2
    })
    .await;

    // A mines alice's ballot; B and C adopt A's longer chain on sync.
    a.submit_vote(Vote::signed(&alice, 1).unwrap()).await.unwrap();
    let first = a.mine_now().await.unwrap().expect("block with alice's vote");
    assert!(b.sync_now().await.unwrap());
    assert!(c.sync_now().await.unwrap());
    assert_eq!(chain_hashes(&b).await, chain_hashes(&a).await);
    assert_eq!(chain_hashes(&c).await, chain_hashes(&a).await);
    assert_eq!(b.ledger_snapshot().await.chain[1].hash, first.hash);

    // Adoption spent alice on B, leaving bob eligible.
    let b_state = b.ledger_state().await;
    assert!(!b_state.remaining_voters.contains(&alice.public));
    assert!(b_state.remaining_voters.contains(&bob.public));

    // Bob votes through B; the ballot reaches A by gossip.
    b.submit_vote(Vote::signed(&bob, 0).unwrap()).await.unwrap();
    let bob_key = bob.public.clone();
    wait_until("vote gossip to A", move || {
        let bob_key = bob_key.clone();
        async move {
            a_ref
                .ledger_state()
                .await
                .pending_votes
                .iter()
                .any(|v| v.voter == bob_key)
        }
    })
    .await;

    // A mines it and the block gossip extends B and C directly.
    let second = a.mine_now().await.unwrap().expect("block with bob's vote");
    assert_eq!(second.previous_hash, first.hash);
    wait_until("block gossip", move || async move {
        b_ref.ledger_snapshot().await.len() == 3 && c_ref.ledger_snapshot().await.len() == 3
    })
    .await;
    assert_eq!(chain_hashes(&b).await, chain_hashes(&a).await);
    assert_eq!(chain_hashes(&c).await, chain_hashes(&a).await);
    assert!(b.ledger().is_valid().await.is_ok());

    // Nothing longer to adopt now.
    assert!(!c.sync_now().await.unwrap());

    a.stop().await.unwrap();
    b.stop().await.unwrap();
    c.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// 2. A voter's second ballot is never accepted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_ballot_from_same_voter_is_discarded() {
    let dir = TempDir::new().unwrap();
    let mut node = start_node(test_config(&dir)).await;
    let voter = generate_keypair();
    node.register_voter(voter.public.clone()).await.unwrap();

    node.submit_vote(Vote::signed(&voter, 1).unwrap()).await.unwrap();
    node.submit_vote(Vote::signed(&voter, 2).unwrap()).await.unwrap();
    let block = node.mine_now().await.unwrap().expect("one ballot accepted");
    assert_eq!(block.votes.len(), 1);
    assert_eq!(block.votes[0].vote_value, 1);

    node.submit_vote(Vote::signed(&voter, 3).unwrap()).await.unwrap();
    assert!(node.mine_now().await.unwrap().is_none());
    assert_eq!(node.ledger_snapshot().await.len(), 2);

    node.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// 3. Restart from the data directory
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restarted_node_keeps_chain_identity_and_peers() {
    let (dir_a, dir_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let mut a = start_node(test_config(&dir_a)).await;
    let mut b = start_node(test_config(&dir_b)).await;
    connect(&b, &a).await;

    let voter = generate_keypair();
    a.register_voter(voter.public.clone()).await.unwrap();
    a.submit_vote(Vote::signed(&voter, 7).unwrap()).await.unwrap();
    a.mine_now().await.unwrap().expect("block mined");
    assert!(b.sync_now().await.unwrap());

    let b_key = b.peer_id().public_key;
    let b_chain = chain_hashes(&b).await;
    b.stop().await.unwrap();
    drop(b);

    let mut restarted = start_node(test_config(&dir_b)).await;
    assert_eq!(restarted.peer_id().public_key, b_key);
    assert_eq!(chain_hashes(&restarted).await, b_chain);
    assert_eq!(restarted.known_peers().await, vec![a.peer_id()]);

    // A still lists the old port, but chain requests need no membership.
    let voter2 = generate_keypair();
    a.register_voter(voter2.public.clone()).await.unwrap();
    a.submit_vote(Vote::signed(&voter2, 8).unwrap()).await.unwrap();
    a.mine_now().await.unwrap().expect("second block mined");
    assert!(restarted.sync_now().await.unwrap());
    assert_eq!(chain_hashes(&restarted).await, chain_hashes(&a).await);

    restarted.stop().await.unwrap();
    a.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// 4. A full peer list turns connection requests away
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connection_rejected_when_peer_list_full() {
    let (dir_a, dir_b, dir_c) = (
        TempDir::new().unwrap(),
        TempDir::new().unwrap(),
        TempDir::new().unwrap(),
    );
    let mut a = start_node(NodeConfig {
        max_peers: 1,
        ..test_config(&dir_a)
    })
    .await;
    let mut b = start_node(test_config(&dir_b)).await;
    let mut c = start_node(test_config(&dir_c)).await;

    connect(&b, &a).await;
    let target = a.peer_id();
    let result = c.connect(&target.host, target.port).await;
    assert!(matches!(
        result,
        Err(NodeError::Network(NetworkError::Rejected { .. }))
    ));
    assert!(c.known_peers().await.is_empty());
    assert_eq!(a.known_peers().await, vec![b.peer_id()]);

    a.stop().await.unwrap();
    b.stop().await.unwrap();
    c.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// 5. Bootstrap peers are contacted on start
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bootstrap_peer_is_connected_and_synced() {
    let (dir_a, dir_b) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let mut a = start_node(test_config(&dir_a)).await;
    let voter = generate_keypair();
    a.register_voter(voter.public.clone()).await.unwrap();
    a.submit_vote(Vote::signed(&voter, 1).unwrap()).await.unwrap();
    a.mine_now().await.unwrap().expect("block mined");

    let target = a.peer_id();
    let mut b = start_node(NodeConfig {
        bootstrap_peers: vec![format!("{}:{}", target.host, target.port)],
        ..test_config(&dir_b)
    })
    .await;

    let b_ref = &b;
    wait_until("bootstrap sync", move || async move {
        b_ref.ledger_snapshot().await.len() == 2
    })
    .await;
    assert_eq!(chain_hashes(&b).await, chain_hashes(&a).await);
    assert_eq!(a.known_peers().await, vec![b.peer_id()]);

    b.stop().await.unwrap();
    a.stop().await.unwrap();
}
