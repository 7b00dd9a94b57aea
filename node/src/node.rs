//! TallyNode: loads state, owns the listener and the periodic loops, and
//! exposes the front-end facade.

use std::sync::Arc;
use std::time::Duration;

use tally_crypto::generate_keypair;
use tally_ledger::{Block, Blockchain, ChainSnapshot, LedgerState, SharedLedger, Vote};
use tally_network::{KnownPeers, LocalIdentity, NetworkError, NetworkManager, TcpTransport};
use tally_store::{JsonFileStore, NodeStore};
use tally_types::{KeyPair, PublicKey, RemotePeer};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::config::NodeConfig;
use crate::shutdown::ShutdownController;
use crate::NodeError;

/// A running (or ready to run) voting node.
pub struct TallyNode {
    pub config: NodeConfig,
    pub shutdown: Arc<ShutdownController>,
    store: Arc<dyn NodeStore>,
    manager: NetworkManager,
    /// Bound in `new` so the advertised port is known before `start`.
    listener: Option<TcpListener>,
    task_handles: Vec<JoinHandle<()>>,
}

impl TallyNode {
    /// Open the JSON store in `config.data_dir` and build the node.
    pub async fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let store = JsonFileStore::open(&config.data_dir)?;
        Self::with_store(config, Arc::new(store)).await
    }

    /// Build the node on an arbitrary store.
    pub async fn with_store(
        config: NodeConfig,
        store: Arc<dyn NodeStore>,
    ) -> Result<Self, NodeError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let port = listener.local_addr()?.port();

        let keys = load_identity(store.as_ref())?;
        let identity = LocalIdentity::new(config.host.clone(), port, keys)?;

        let chain = {
            let store = Arc::clone(&store);
            let difficulty = config.difficulty;
            tokio::task::spawn_blocking(move || load_ledger(store.as_ref(), difficulty))
                .await
                .map_err(|e| NodeError::Task(e.to_string()))??
        };

        let mut peers = store
            .load_peer_list()?
            .unwrap_or_else(|| KnownPeers::new(config.max_peers));
        peers.set_max_peers(config.max_peers);

        tracing::info!(
            peer = %identity.peer_id(),
            blocks = chain.len(),
            difficulty = chain.difficulty(),
            voters = chain.remaining_voters().len(),
            known_peers = peers.len(),
            "tally node initialised"
        );

        let manager = NetworkManager::new(
            identity,
            SharedLedger::new(chain),
            Arc::new(RwLock::new(peers)),
            config.dedup_capacity,
            Arc::new(TcpTransport::new(config.send_timeout())),
        );

        Ok(Self {
            config,
            shutdown: Arc::new(ShutdownController::new()),
            store,
            manager,
            listener: Some(listener),
            task_handles: Vec::new(),
        })
    }

    /// Spawn the listener, the mining, sync and persistence loops, and the
    /// bootstrap connection requests.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| NodeError::Config("node already started".into()))?;
        let bootstrap = self.config.bootstrap_addrs()?;

        tracing::info!(peer = %self.peer_id(), "tally node starting");

        // ── P2P listener ────────────────────────────────────────────────
        let handle = tokio::spawn(tally_network::run_listener(
            listener,
            self.manager.clone(),
            self.shutdown.subscribe(),
        ));
        self.task_handles.push(handle);

        // ── Mining ──────────────────────────────────────────────────────
        let manager = self.manager.clone();
        let period = self.config.mining_interval();
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("mining task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = mine_and_gossip(&manager).await {
                            tracing::warn!(error = %e, "mining round failed");
                        }
                    }
                }
            }
        });
        self.task_handles.push(handle);

        // ── Chain sync ──────────────────────────────────────────────────
        let manager = self.manager.clone();
        let period = self.config.sync_interval();
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("chain sync task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        match manager.sync_with_random_peer().await {
                            Ok(true) => tracing::info!("adopted a longer chain from a peer"),
                            Ok(false) => {}
                            Err(NetworkError::NoPeers) => tracing::debug!("no peers to sync with"),
                            Err(e) => tracing::warn!(error = %e, "chain sync failed"),
                        }
                    }
                }
            }
        });
        self.task_handles.push(handle);

        // ── Persistence ─────────────────────────────────────────────────
        let manager = self.manager.clone();
        let store = Arc::clone(&self.store);
        let period = self.config.persist_interval();
        let mut shutdown_rx = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        tracing::info!("persistence task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = persist_state(&manager, &store).await {
                            tracing::error!(error = %e, "failed to persist node state");
                        }
                    }
                }
            }
        });
        self.task_handles.push(handle);

        // ── Bootstrap ───────────────────────────────────────────────────
        if !bootstrap.is_empty() {
            let manager = self.manager.clone();
            let handle = tokio::spawn(async move {
                for (host, port) in bootstrap {
                    if let Err(e) = manager.connect_to_peer(&host, port).await {
                        tracing::warn!(%host, port, error = %e, "bootstrap peer unreachable");
                    }
                }
                match manager.sync_with_random_peer().await {
                    Ok(adopted) => tracing::debug!(adopted, "initial chain sync complete"),
                    Err(e) => tracing::debug!(error = %e, "initial chain sync skipped"),
                }
            });
            self.task_handles.push(handle);
        }

        Ok(())
    }

    /// Signal every task, wait for them, and persist a final time.
    pub async fn stop(&mut self) -> Result<(), NodeError> {
        tracing::info!("tally node stopping");
        self.shutdown.shutdown();

        for handle in self.task_handles.drain(..) {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "task ended abnormally"),
                Err(_) => tracing::warn!("task did not stop in time"),
            }
        }

        persist_state(&self.manager, &self.store).await?;
        tracing::info!("tally node stopped");
        Ok(())
    }

    // ── Front-end facade ────────────────────────────────────────────────

    pub fn peer_id(&self) -> RemotePeer {
        self.manager.peer_id()
    }

    pub fn manager(&self) -> &NetworkManager {
        &self.manager
    }

    pub fn ledger(&self) -> &SharedLedger {
        self.manager.ledger()
    }

    /// Queue a ballot locally and gossip it.
    pub async fn submit_vote(&self, vote: Vote) -> Result<(), NodeError> {
        tracing::debug!(voter = %vote.voter, "vote submitted");
        self.ledger().add_vote(vote.clone()).await;
        self.manager.send_vote(&vote).await?;
        Ok(())
    }

    /// Record a voter in the registry, make it eligible, and gossip it.
    ///
    /// Returns whether the ledger's eligible set changed.
    pub async fn register_voter(&self, voter: PublicKey) -> Result<bool, NodeError> {
        let store = Arc::clone(&self.store);
        let registered = voter.clone();
        let newly_registered =
            tokio::task::spawn_blocking(move || store.add_registered_voter(&registered))
                .await
                .map_err(|e| NodeError::Task(e.to_string()))??;

        let eligible = self.ledger().handle_incoming_voter(voter.clone()).await;
        tracing::info!(voter = %voter, newly_registered, eligible, "voter registered");

        self.manager.send_voter(&voter).await?;
        Ok(eligible)
    }

    pub async fn ledger_snapshot(&self) -> ChainSnapshot {
        self.ledger().snapshot().await
    }

    pub async fn ledger_state(&self) -> LedgerState {
        self.ledger().state().await
    }

    pub async fn known_peers(&self) -> Vec<RemotePeer> {
        self.manager.known_peers().read().await.peers().to_vec()
    }

    pub async fn connect(&self, host: &str, port: u16) -> Result<RemotePeer, NodeError> {
        Ok(self.manager.connect_to_peer(host, port).await?)
    }

    /// Run one mining round now. Returns the block that was appended, if any.
    pub async fn mine_now(&self) -> Result<Option<Block>, NodeError> {
        mine_and_gossip(&self.manager).await
    }

    /// Run one chain-sync round now. Returns whether a chain was adopted.
    pub async fn sync_now(&self) -> Result<bool, NodeError> {
        Ok(self.manager.sync_with_random_peer().await?)
    }

    pub async fn persist(&self) -> Result<(), NodeError> {
        persist_state(&self.manager, &self.store).await
    }
}

fn load_identity(store: &dyn NodeStore) -> Result<KeyPair, NodeError> {
    if let Some(keys) = store.load_identity()? {
        return Ok(keys);
    }
    let keys = generate_keypair();
    store.save_identity(&keys)?;
    tracing::info!(public_key = %keys.public, "generated new node identity");
    Ok(keys)
}

/// Persisted ledger if it validates, else a fresh one seeded from the
/// voter registry.
fn load_ledger(store: &dyn NodeStore, difficulty: usize) -> Result<Blockchain, NodeError> {
    match store.load_ledger_state() {
        Ok(Some(state)) => match Blockchain::from_state(state) {
            Ok(chain) => {
                if chain.difficulty() != difficulty {
                    tracing::warn!(
                        persisted = chain.difficulty(),
                        configured = difficulty,
                        "keeping persisted ledger difficulty"
                    );
                }
                return Ok(chain);
            }
            Err(e) => tracing::warn!(error = %e, "persisted ledger is invalid, starting fresh"),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "cannot read persisted ledger, starting fresh"),
    }

    let voters = store.load_registered_voters()?;
    tracing::info!(voters = voters.len(), difficulty, "mining genesis block");
    Ok(Blockchain::with_voters(difficulty, voters))
}

async fn mine_and_gossip(manager: &NetworkManager) -> Result<Option<Block>, NodeError> {
    let Some(block) = manager.ledger().create_block().await? else {
        return Ok(None);
    };
    tracing::info!(hash = %block.hash, votes = block.votes.len(), "mined block");
    manager.send_block(&block).await?;
    Ok(Some(block))
}

async fn persist_state(
    manager: &NetworkManager,
    store: &Arc<dyn NodeStore>,
) -> Result<(), NodeError> {
    let state = manager.ledger().state().await;
    let peers = manager.known_peers().read().await.clone();
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || -> Result<(), NodeError> {
        store.save_ledger_state(&state)?;
        store.save_peer_list(&peers)?;
        Ok(())
    })
    .await
    .map_err(|e| NodeError::Task(e.to_string()))?
}
