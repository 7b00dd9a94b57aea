//! The message protocol: validate, dispatch and answer inbound requests;
//! sign and gossip locally produced data; drive chain-sync and connection
//! requests.
//!
//! Inbound lifecycle: received → validated → dispatched → responded, with
//! any validation or handler failure producing a signed `rejected` response.

use std::sync::Arc;

use serde_json::{json, Value};
use tally_ledger::{Block, ChainSnapshot, SharedLedger, Vote};
use tally_protocol::{Message, MessageType, VoterPayload};
use tally_types::{PublicKey, RemotePeer};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dedup::MessageDedup;
use crate::error::{NetworkError, PeerError};
use crate::identity::LocalIdentity;
use crate::peers::KnownPeers;
use crate::transport::Transport;

/// Number of peers each gossip round is sent to.
pub const GOSSIP_FANOUT: usize = 3;

/// Handle to the protocol state. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct NetworkManager {
    identity: Arc<LocalIdentity>,
    ledger: SharedLedger,
    peers: Arc<RwLock<KnownPeers>>,
    seen: Arc<Mutex<MessageDedup>>,
    transport: Arc<dyn Transport>,
}

impl NetworkManager {
    pub fn new(
        identity: LocalIdentity,
        ledger: SharedLedger,
        peers: Arc<RwLock<KnownPeers>>,
        seen_capacity: usize,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            identity: Arc::new(identity),
            ledger,
            peers,
            seen: Arc::new(Mutex::new(MessageDedup::new(seen_capacity))),
            transport,
        }
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn peer_id(&self) -> RemotePeer {
        self.identity.peer_id()
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn known_peers(&self) -> &Arc<RwLock<KnownPeers>> {
        &self.peers
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    /// Validate, dispatch and answer one inbound request.
    ///
    /// Only fails if this node cannot sign its own response.
    pub async fn handle_incoming_message(&self, message: Message) -> Result<Message, NetworkError> {
        let message_type = message.message_type;
        debug!(%message_type, sender = %message.sender, "handling message");

        if let Err(reason) = self.validate_message(&message).await {
            warn!(%message_type, sender = %message.sender, %reason, "rejecting message");
            return Ok(self.identity.reject(reason)?);
        }

        match self.dispatch(message).await {
            Ok(data) => Ok(self.identity.sign(message_type.accepted_response(), data)?),
            Err(reason) => {
                warn!(%message_type, %reason, "request failed");
                Ok(self.identity.reject(reason)?)
            }
        }
    }

    /// Respond to a frame that could not be parsed as an envelope.
    pub fn reject_malformed(&self, error: &tally_protocol::ProtocolError) -> Result<Message, NetworkError> {
        Ok(self.identity.reject(format!("invalid message format: {error}"))?)
    }

    /// Signature, type, sender membership, then the seen-message cache for
    /// gossip. Returns the rejection reason on failure.
    async fn validate_message(&self, message: &Message) -> Result<(), String> {
        match message.verify() {
            Ok(true) => {}
            Ok(false) => return Err("invalid signature".into()),
            Err(e) => return Err(format!("invalid signature: {e}")),
        }

        if !message.message_type.is_request() {
            return Err(format!("invalid message type {}", message.message_type));
        }

        if message.message_type != MessageType::RequestConnection
            && !self.peers.read().await.contains_peer(&message.sender)
        {
            return Err("sender not in known peer list".into());
        }

        if message.message_type.is_gossip() && self.seen.lock().await.is_duplicate(&message.digest()) {
            return Err("message already seen".into());
        }

        Ok(())
    }

    /// Hand a validated request to the ledger or peer list. Returns the
    /// response payload, or the rejection reason.
    async fn dispatch(&self, message: Message) -> Result<Value, String> {
        match message.message_type {
            MessageType::SendVote => {
                let vote: Vote = serde_json::from_value(message.data.clone())
                    .map_err(|e| format!("malformed vote: {e}"))?;
                self.ledger.handle_incoming_vote(vote).await;
                self.regossip(message);
                Ok(json!({}))
            }
            MessageType::SendVoter => {
                let payload: VoterPayload = serde_json::from_value(message.data.clone())
                    .map_err(|e| format!("malformed voter: {e}"))?;
                if self.ledger.handle_incoming_voter(payload.voter.clone()).await {
                    info!(voter = %payload.voter, "registered voter from peer");
                }
                self.regossip(message);
                Ok(json!({}))
            }
            MessageType::SendBlock => {
                let block: Block = serde_json::from_value(message.data.clone())
                    .map_err(|e| format!("malformed block: {e}"))?;
                let hash = block.hash.clone();
                if let Err(e) = self.ledger.handle_incoming_block(block).await {
                    warn!(%hash, error = %e, "discarding block from peer");
                    return Err(format!("block rejected: {e}"));
                }
                self.regossip(message);
                Ok(json!({}))
            }
            MessageType::RequestBlockchain => {
                let snapshot = self.ledger.snapshot().await;
                serde_json::to_value(snapshot).map_err(|e| e.to_string())
            }
            MessageType::RequestConnection => {
                match self.peers.write().await.add_peer(message.sender.clone()) {
                    Ok(()) => info!(peer = %message.sender, "peer connected"),
                    Err(PeerError::Duplicate(_)) => {
                        debug!(peer = %message.sender, "peer reconnected")
                    }
                    Err(e) => return Err(e.to_string()),
                }
                serde_json::to_value(self.identity.peer_id()).map_err(|e| e.to_string())
            }
            other => Err(format!("invalid message type {other}")),
        }
    }

    /// Re-sign a received gossip payload as ourselves and flood it onward.
    fn regossip(&self, received: Message) {
        match self.identity.sign(received.message_type, received.data) {
            Ok(message) => {
                let this = self.clone();
                tokio::spawn(async move {
                    this.distribute_send_message(message).await;
                });
            }
            Err(e) => warn!(error = %e, "failed to sign relayed message"),
        }
    }

    // ── Outbound gossip ─────────────────────────────────────────────────

    /// Sign a payload as this node.
    pub fn formulate_outgoing_message(
        &self,
        message_type: MessageType,
        data: Value,
    ) -> Result<Message, NetworkError> {
        Ok(self.identity.sign(message_type, data)?)
    }

    /// Send to [`GOSSIP_FANOUT`] random known peers, one task per peer.
    ///
    /// Sends are independent: a failure is logged and neither retried nor
    /// allowed to affect the others. The handles may be awaited or dropped.
    pub async fn distribute_send_message(&self, message: Message) -> Vec<JoinHandle<()>> {
        let targets = self.peers.read().await.get_random_peers(GOSSIP_FANOUT);
        debug!(message_type = %message.message_type, targets = targets.len(), "distributing message");

        let message = Arc::new(message);
        targets
            .into_iter()
            .map(|peer| {
                let transport = Arc::clone(&self.transport);
                let message = Arc::clone(&message);
                tokio::spawn(async move {
                    let addr = peer.addr();
                    match transport.send(&addr, &message).await {
                        Ok(response) if response.is_accepted() => {
                            debug!(message_type = %message.message_type, peer = %addr, "accepted by peer");
                        }
                        Ok(response) => {
                            debug!(
                                message_type = %message.message_type,
                                peer = %addr,
                                reason = response.reason().unwrap_or("unknown"),
                                "rejected by peer"
                            );
                        }
                        Err(e) => {
                            warn!(message_type = %message.message_type, peer = %addr, error = %e, "send failed");
                        }
                    }
                })
            })
            .collect()
    }

    /// Sign, record as seen, and gossip a locally originated payload.
    async fn originate(
        &self,
        message_type: MessageType,
        data: Value,
    ) -> Result<Vec<JoinHandle<()>>, NetworkError> {
        let message = self.formulate_outgoing_message(message_type, data)?;
        self.seen.lock().await.record(&message.digest());
        Ok(self.distribute_send_message(message).await)
    }

    pub async fn send_vote(&self, vote: &Vote) -> Result<Vec<JoinHandle<()>>, NetworkError> {
        self.originate(MessageType::SendVote, serde_json::to_value(vote)?).await
    }

    pub async fn send_voter(&self, voter: &PublicKey) -> Result<Vec<JoinHandle<()>>, NetworkError> {
        let payload = VoterPayload {
            voter: voter.clone(),
        };
        self.originate(MessageType::SendVoter, serde_json::to_value(payload)?).await
    }

    pub async fn send_block(&self, block: &Block) -> Result<Vec<JoinHandle<()>>, NetworkError> {
        self.originate(MessageType::SendBlock, serde_json::to_value(block)?).await
    }

    // ── Requests ────────────────────────────────────────────────────────

    /// Ask `host:port` to add us, and add the responder to our peer list.
    pub async fn connect_to_peer(&self, host: &str, port: u16) -> Result<RemotePeer, NetworkError> {
        let addr = format!("{host}:{port}");
        let data = serde_json::to_value(self.identity.peer_id())?;
        let request = self.formulate_outgoing_message(MessageType::RequestConnection, data)?;
        let response = self.request(&addr, &request, None).await?;

        let peer = response.sender;
        match self.peers.write().await.add_peer(peer.clone()) {
            Ok(()) => info!(%peer, "connected to peer"),
            Err(PeerError::Duplicate(_)) => debug!(%peer, "peer already known"),
            Err(e) => {
                warn!(%peer, error = %e, "cannot add peer");
                return Err(e.into());
            }
        }
        Ok(peer)
    }

    /// Fetch one random peer's chain and offer it to consensus.
    ///
    /// Returns whether the local chain was replaced.
    pub async fn sync_with_random_peer(&self) -> Result<bool, NetworkError> {
        let Some(peer) = self.peers.read().await.get_random_peers(1).pop() else {
            return Err(NetworkError::NoPeers);
        };
        let request = self.formulate_outgoing_message(MessageType::RequestBlockchain, json!({}))?;
        let response = self
            .request(&peer.addr(), &request, Some(&peer.public_key))
            .await?;
        let candidate: ChainSnapshot = serde_json::from_value(response.data)?;

        let theirs = candidate.len();
        let adopted = self.ledger.attempt_consensus(candidate).await;
        debug!(%peer, theirs, adopted, "chain sync complete");
        Ok(adopted)
    }

    /// Send a request and accept only a verified, non-rejected response,
    /// optionally from a specific key.
    async fn request(
        &self,
        addr: &str,
        request: &Message,
        expected_key: Option<&PublicKey>,
    ) -> Result<Message, NetworkError> {
        let response = self.transport.send(addr, request).await?;

        if !response.verify().unwrap_or(false) {
            return Err(NetworkError::BadResponse(addr.to_owned()));
        }
        if let Some(key) = expected_key {
            if &response.sender.public_key != key {
                return Err(NetworkError::BadResponse(addr.to_owned()));
            }
        }
        if !response.is_accepted() {
            return Err(NetworkError::Rejected {
                peer: addr.to_owned(),
                message_type: request.message_type.to_string(),
                reason: response.reason().unwrap_or("unknown").to_owned(),
            });
        }
        Ok(response)
    }
}
