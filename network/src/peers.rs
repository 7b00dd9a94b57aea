//! Bounded directory of known remote peers.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tally_types::RemotePeer;

use crate::error::PeerError;

pub const DEFAULT_MAX_PEERS: usize = 8;

/// Known peers in insertion order, at most `max_peers` of them.
///
/// Membership is equality of `(host, port, public_key)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownPeers {
    max_peers: usize,
    peers: Vec<RemotePeer>,
}

impl KnownPeers {
    pub fn new(max_peers: usize) -> Self {
        Self {
            max_peers,
            peers: Vec::with_capacity(max_peers),
        }
    }

    pub fn add_peer(&mut self, peer: RemotePeer) -> Result<(), PeerError> {
        if self.contains_peer(&peer) {
            return Err(PeerError::Duplicate(peer));
        }
        if self.is_full() {
            return Err(PeerError::Capacity {
                max: self.max_peers,
            });
        }
        self.peers.push(peer);
        Ok(())
    }

    pub fn contains_peer(&self, peer: &RemotePeer) -> bool {
        self.peers.contains(peer)
    }

    /// Returns `true` if the peer was present.
    pub fn remove_peer(&mut self, peer: &RemotePeer) -> bool {
        let before = self.peers.len();
        self.peers.retain(|p| p != peer);
        self.peers.len() != before
    }

    /// Up to `n` distinct peers, uniformly at random without replacement.
    pub fn get_random_peers(&self, n: usize) -> Vec<RemotePeer> {
        let mut rng = rand::thread_rng();
        self.peers.choose_multiple(&mut rng, n).cloned().collect()
    }

    pub fn peers(&self) -> &[RemotePeer] {
        &self.peers
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    /// Change the capacity. Existing peers beyond it are kept.
    pub fn set_max_peers(&mut self, max_peers: usize) {
        self.max_peers = max_peers;
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.max_peers
    }
}

impl Default for KnownPeers {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PEERS)
    }
}
