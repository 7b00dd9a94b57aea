//! Persistent peer list storage trait.
//!
//! Lets a restarted node reach its previous peers without relying solely on
//! bootstrap peers.

use tally_network::KnownPeers;

use crate::StoreError;

pub trait PeerStore {
    fn load_peer_list(&self) -> Result<Option<KnownPeers>, StoreError>;

    fn save_peer_list(&self, peers: &KnownPeers) -> Result<(), StoreError>;
}
