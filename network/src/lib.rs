//! P2P replication layer.
//!
//! Peers are addressed directly from a small bounded directory. Every
//! exchange is one signed request and one signed response over a fresh TCP
//! connection. Locally produced votes, voter registrations and blocks are
//! gossiped to a random sample of peers, and re-gossiped by each receiver
//! until the seen-message cache stops the flood.

pub mod dedup;
pub mod error;
pub mod identity;
pub mod manager;
pub mod peers;
pub mod server;
pub mod transport;

pub use dedup::{MessageDedup, DEFAULT_DEDUP_CAPACITY};
pub use error::{NetworkError, PeerError};
pub use identity::LocalIdentity;
pub use manager::{NetworkManager, GOSSIP_FANOUT};
pub use peers::{KnownPeers, DEFAULT_MAX_PEERS};
pub use server::{handle_connection, run_listener};
pub use transport::{NullTransport, TcpTransport, Transport, DEFAULT_SEND_TIMEOUT};
