//! Tally node: ties the ledger, the peer protocol and persistence into one
//! running process.
//!
//! The node:
//! - Loads identity, ledger and peers from the store
//! - Serves peer requests on a TCP listener
//! - Mines pending votes, syncs chains and persists state on timers
//! - Exposes the facade a front-end uses to submit votes and voters

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod shutdown;

pub use config::{parse_peer_addr, NodeConfig};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use node::TallyNode;
pub use shutdown::ShutdownController;
