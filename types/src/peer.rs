//! Remote peer identity.

use crate::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A peer on the network: where to reach it and which key signs its messages.
///
/// Equality covers all three fields, so a node that restarts with a new key
/// on the same address is a different peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePeer {
    pub host: String,
    pub port: u16,
    pub public_key: PublicKey,
}

impl RemotePeer {
    pub fn new(host: impl Into<String>, port: u16, public_key: PublicKey) -> Self {
        Self {
            host: host.into(),
            port,
            public_key,
        }
    }

    /// `"host:port"`, suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for RemotePeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
