use tally_types::RemotePeer;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("peer {0} is already known")]
    Duplicate(RemotePeer),

    #[error("peer list is full ({max} peers)")]
    Capacity { max: usize },
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("timed out talking to {0}")]
    Timeout(String),

    #[error("{peer} rejected {message_type}: {reason}")]
    Rejected {
        peer: String,
        message_type: String,
        reason: String,
    },

    #[error("response from {0} failed signature verification")]
    BadResponse(String),

    #[error("no known peers")]
    NoPeers,

    #[error("peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("protocol error: {0}")]
    Protocol(#[from] tally_protocol::ProtocolError),

    #[error("crypto error: {0}")]
    Crypto(#[from] tally_crypto::CryptoError),

    #[error("payload error: {0}")]
    Payload(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(e: serde_json::Error) -> Self {
        Self::Payload(e.to_string())
    }
}
