use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("connection closed before a message arrived")]
    Closed,

    #[error("crypto error: {0}")]
    Crypto(#[from] tally_crypto::CryptoError),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
