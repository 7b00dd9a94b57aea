use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("invalid base64: {0}")]
    Encoding(String),
}
