use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] tally_ledger::LedgerError),

    #[error("network error: {0}")]
    Network(#[from] tally_network::NetworkError),

    #[error("store error: {0}")]
    Store(#[from] tally_store::StoreError),

    #[error("crypto error: {0}")]
    Crypto(#[from] tally_crypto::CryptoError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),
}
