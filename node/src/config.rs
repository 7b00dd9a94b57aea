//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a tally node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`], overridden by
/// CLI flags, or built programmatically for tests. Every field has a default.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Interface to bind and to advertise to peers.
    #[serde(default = "default_host")]
    pub host: String,

    /// P2P port. `0` binds an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding ledger, peers, identity and voter registry.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Leading zero hex characters required of every block hash.
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,

    #[serde(default = "default_max_peers")]
    pub max_peers: usize,

    /// Gossip digests remembered for de-duplication.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// `host:port` peers to send a connection request to on startup.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    #[serde(default = "default_mining_interval_secs")]
    pub mining_interval_secs: u64,

    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,

    /// Per-request timeout for outbound peer messages.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter (e.g. "info", "debug,tally_network=trace").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tally_data")
}

fn default_difficulty() -> usize {
    tally_ledger::DEFAULT_DIFFICULTY
}

fn default_max_peers() -> usize {
    tally_network::DEFAULT_MAX_PEERS
}

fn default_dedup_capacity() -> usize {
    tally_network::DEFAULT_DEDUP_CAPACITY
}

fn default_mining_interval_secs() -> u64 {
    10
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_persist_interval_secs() -> u64 {
    10
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    pub fn mining_interval(&self) -> Duration {
        Duration::from_secs(self.mining_interval_secs.max(1))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs.max(1))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Parsed `bootstrap_peers`, rejecting the whole list on the first bad entry.
    pub fn bootstrap_addrs(&self) -> Result<Vec<(String, u16)>, NodeError> {
        self.bootstrap_peers
            .iter()
            .map(|addr| parse_peer_addr(addr))
            .collect()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            difficulty: default_difficulty(),
            max_peers: default_max_peers(),
            dedup_capacity: default_dedup_capacity(),
            bootstrap_peers: Vec::new(),
            mining_interval_secs: default_mining_interval_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            persist_interval_secs: default_persist_interval_secs(),
            send_timeout_ms: default_send_timeout_ms(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

/// Split `host:port`. The port is taken after the last colon.
pub fn parse_peer_addr(addr: &str) -> Result<(String, u16), NodeError> {
    let (host, port) = addr
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| NodeError::Config(format!("peer address missing port: {addr}")))?;
    if host.is_empty() {
        return Err(NodeError::Config(format!("peer address missing host: {addr}")));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| NodeError::Config(format!("bad port in {addr}: {e}")))?;
    Ok((host.to_string(), port))
}
