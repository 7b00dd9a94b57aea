//! Tally daemon: entry point for running a voting node.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tally_node::{init_logging, NodeConfig, TallyNode};

#[derive(Parser)]
#[command(name = "tally-daemon", about = "Proof-of-work voting ledger node")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Interface to bind and advertise to peers.
    #[arg(long, env = "TALLY_HOST")]
    host: Option<String>,

    /// Port for P2P connections.
    #[arg(long, env = "TALLY_PORT")]
    port: Option<u16>,

    /// Data directory for ledger, peers and identity.
    #[arg(long, env = "TALLY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Leading zero hex characters required of block hashes.
    #[arg(long, env = "TALLY_DIFFICULTY")]
    difficulty: Option<usize>,

    /// Maximum number of known peers.
    #[arg(long, env = "TALLY_MAX_PEERS")]
    max_peers: Option<usize>,

    /// Bootstrap peer addresses (comma-separated: "10.0.0.1:5000,10.0.0.2:5000").
    #[arg(long, env = "TALLY_BOOTSTRAP_PEERS", value_delimiter = ',')]
    bootstrap_peers: Vec<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TALLY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "TALLY_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Print a fresh Ed25519 keypair (base64) as JSON.
    Keygen,
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT or SIGTERM.
    Run,
}

impl Cli {
    /// File config (or defaults) with every given flag applied on top.
    fn resolve_config(&self) -> anyhow::Result<NodeConfig> {
        let base = match &self.config {
            Some(path) => NodeConfig::from_toml_file(&path.to_string_lossy())
                .with_context(|| format!("loading config file {}", path.display()))?,
            None => NodeConfig::default(),
        };

        Ok(NodeConfig {
            host: self.host.clone().unwrap_or(base.host),
            port: self.port.unwrap_or(base.port),
            data_dir: self.data_dir.clone().unwrap_or(base.data_dir),
            difficulty: self.difficulty.unwrap_or(base.difficulty),
            max_peers: self.max_peers.unwrap_or(base.max_peers),
            bootstrap_peers: if self.bootstrap_peers.is_empty() {
                base.bootstrap_peers
            } else {
                self.bootstrap_peers.clone()
            },
            log_level: self.log_level.clone().unwrap_or(base.log_level),
            log_format: self.log_format.clone().unwrap_or(base.log_format),
            ..base
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Keygen => {
            let keys = tally_crypto::generate_keypair();
            println!("{}", serde_json::to_string_pretty(&keys)?);
        }
        Command::Node {
            action: NodeAction::Run,
        } => {
            let config = cli.resolve_config()?;
            init_logging(config.log_format()?, &config.log_level)?;
            if let Some(path) = &cli.config {
                tracing::info!(path = %path.display(), "loaded config file");
            }

            tracing::info!(
                host = %config.host,
                port = config.port,
                difficulty = config.difficulty,
                data_dir = %config.data_dir.display(),
                "starting tally node"
            );
            if !config.bootstrap_peers.is_empty() {
                tracing::info!("bootstrap peers: {}", config.bootstrap_peers.join(", "));
            }

            let mut node = TallyNode::new(config).await?;
            node.start().await?;

            node.shutdown.wait_for_signal().await;
            node.stop().await?;

            tracing::info!("tally daemon exited cleanly");
        }
    }

    Ok(())
}
