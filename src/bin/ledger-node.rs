#![forbid(unsafe_code)]
//! Ledger node for HashLedger
//!
//! Loads configuration, applies command-line overrides and serves the relay API.

use clap::Parser;
use colored::*;
use hashledger::config::load_config;
use hashledger::logging::{init_logging, LogFormat};
use hashledger::node::Node;
use std::path::PathBuf;
use std::sync::Arc;

const LOGO: &str = r#"
 _               _     _          _
| |__   __ _ ___| |__ | | ___  __| | __ _  ___ _ __
| '_ \ / _` / __| '_ \| |/ _ \/ _` |/ _` |/ _ \ '__|
| | | | (_| \__ \ | | | |  __/ (_| | (_| |  __/ |
|_| |_|\__,_|___/_| |_|_|\___|\__,_|\__, |\___|_|
                                    |___/
"#;

/// Run a HashLedger node.
#[derive(Parser, Debug)]
#[command(name = "ledger-node", about = "HashLedger proof-of-work node", version)]
struct Cli {
    /// Path to the node configuration file (TOML).
    #[arg(long, short = 'c', env = "HASHLEDGER_CONFIG", default_value = "hashledger.toml")]
    config: PathBuf,

    /// Port for the relay API. Overrides `network.port`.
    #[arg(long, short = 'p', env = "HASHLEDGER_PORT")]
    port: Option<u16>,

    /// URL peers use to reach this node. Overrides `network.node_url`.
    #[arg(long, env = "HASHLEDGER_NODE_URL")]
    node_url: Option<String>,

    /// Bootstrap peer to join through. May be repeated.
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Log output format: "pretty" or "json". Overrides `logging.format`.
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(node_url) = cli.node_url {
        config.network.node_url = Some(node_url);
    }
    config.network.bootstrap_peers.extend(cli.peers);
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    config.validate()?;

    init_logging(&config.logging.level, LogFormat::from_str_lossy(&config.logging.format));

    println!("{}", LOGO.bright_cyan());
    println!("{} {}", "Node URL:".bold(), config.network.node_url().bright_green());
    println!(
        "{} {}",
        "Difficulty:".bold(),
        config.miner.difficulty_prefix.bright_yellow()
    );
    if !config.network.bootstrap_peers.is_empty() {
        println!(
            "{} {}",
            "Bootstrap peers:".bold(),
            config.network.bootstrap_peers.join(", ").bright_yellow()
        );
    }

    let node = Arc::new(Node::new(config)?);
    node.start().await
}
