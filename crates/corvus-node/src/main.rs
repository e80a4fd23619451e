//! Corvus Node - a Rust implementation of the Corvus blockchain node.
//!
//! This is the main entry point for the corvus-node binary.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod node;

use config::NodeConfig;
use node::Node;

/// Corvus blockchain node implementation in Rust.
#[derive(Parser, Debug)]
#[command(name = "corvus-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "corvus-node.toml")]
    config: PathBuf,

    /// Network to run on (main, test, regtest)
    #[arg(short, long, default_value = "main")]
    network: String,

    /// Enable PoW generation at startup
    #[arg(long)]
    gen: bool,

    /// Number of generation threads (-1 = hardware concurrency)
    #[arg(long)]
    genproclimit: Option<i32>,

    /// Soft cap on assembled block size in bytes
    #[arg(long)]
    blockmaxsize: Option<u64>,

    /// Minimum fee rate for block inclusion, per kB
    #[arg(long)]
    blockmintxfee: Option<i64>,

    /// Override the assembled block version (test networks only)
    #[arg(long)]
    blockversion: Option<i32>,

    /// RPC bind address
    #[arg(long)]
    rpc_bind: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Corvus Node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::load(&args.config, &args)?;
    info!("Network: {}", config.network);
    info!("RPC: {}", config.rpc.bind_address);

    let node = Node::new(config)?;

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!("Node error: {e}");
            }
        }
        _ = shutdown => {}
    }

    node.shutdown();
    info!("Corvus node stopped");
    Ok(())
}
