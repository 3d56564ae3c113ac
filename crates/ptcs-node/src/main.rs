//! # ptcs-node
//!
//! Runs one gossip node on UDP. Lines read from stdin are gossiped to the
//! cluster; payloads delivered by the cluster are printed to stdout.
//!
//! ```text
//! ptcs-node SELF_IP SELF_PORT [PEER_IP PEER_PORT]...
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ptcs_runtime::{GossipNode, NodeHandle};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    let config = args.to_config()?;
    info!("Starting ptcs-node v{}", env!("CARGO_PKG_VERSION"));

    let (mut node, handle) = GossipNode::bind(config, |payload: &[u8]| {
        println!("{}", String::from_utf8_lossy(payload));
    })
    .await
    .context("failed to start gossip node")?;

    node.join_seeds().context("failed to join seeds")?;
    info!(member = %node.member(), "Node ready");

    let gossip_loop = tokio::spawn(node.run());
    tokio::spawn(forward_stdin(handle.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");
    handle.shutdown();

    let stats = gossip_loop.await.context("gossip loop panicked")??;
    info!(
        ticks = stats.ticks,
        delivered = stats.payloads_delivered,
        evicted = stats.members_evicted,
        "ptcs-node stopped"
    );
    Ok(())
}

/// Gossip each non-empty stdin line until EOF or shutdown
async fn forward_stdin(handle: NodeHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.is_empty() => continue,
            Ok(Some(line)) => {
                if handle.send(line.into_bytes()).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("stdin read failed: {}", e);
                break;
            }
        }
    }
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("failed to install logger")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
            .context("failed to install logger")?;
    }

    Ok(())
}
