//! Command-line arguments

use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Context, Result};
use clap::Parser;

use ptcs_core::GossipConfig;

/// ptcs gossip node
///
/// Every line read from stdin is gossiped to the cluster; every payload
/// delivered by the cluster is written to stdout.
#[derive(Parser, Debug)]
#[command(name = "ptcs-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// IP address to bind and advertise
    pub self_ip: IpAddr,

    /// UDP port to bind
    pub self_port: u16,

    /// Seed peers, as IP PORT pairs
    #[arg(value_name = "PEER_IP PEER_PORT")]
    pub peers: Vec<String>,

    /// Configuration file (TOML, JSON or YAML); flags override its values
    #[arg(short, long, env = "PTCS_CONFIG")]
    pub config: Option<String>,

    /// Minimum spacing between retries of an unacknowledged message (ms)
    #[arg(long, env = "PTCS_RETRY_INTERVAL_MS")]
    pub retry_interval_ms: Option<u64>,

    /// Attempts before a message is dropped and its destination evicted
    #[arg(long, env = "PTCS_RETRY_ATTEMPTS")]
    pub retry_attempts: Option<u16>,

    /// Peers each payload is forwarded to
    #[arg(long, env = "PTCS_RUMOR_FACTOR")]
    pub rumor_factor: Option<usize>,

    /// Maximum encoded message size (bytes)
    #[arg(long, env = "PTCS_MAX_MESSAGE_SIZE")]
    pub max_message_size: Option<usize>,

    /// Receive buffer capacity (bytes)
    #[arg(long, env = "PTCS_MAX_OUTPUT_MESSAGES")]
    pub max_output_messages: Option<usize>,

    /// Event loop cadence (ms)
    #[arg(long, env = "PTCS_TICK_INTERVAL_MS")]
    pub tick_interval_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    pub json_logs: bool,
}

impl Args {
    /// Build and validate the node configuration.
    ///
    /// Starts from the config file when one is given, defaults otherwise,
    /// then applies the command line on top.
    pub fn to_config(&self) -> Result<GossipConfig> {
        let mut config = match &self.config {
            Some(path) => load_file(path)?,
            None => GossipConfig::default(),
        };

        config.self_endpoint = SocketAddr::new(self.self_ip, self.self_port);
        if !self.peers.is_empty() {
            config.seeds = parse_peers(&self.peers)?;
        }
        if let Some(interval) = self.retry_interval_ms {
            config.message_retry_interval_ms = interval;
        }
        if let Some(attempts) = self.retry_attempts {
            config.message_retry_attempts = attempts;
        }
        if let Some(factor) = self.rumor_factor {
            config.message_rumor_factor = factor;
        }
        if let Some(size) = self.max_message_size {
            config.message_max_size = size;
        }
        if let Some(size) = self.max_output_messages {
            config.max_output_messages = size;
        }
        if let Some(interval) = self.tick_interval_ms {
            config.gossip_tick_interval_ms = interval;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Read a `GossipConfig` from a file; the extension picks the format
fn load_file(path: &str) -> Result<GossipConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path))
        .build()
        .with_context(|| format!("Failed to load config file '{}'", path))?;

    settings.try_deserialize().context("Failed to parse config")
}

/// Turn `IP PORT IP PORT ...` into endpoints
pub fn parse_peers(tokens: &[String]) -> Result<Vec<SocketAddr>> {
    if tokens.len() % 2 != 0 {
        bail!(
            "peers must be given as IP PORT pairs, got {} values",
            tokens.len()
        );
    }

    tokens
        .chunks(2)
        .map(|pair| {
            let ip: IpAddr = pair[0]
                .parse()
                .with_context(|| format!("invalid peer address '{}'", pair[0]))?;
            let port: u16 = pair[1]
                .parse()
                .with_context(|| format!("invalid peer port '{}'", pair[1]))?;
            Ok(SocketAddr::new(ip, port))
        })
        .collect()
}
