//! Gossip node configuration
//!
//! Built once at startup and moved into the engine; nothing mutates it
//! afterwards.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

use crate::{GossipError, GossipResult};

/// Smallest usable `message_max_size`: the fixed header plus an IPv6 member
/// descriptor, with room for a small payload.
pub const MIN_MESSAGE_SIZE: usize = 128;

/// Default UDP port when none is configured
pub const DEFAULT_PORT: u16 = 12345;

/// Gossip node configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    /// Local endpoint the transport binds to and advertises
    pub self_endpoint: SocketAddr,
    /// Seed members contacted on startup
    pub seeds: Vec<SocketAddr>,
    /// Minimum spacing between attempts for an unacknowledged entry (ms)
    pub message_retry_interval_ms: u64,
    /// Attempts before an entry is dropped and its destination evicted
    pub message_retry_attempts: u16,
    /// Fan-out for random spreading
    pub message_rumor_factor: usize,
    /// Maximum encoded message size, protocol overhead included (bytes)
    pub message_max_size: usize,
    /// Receive buffer capacity (bytes)
    pub max_output_messages: usize,
    /// Event loop cadence (ms)
    pub gossip_tick_interval_ms: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        GossipConfig {
            self_endpoint: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            seeds: Vec::new(),
            message_retry_interval_ms: 10_000,
            message_retry_attempts: 3,
            message_rumor_factor: 3,
            message_max_size: 65_535,
            max_output_messages: 65_535,
            gossip_tick_interval_ms: 500,
        }
    }
}

impl GossipConfig {
    /// Config bound to `self_endpoint` with default tunables
    pub fn new(self_endpoint: SocketAddr) -> Self {
        GossipConfig {
            self_endpoint,
            ..GossipConfig::default()
        }
    }

    #[inline]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.message_retry_interval_ms)
    }

    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.gossip_tick_interval_ms)
    }

    /// Does retry exhaustion evict the destination?
    #[inline]
    pub fn evicts_on_exhaustion(&self) -> bool {
        self.message_retry_attempts > 1
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> GossipResult<()> {
        if self.gossip_tick_interval_ms == 0 {
            return Err(GossipError::InitFailed(
                "gossip_tick_interval_ms must be positive".into(),
            ));
        }
        if self.message_retry_attempts == 0 {
            return Err(GossipError::InitFailed(
                "message_retry_attempts must be positive".into(),
            ));
        }
        if self.message_rumor_factor == 0 {
            return Err(GossipError::InitFailed(
                "message_rumor_factor must be positive".into(),
            ));
        }
        if self.message_max_size < MIN_MESSAGE_SIZE {
            return Err(GossipError::InitFailed(format!(
                "message_max_size {} is below the minimum of {}",
                self.message_max_size, MIN_MESSAGE_SIZE
            )));
        }
        if self.max_output_messages < self.message_max_size {
            return Err(GossipError::InitFailed(format!(
                "max_output_messages {} cannot hold a message of {} bytes",
                self.max_output_messages, self.message_max_size
            )));
        }
        Ok(())
    }
}
