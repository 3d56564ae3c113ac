//! Chaos links for gossip testing
//!
//! Simulates hostile datagram delivery on one directed link:
//! - Random and burst loss
//! - Reordering
//! - Duplication
//!
//! There is no latency model; a datagram that survives the link is
//! visible to the receiver on its next tick.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Link chaos configuration
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Packet loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Burst loss probability
    pub burst_loss_prob: f64,
    /// Burst loss length range
    pub burst_length: (u32, u32),
    /// Reorder probability
    pub reorder_prob: f64,
    /// Reorder depth (max datagrams jumped)
    pub reorder_depth: u32,
    /// Duplicate probability
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            loss_rate: 0.01,
            burst_loss_prob: 0.01,
            burst_length: (2, 5),
            reorder_prob: 0.05,
            reorder_depth: 3,
            duplicate_prob: 0.01,
        }
    }
}

impl ChaosConfig {
    /// Lossless, in-order delivery
    pub fn perfect() -> Self {
        ChaosConfig {
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            reorder_prob: 0.0,
            reorder_depth: 0,
            duplicate_prob: 0.0,
        }
    }

    /// Independent random loss only
    pub fn lossy(loss_rate: f64) -> Self {
        ChaosConfig {
            loss_rate,
            ..ChaosConfig::perfect()
        }
    }

    /// Hostile network conditions
    pub fn hostile() -> Self {
        ChaosConfig {
            loss_rate: 0.15,
            burst_loss_prob: 0.1,
            burst_length: (3, 8),
            reorder_prob: 0.2,
            reorder_depth: 10,
            duplicate_prob: 0.05,
        }
    }
}

/// Chaos link statistics
#[derive(Clone, Debug, Default)]
pub struct ChaosStats {
    pub datagrams_sent: u64,
    pub datagrams_delivered: u64,
    pub datagrams_lost: u64,
    pub datagrams_reordered: u64,
    pub datagrams_duplicated: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.datagrams_sent == 0 {
            0.0
        } else {
            self.datagrams_lost as f64 / self.datagrams_sent as f64
        }
    }
}

/// One directed link with its own seeded RNG
pub struct ChaosLink {
    config: ChaosConfig,
    rng: StdRng,
    /// Burst loss counter
    burst_remaining: u32,
    stats: ChaosStats,
}

impl ChaosLink {
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        ChaosLink {
            config,
            rng: StdRng::seed_from_u64(seed),
            burst_remaining: 0,
            stats: ChaosStats::default(),
        }
    }

    /// Push `item` through the link into `inbox`.
    ///
    /// It may be dropped, slipped ahead of up to `reorder_depth` queued
    /// items, or delivered twice.
    pub fn transmit<T: Clone>(&mut self, item: T, inbox: &mut VecDeque<T>) {
        self.stats.datagrams_sent += 1;

        if self.should_drop() {
            self.stats.datagrams_lost += 1;
            return;
        }

        if self.rng.gen::<f64>() < self.config.duplicate_prob {
            inbox.push_back(item.clone());
            self.stats.datagrams_duplicated += 1;
            self.stats.datagrams_delivered += 1;
        }

        if self.rng.gen::<f64>() < self.config.reorder_prob && !inbox.is_empty() {
            let depth = self.config.reorder_depth.min(inbox.len() as u32);
            let jump = self.rng.gen_range(0..=depth) as usize;
            inbox.insert(inbox.len() - jump, item);
            self.stats.datagrams_reordered += 1;
        } else {
            inbox.push_back(item);
        }
        self.stats.datagrams_delivered += 1;
    }

    /// Check if the datagram should be dropped
    fn should_drop(&mut self) -> bool {
        // Burst loss
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }

        // Start new burst?
        if self.rng.gen::<f64>() < self.config.burst_loss_prob {
            let (min, max) = self.config.burst_length;
            self.burst_remaining = self.rng.gen_range(min..=max);
            return true;
        }

        // Random loss
        self.rng.gen::<f64>() < self.config.loss_rate
    }

    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_link_delivers_in_order() {
        let mut link = ChaosLink::new(ChaosConfig::perfect(), 1);
        let mut inbox = VecDeque::new();

        for i in 0..100u32 {
            link.transmit(i, &mut inbox);
        }

        assert_eq!(inbox, (0..100).collect::<VecDeque<_>>());
        assert_eq!(link.stats().datagrams_lost, 0);
    }

    #[test]
    fn test_lossy_link_drops_roughly_its_rate() {
        let mut link = ChaosLink::new(ChaosConfig::lossy(0.2), 12345);
        let mut inbox = VecDeque::new();

        for i in 0..5_000u32 {
            link.transmit(i, &mut inbox);
        }

        let loss = link.stats().loss_rate();
        assert!(loss > 0.15 && loss < 0.25, "loss rate {}", loss);
        assert_eq!(inbox.len() as u64, link.stats().datagrams_delivered);
    }

    #[test]
    fn test_hostile_link() {
        let mut link = ChaosLink::new(ChaosConfig::hostile(), 12345);
        let mut inbox = VecDeque::new();

        for i in 0..1_000u32 {
            link.transmit(i, &mut inbox);
        }

        let stats = link.stats();
        assert!(stats.loss_rate() > 0.1);
        assert!(stats.datagrams_reordered > 0);
        assert!(stats.datagrams_duplicated > 0);
    }
}
