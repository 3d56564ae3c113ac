//! ptcs Test Harness - Simulated networks and cluster scenarios
//!
//! This crate provides:
//! - Lossy, reordering, duplicating datagram links
//! - An in-memory `Transport` network
//! - A multi-node cluster driven on a virtual clock
//! - End-to-end membership and dissemination scenarios

pub mod chaos;
pub mod simulator;

#[cfg(test)]
mod integration;

pub use chaos::*;
pub use simulator::*;
