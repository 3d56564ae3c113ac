//! ptcs Transport Layer - Datagram I/O
//!
//! This crate provides:
//! - The `Transport` seam the engine sends and receives through
//! - A non-blocking UDP implementation on tokio

pub mod transport;
pub mod udp;

pub use transport::*;
pub use udp::*;
