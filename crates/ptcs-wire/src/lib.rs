//! ptcs Wire Protocol - Binary message format
//!
//! This crate implements the wire format for gossip messages:
//! - Protocol magic and message type
//! - Fixed header (attempts, sequence, destination)
//! - Per-variant body
//!
//! One message is carried per datagram.

pub mod header;
pub mod message;

pub use header::*;
pub use message::*;
