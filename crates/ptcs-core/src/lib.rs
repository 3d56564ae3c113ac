//! ptcs Core - Fundamental types for the gossip protocol
//!
//! This crate defines the types shared by every other layer:
//! - Identifiers (MemberId, Sequence)
//! - Member descriptors
//! - Node lifecycle
//! - Version vectors (reserved for anti-entropy)
//! - Configuration and errors

pub mod id;
pub mod member;
pub mod lifecycle;
pub mod clock;
pub mod config;
pub mod error;

pub use id::*;
pub use member::*;
pub use lifecycle::*;
pub use clock::*;
pub use config::*;
pub use error::*;
