//! ptcs Runtime - Gossip engine and event loop
//!
//! Each tick of the loop:
//! 1. Apply commands submitted through `NodeHandle`
//! 2. Receive every pending datagram and run its handler
//! 3. Drain the outbound queue against the transport
//! 4. Sleep for the tick interval

pub mod registry;
pub mod disseminator;
pub mod engine;
pub mod node;

pub use registry::*;
pub use disseminator::*;
pub use engine::*;
pub use node::*;
