//! Error types for the ptcs gossip protocol

use thiserror::Error;

use crate::{Lifecycle, Sequence};

/// Core gossip errors
#[derive(Error, Debug)]
pub enum GossipError {
    // Lifecycle errors
    #[error("Bad state: cannot {operation} while {state:?}")]
    BadState {
        state: Lifecycle,
        operation: &'static str,
    },

    // Wire errors
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unknown message type: {0:#04x}")]
    UnknownMessageType(u8),

    #[error("Buffer too short: expected {expected}, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Message of {size} bytes exceeds maximum of {max}")]
    BufferNotEnough { size: usize, max: usize },

    // Correlation errors
    #[error("No queued entry with sequence {0}")]
    NotFound(Sequence),

    // Startup errors
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    // Transport errors
    #[error("Transport error: {0}")]
    TransportError(String),
}

impl GossipError {
    /// True for every error raised while decoding or sizing a datagram.
    /// These are dropped locally and never retried.
    pub fn is_invalid_message(&self) -> bool {
        matches!(
            self,
            GossipError::InvalidMessage(_)
                | GossipError::UnknownMessageType(_)
                | GossipError::BufferTooShort { .. }
                | GossipError::BufferNotEnough { .. }
        )
    }
}

/// Result type for gossip operations
pub type GossipResult<T> = Result<T, GossipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_message_classification() {
        assert!(GossipError::UnknownMessageType(0x7f).is_invalid_message());
        assert!(GossipError::BufferNotEnough { size: 10, max: 5 }.is_invalid_message());
        assert!(GossipError::BufferTooShort {
            expected: 8,
            actual: 2
        }
        .is_invalid_message());
        assert!(!GossipError::NotFound(Sequence(4)).is_invalid_message());
        assert!(!GossipError::BadState {
            state: Lifecycle::Connected,
            operation: "add member",
        }
        .is_invalid_message());
    }

    #[test]
    fn test_bad_state_message() {
        let err = GossipError::BadState {
            state: Lifecycle::Joining,
            operation: "add member",
        };
        assert_eq!(err.to_string(), "Bad state: cannot add member while Joining");
    }
}
