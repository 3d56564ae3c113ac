//! Identity types for the ptcs gossip protocol
//!
//! Members are named by a 128-bit random identifier assigned once when the
//! member is created. Messages are correlated by a 32-bit sequence number
//! that is unique per sending node for the lifetime of the process.

use std::fmt;

use uuid::Uuid;

/// Member identity - random 128-bit identifier, never reused
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MemberId(pub Uuid);

impl MemberId {
    /// Placeholder for a peer known only by its endpoint (e.g. a seed
    /// that has not answered yet).
    pub const UNKNOWN: MemberId = MemberId(Uuid::nil());

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        MemberId(Uuid::new_v4())
    }

    #[inline]
    pub fn is_unknown(self) -> bool {
        self.0.is_nil()
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 16] {
        *self.0.as_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        MemberId(Uuid::from_bytes(bytes))
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Member({})", self.0.simple())
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message sequence number, used to correlate requests with replies
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Sequence(pub u32);

impl Sequence {
    pub const ZERO: Sequence = Sequence(0);

    #[inline]
    pub fn new(seq: u32) -> Self {
        Sequence(seq)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Sequence(u32::from_le_bytes(bytes))
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic per-node sequence allocator.
///
/// Starts at 1 so that `Sequence::ZERO` never names a real message.
#[derive(Debug)]
pub struct SequenceCounter {
    next: u32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        SequenceCounter { next: 1 }
    }

    /// Allocate the next sequence number
    pub fn next_sequence(&mut self) -> Sequence {
        let seq = Sequence(self.next);
        // u32 wrap would take years at any realistic message rate
        self.next = self.next.wrapping_add(1).max(1);
        seq
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
