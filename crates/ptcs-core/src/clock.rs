//! Version vector carried by `Status` messages
//!
//! Reserved for anti-entropy reconciliation. The engine encodes and decodes
//! it but no handler acts on it yet.

/// One component of a vector clock
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct VectorRecord {
    pub sequence_number: u32,
    /// Compact member key (low 64 bits of the member identifier)
    pub member_id: u64,
}

impl VectorRecord {
    pub fn new(member_id: u64, sequence_number: u32) -> Self {
        VectorRecord {
            sequence_number,
            member_id,
        }
    }
}

/// Vector clock: one record per member, `current_idx` names the local one
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct VectorClock {
    pub current_idx: u16,
    pub records: Vec<VectorRecord>,
}
