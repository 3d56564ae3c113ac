//! Membership registry
//!
//! Owns every known peer. Everything else refers to members by
//! identifier or holds a copy taken at enqueue time.

use std::collections::BTreeMap;

use rand::Rng;

use ptcs_core::{Member, MemberId};

/// Outcome of an upsert
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// New identifier
    Inserted,
    /// Same identifier and endpoint; nothing changed
    Unchanged,
    /// Known identifier at a new endpoint
    Replaced,
}

/// Known peers, keyed by identifier
#[derive(Clone, Debug, Default)]
pub struct MemberRegistry {
    members: BTreeMap<MemberId, Member>,
}

impl MemberRegistry {
    pub fn new() -> Self {
        MemberRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: MemberId) -> bool {
        self.members.contains_key(&id)
    }

    pub fn get(&self, id: MemberId) -> Option<&Member> {
        self.members.get(&id)
    }

    /// Insert or refresh a member. Idempotent for an identical descriptor.
    pub fn upsert(&mut self, member: Member) -> Upsert {
        match self.members.insert(member.id(), member) {
            None => Upsert::Inserted,
            Some(previous) if previous.endpoint() == member.endpoint() => Upsert::Unchanged,
            Some(_) => Upsert::Replaced,
        }
    }

    pub fn remove(&mut self, id: MemberId) -> Option<Member> {
        self.members.remove(&id)
    }

    /// Snapshot of every member
    pub fn all(&self) -> Vec<Member> {
        self.members.values().copied().collect()
    }

    /// Uniform random subset of `min(k, len)` distinct members.
    ///
    /// Single-pass reservoir sampling (Algorithm R): member `i` replaces a
    /// random reservoir slot with probability `k / (i + 1)`.
    pub fn sample<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> Vec<Member> {
        let mut reservoir = Vec::with_capacity(k.min(self.members.len()));
        if k == 0 {
            return reservoir;
        }

        for (i, member) in self.members.values().enumerate() {
            if i < k {
                reservoir.push(*member);
            } else {
                let j = rng.gen_range(0..=i);
                if j < k {
                    reservoir[j] = *member;
                }
            }
        }

        reservoir
    }
}
