//! Outbound queue
//!
//! Turns "send this to some peers" into one queued entry per destination
//! and drains the queue against the transport once per tick.
//!
//! Entries that expect a reply (Hello, MembershipSnapshot) stay queued
//! after each send until acknowledged or out of attempts. Everything else
//! is sent once and forgotten.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::Rng;

use ptcs_core::{GossipConfig, GossipError, GossipResult, Member, Sequence, SequenceCounter};
use ptcs_transport::Transport;
use ptcs_wire::{Body, Header, Message};

use crate::MemberRegistry;

/// How an enqueued message picks its destinations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Spreading {
    /// Exactly one explicit target
    Direct(Member),
    /// `message_rumor_factor` members sampled from the registry
    Random,
    /// Every member currently in the registry
    Broadcast,
}

/// A message waiting for its next send attempt
#[derive(Clone, Debug)]
pub struct QueuedEntry {
    pub message: Message,
    /// Earliest instant the entry may be sent again
    pub next_attempt: Instant,
}

impl QueuedEntry {
    #[inline]
    pub fn sequence(&self) -> Sequence {
        self.message.header.sequence
    }

    #[inline]
    pub fn destination(&self) -> Member {
        self.message.header.destination
    }

    #[inline]
    pub fn remaining_attempts(&self) -> u16 {
        self.message.header.remaining_attempts
    }
}

/// What one drain pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Datagrams handed to the transport
    pub sent: u64,
    /// Sends the transport refused
    pub failed: u64,
    /// Entries dropped with their attempts spent
    pub expired: u64,
    /// Destinations removed from the registry
    pub evicted: Vec<Member>,
}

/// Outbound dissemination queue
#[derive(Debug)]
pub struct Disseminator {
    queue: VecDeque<QueuedEntry>,
    sequences: SequenceCounter,
    retry_attempts: u16,
    retry_interval: Duration,
    rumor_factor: usize,
    max_size: usize,
    evict_on_exhaustion: bool,
}

impl Disseminator {
    pub fn new(config: &GossipConfig) -> Self {
        Disseminator {
            queue: VecDeque::new(),
            sequences: SequenceCounter::new(),
            retry_attempts: config.message_retry_attempts,
            retry_interval: config.retry_interval(),
            rumor_factor: config.message_rumor_factor,
            max_size: config.message_max_size,
            evict_on_exhaustion: config.evicts_on_exhaustion(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued entries in drain order
    pub fn entries(&self) -> impl Iterator<Item = &QueuedEntry> {
        self.queue.iter()
    }

    pub fn find(&self, sequence: Sequence) -> Option<&QueuedEntry> {
        self.queue.iter().find(|e| e.sequence() == sequence)
    }

    /// Queue `body` for every destination `spreading` resolves to.
    ///
    /// Each destination gets its own entry and sequence number. Nothing is
    /// queued if any copy would exceed the maximum message size.
    pub fn enqueue<R: Rng + ?Sized>(
        &mut self,
        body: Body,
        spreading: Spreading,
        registry: &MemberRegistry,
        rng: &mut R,
        now: Instant,
    ) -> GossipResult<Vec<Sequence>> {
        let destinations = match spreading {
            Spreading::Direct(target) => vec![target],
            Spreading::Random => registry.sample(self.rumor_factor, rng),
            Spreading::Broadcast => registry.all(),
        };

        let mut entries = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let mut header = Header::new(Sequence::ZERO, destination);
            header.remaining_attempts = self.retry_attempts;
            let message = Message {
                header,
                body: body.clone(),
            };

            let size = message.encoded_len();
            if size > self.max_size {
                return Err(GossipError::BufferNotEnough {
                    size,
                    max: self.max_size,
                });
            }
            entries.push(message);
        }

        let mut sequences = Vec::with_capacity(entries.len());
        for mut message in entries {
            message.header.sequence = self.sequences.next_sequence();
            sequences.push(message.header.sequence);

            tracing::trace!(
                seq = %message.header.sequence,
                kind = ?message.message_type(),
                peer = %message.header.destination,
                "queued"
            );
            self.queue.push_back(QueuedEntry {
                message,
                next_attempt: now,
            });
        }

        Ok(sequences)
    }

    /// Remove the entry a Welcome or Ack correlates to
    pub fn acknowledge(&mut self, sequence: Sequence) -> GossipResult<QueuedEntry> {
        let position = self
            .queue
            .iter()
            .position(|e| e.sequence() == sequence)
            .ok_or(GossipError::NotFound(sequence))?;

        self.queue
            .remove(position)
            .ok_or(GossipError::NotFound(sequence))
    }

    /// One FIFO pass over the queue.
    ///
    /// Entries not yet due are kept. A due entry with no attempts left is
    /// dropped, evicting its destination when configured to. Any other due
    /// entry is sent and spends one attempt.
    pub fn drain_tick<T: Transport + ?Sized>(
        &mut self,
        now: Instant,
        registry: &mut MemberRegistry,
        transport: &T,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        let mut kept = VecDeque::with_capacity(self.queue.len());

        while let Some(mut entry) = self.queue.pop_front() {
            if entry.next_attempt > now {
                kept.push_back(entry);
                continue;
            }

            if entry.remaining_attempts() == 0 {
                self.expire(entry, registry, &mut report);
                continue;
            }

            let destination = entry.destination();
            match entry.message.encode(self.max_size) {
                Ok(datagram) => match transport.try_send_to(&datagram, destination.endpoint()) {
                    Ok(()) => {
                        report.sent += 1;
                        tracing::trace!(
                            seq = %entry.sequence(),
                            peer = %destination,
                            bytes = datagram.len(),
                            "sent"
                        );
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(seq = %entry.sequence(), peer = %destination, "Send failed: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!(seq = %entry.sequence(), "Dropping unencodable entry: {}", e);
                    continue;
                }
            }

            entry.message.header.remaining_attempts -= 1;
            if entry.message.body.expects_reply() {
                entry.next_attempt = now + self.retry_interval;
                kept.push_back(entry);
            }
        }

        self.queue = kept;
        report
    }

    fn expire(&self, entry: QueuedEntry, registry: &mut MemberRegistry, report: &mut DrainReport) {
        report.expired += 1;
        let destination = entry.destination();
        tracing::debug!(
            seq = %entry.sequence(),
            kind = ?entry.message.message_type(),
            peer = %destination,
            "Entry expired unacknowledged"
        );

        if !self.evict_on_exhaustion {
            return;
        }
        if let Some(evicted) = registry.remove(destination.id()) {
            tracing::info!(member = %evicted.id(), peer = %evicted.endpoint(), "Evicted unresponsive member");
            report.evicted.push(evicted);
        }
    }
}
