//! Gossip protocol engine
//!
//! Lifecycle state machine plus one handler per message variant. The
//! engine is synchronous and owns all protocol state; the caller drives it
//! with `tick` and feeds it wall-clock instants, which keeps it testable
//! without sockets or sleeps.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;

use ptcs_core::{GossipConfig, GossipError, GossipResult, Lifecycle, Member, Sequence, VectorClock};
use ptcs_transport::Transport;
use ptcs_wire::{Body, Header, Message, MessageType};

use crate::{DrainReport, Disseminator, MemberRegistry, Spreading, Upsert};

/// Application callback for delivered `Data` payloads
pub type DeliverFn = Box<dyn FnMut(&[u8]) + Send>;

#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    pub ticks: u64,
    pub datagrams_in: u64,
    pub invalid_datagrams: u64,
    pub entries_sent: u64,
    pub entries_acknowledged: u64,
    pub entries_expired: u64,
    pub members_evicted: u64,
    pub payloads_delivered: u64,
}

/// Gossip engine - the per-node protocol state
pub struct GossipEngine {
    config: GossipConfig,
    /// This node as advertised to peers
    me: Member,
    state: Lifecycle,
    registry: MemberRegistry,
    disseminator: Disseminator,
    rng: StdRng,
    deliver: DeliverFn,
    recv_buf: Vec<u8>,
    stats: EngineStats,
}

impl GossipEngine {
    /// Create an engine advertising `local_addr`
    pub fn new(config: GossipConfig, local_addr: SocketAddr, deliver: DeliverFn) -> GossipResult<Self> {
        Self::with_rng(config, local_addr, deliver, StdRng::from_entropy())
    }

    /// Create an engine with a caller-supplied RNG (deterministic sampling)
    pub fn with_rng(
        config: GossipConfig,
        local_addr: SocketAddr,
        deliver: DeliverFn,
        rng: StdRng,
    ) -> GossipResult<Self> {
        config.validate()?;

        let mut recv_buf = Vec::new();
        recv_buf
            .try_reserve_exact(config.max_output_messages)
            .map_err(|e| GossipError::AllocationFailed(format!("receive buffer: {}", e)))?;
        recv_buf.resize(config.max_output_messages, 0);

        let me = Member::new(local_addr);
        tracing::info!(member = %me.id(), endpoint = %local_addr, "Gossip engine initialized");

        Ok(GossipEngine {
            disseminator: Disseminator::new(&config),
            config,
            me,
            state: Lifecycle::Initialized,
            registry: MemberRegistry::new(),
            rng,
            deliver,
            recv_buf,
            stats: EngineStats::default(),
        })
    }

    pub fn me(&self) -> Member {
        self.me
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    pub fn registry(&self) -> &MemberRegistry {
        &self.registry
    }

    pub fn disseminator(&self) -> &Disseminator {
        &self.disseminator
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Join through a single seed
    pub fn add_member(&mut self, seed: SocketAddr, now: Instant) -> GossipResult<()> {
        self.add_members(&[seed], now)
    }

    /// Join through `seeds`: one Hello per seed, then JOINING.
    ///
    /// With no seeds this node starts a new cluster and is CONNECTED at
    /// once. Only valid in INITIALIZED.
    pub fn add_members(&mut self, seeds: &[SocketAddr], now: Instant) -> GossipResult<()> {
        if self.state != Lifecycle::Initialized {
            return Err(GossipError::BadState {
                state: self.state,
                operation: "add members",
            });
        }

        if seeds.is_empty() {
            self.transition(Lifecycle::Connected);
            return Ok(());
        }

        for seed in seeds {
            self.disseminator.enqueue(
                Body::Hello { sender: self.me },
                Spreading::Direct(Member::unidentified(*seed)),
                &self.registry,
                &mut self.rng,
                now,
            )?;
            tracing::debug!(peer = %seed, "Hello queued");
        }

        self.transition(Lifecycle::Joining);
        Ok(())
    }

    /// Gossip an application payload to a random subset of peers
    pub fn send(&mut self, payload: Bytes, now: Instant) -> GossipResult<Vec<Sequence>> {
        if !self.state.accepts_traffic() {
            return Err(GossipError::BadState {
                state: self.state,
                operation: "send",
            });
        }

        self.disseminator.enqueue(
            Body::Data { payload },
            Spreading::Random,
            &self.registry,
            &mut self.rng,
            now,
        )
    }

    /// Walk the teardown path down to DESTROYED
    pub fn shutdown(&mut self) {
        while let Some(next) = self.state.teardown_step() {
            self.transition(next);
        }
    }

    /// One loop iteration: receive everything pending, then drain the queue
    pub fn tick<T: Transport + ?Sized>(&mut self, transport: &T, now: Instant) {
        self.stats.ticks += 1;
        if !self.state.accepts_traffic() {
            return;
        }

        self.receive(transport, now);
        self.drain(transport, now);
    }

    /// Handle every datagram the transport has pending
    pub fn receive<T: Transport + ?Sized>(&mut self, transport: &T, now: Instant) {
        let mut buf = std::mem::take(&mut self.recv_buf);

        while self.state.accepts_traffic() {
            let (len, source) = match transport.try_recv_from(&mut buf) {
                Ok(Some(received)) => received,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Receive failed: {}", e);
                    break;
                }
            };

            if let Err(e) = self.handle_datagram(&buf[..len], source, now) {
                if e.is_invalid_message() {
                    self.stats.invalid_datagrams += 1;
                }
                tracing::warn!(peer = %source, bytes = len, "Dropped datagram: {}", e);
            }
        }

        self.recv_buf = buf;
    }

    /// Run one disseminator pass
    pub fn drain<T: Transport + ?Sized>(&mut self, transport: &T, now: Instant) -> DrainReport {
        if !self.state.accepts_traffic() {
            return DrainReport::default();
        }

        let report = self.disseminator.drain_tick(now, &mut self.registry, transport);
        self.stats.entries_sent += report.sent;
        self.stats.entries_expired += report.expired;
        self.stats.members_evicted += report.evicted.len() as u64;
        report
    }

    /// Decode one datagram and run its handler.
    ///
    /// Errors mean the datagram was dropped before any handler ran;
    /// membership and the queue are untouched. Only the receive counters
    /// may have moved.
    pub fn handle_datagram(
        &mut self,
        datagram: &[u8],
        source: SocketAddr,
        now: Instant,
    ) -> GossipResult<()> {
        if !self.state.accepts_traffic() {
            return Err(GossipError::BadState {
                state: self.state,
                operation: "receive",
            });
        }

        self.stats.datagrams_in += 1;
        if datagram.len() > self.config.message_max_size {
            return Err(GossipError::BufferNotEnough {
                size: datagram.len(),
                max: self.config.message_max_size,
            });
        }

        let Message { header, body } = Message::decode(datagram)?;

        // Nil is a seed or an unidentified sender; anything else must be us
        let addressee = header.destination.id();
        if addressee != self.me.id() && !addressee.is_unknown() {
            return Err(GossipError::InvalidMessage(format!(
                "addressed to member {}",
                addressee
            )));
        }

        tracing::trace!(
            peer = %source,
            seq = %header.sequence,
            kind = ?body.message_type(),
            "received"
        );

        match body {
            Body::Hello { sender } => self.on_hello(&header, sender, source, now),
            Body::Welcome {
                sender,
                hello_sequence,
            } => self.on_welcome(sender, hello_sequence, source),
            Body::MembershipSnapshot { members } => {
                self.on_snapshot(&header, members, source, now)
            }
            Body::Ack { sequence } => self.on_ack(sequence),
            Body::Data { payload } => self.on_data(payload, now),
            Body::Status { clock } => self.on_status(&clock, source),
        }

        Ok(())
    }

    fn on_hello(&mut self, header: &Header, sender: Member, source: SocketAddr, now: Instant) {
        let sender = sender.reachable_via(source);
        if !self.is_peer(sender) {
            tracing::debug!(peer = %source, "Ignoring Hello without a usable sender");
            return;
        }

        self.queue(
            Body::Welcome {
                sender: self.me,
                hello_sequence: header.sequence,
            },
            Spreading::Direct(sender),
            now,
        );
        self.learn(sender);

        let snapshot = self.membership_snapshot();
        self.queue(snapshot, Spreading::Broadcast, now);
    }

    fn on_welcome(&mut self, sender: Member, hello_sequence: Sequence, source: SocketAddr) {
        let sender = sender.reachable_via(source);
        if self.is_peer(sender) {
            self.learn(sender);
        }

        if self.correlate(hello_sequence, MessageType::Hello) && self.state == Lifecycle::Joining {
            self.transition(Lifecycle::Connected);
        }
    }

    fn on_snapshot(&mut self, header: &Header, members: Vec<Member>, source: SocketAddr, now: Instant) {
        // The sender lists itself; that descriptor addresses the Ack
        let mut sender = Member::unidentified(source);
        for member in members {
            let member = member.reachable_via(source);
            if member.endpoint() == source && !member.id().is_unknown() {
                sender = member;
            }
            if !self.is_peer(member) {
                continue;
            }
            self.learn(member);
        }

        self.queue(
            Body::Ack {
                sequence: header.sequence,
            },
            Spreading::Direct(sender),
            now,
        );
    }

    fn on_ack(&mut self, sequence: Sequence) {
        self.correlate(sequence, MessageType::MembershipSnapshot);
    }

    fn on_data(&mut self, payload: Bytes, now: Instant) {
        self.queue(
            Body::Data {
                payload: payload.clone(),
            },
            Spreading::Random,
            now,
        );

        self.stats.payloads_delivered += 1;
        (self.deliver)(&payload[..]);
    }

    fn on_status(&mut self, clock: &VectorClock, source: SocketAddr) {
        tracing::debug!(
            peer = %source,
            records = clock.records.len(),
            "Status received; anti-entropy not enabled"
        );
    }

    /// Membership as this node sees it, itself included
    fn membership_snapshot(&self) -> Body {
        let mut members = self.registry.all();
        members.push(self.me);
        Body::MembershipSnapshot { members }
    }

    /// Remove the queued `expected` entry `sequence` correlates to
    fn correlate(&mut self, sequence: Sequence, expected: MessageType) -> bool {
        let queued = self
            .disseminator
            .find(sequence)
            .map(|e| e.message.message_type());
        if queued.is_some_and(|kind| kind != expected) {
            tracing::debug!(seq = %sequence, ?expected, ?queued, "Ignoring mismatched correlation");
            return false;
        }

        match self.disseminator.acknowledge(sequence) {
            Ok(entry) => {
                self.stats.entries_acknowledged += 1;
                tracing::debug!(seq = %sequence, peer = %entry.destination(), "Acknowledged");
                true
            }
            Err(e) => {
                tracing::debug!(seq = %sequence, "Ignoring correlation: {}", e);
                false
            }
        }
    }

    /// A descriptor worth storing: identified, not us, not at our endpoint
    fn is_peer(&self, member: Member) -> bool {
        !member.id().is_unknown()
            && member.id() != self.me.id()
            && member.endpoint() != self.me.endpoint()
    }

    fn learn(&mut self, member: Member) {
        match self.registry.upsert(member) {
            Upsert::Inserted => {
                tracing::info!(member = %member.id(), peer = %member.endpoint(), "Member joined")
            }
            Upsert::Replaced => {
                tracing::info!(member = %member.id(), peer = %member.endpoint(), "Member moved")
            }
            Upsert::Unchanged => {}
        }
    }

    /// Enqueue a handler follow-up. Failures only lose the follow-up.
    fn queue(&mut self, body: Body, spreading: Spreading, now: Instant) {
        let kind = body.message_type();
        if let Err(e) =
            self.disseminator
                .enqueue(body, spreading, &self.registry, &mut self.rng, now)
        {
            tracing::warn!(?kind, "Could not queue follow-up: {}", e);
        }
    }

    fn transition(&mut self, next: Lifecycle) {
        tracing::info!(from = ?self.state, to = ?next, "Lifecycle transition");
        self.state = next;
    }
}
