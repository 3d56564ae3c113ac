//! In-memory network and multi-node cluster harness
//!
//! `SimulatedNetwork` routes datagrams between `MemoryTransport`s through
//! per-link `ChaosLink`s. `Cluster` drives a set of engines over it on a
//! virtual clock, one tick at a time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;

use ptcs_core::{GossipConfig, GossipResult, Lifecycle, MemberId};
use ptcs_runtime::GossipEngine;
use ptcs_transport::Transport;

use crate::chaos::{ChaosConfig, ChaosLink, ChaosStats};

/// Datagram waiting in an inbox
#[derive(Clone, Debug)]
pub struct Datagram {
    pub data: Vec<u8>,
    pub source: SocketAddr,
}

struct NetworkState {
    inboxes: HashMap<SocketAddr, VecDeque<Datagram>>,
    /// Links keyed by (from, to), created on first use
    links: HashMap<(SocketAddr, SocketAddr), ChaosLink>,
    /// Endpoints that neither send nor receive
    down: HashSet<SocketAddr>,
    default_config: ChaosConfig,
    seed_counter: u64,
}

impl NetworkState {
    fn link(&mut self, from: SocketAddr, to: SocketAddr) -> &mut ChaosLink {
        let seed = self.seed_counter;
        let config = &self.default_config;
        let link = self
            .links
            .entry((from, to))
            .or_insert_with(|| ChaosLink::new(config.clone(), seed));
        self.seed_counter += 1;
        link
    }
}

/// Shared in-memory datagram network
#[derive(Clone)]
pub struct SimulatedNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl SimulatedNetwork {
    /// Create a network whose links default to `config`
    pub fn new(default_config: ChaosConfig, seed: u64) -> Self {
        SimulatedNetwork {
            state: Arc::new(Mutex::new(NetworkState {
                inboxes: HashMap::new(),
                links: HashMap::new(),
                down: HashSet::new(),
                default_config,
                seed_counter: seed,
            })),
        }
    }

    /// Create with lossless links
    pub fn perfect() -> Self {
        Self::new(ChaosConfig::perfect(), 0)
    }

    /// Attach an endpoint and return its transport
    pub fn attach(&self, addr: SocketAddr) -> MemoryTransport {
        self.state.lock().inboxes.entry(addr).or_default();
        MemoryTransport {
            addr,
            network: self.clone(),
        }
    }

    /// Set custom config for a specific link
    pub fn set_link_config(&self, from: SocketAddr, to: SocketAddr, config: ChaosConfig) {
        let mut state = self.state.lock();
        let seed = state.seed_counter;
        state.seed_counter += 1;
        state.links.insert((from, to), ChaosLink::new(config, seed));
    }

    /// Take an endpoint off the network, or bring it back
    pub fn set_down(&self, addr: SocketAddr, down: bool) {
        let mut state = self.state.lock();
        if down {
            state.down.insert(addr);
            if let Some(inbox) = state.inboxes.get_mut(&addr) {
                inbox.clear();
            }
        } else {
            state.down.remove(&addr);
        }
    }

    /// Datagrams waiting for `addr`
    pub fn pending(&self, addr: SocketAddr) -> usize {
        self.state
            .lock()
            .inboxes
            .get(&addr)
            .map_or(0, VecDeque::len)
    }

    /// Get statistics for a link
    pub fn link_stats(&self, from: SocketAddr, to: SocketAddr) -> Option<ChaosStats> {
        self.state
            .lock()
            .links
            .get(&(from, to))
            .map(|l| l.stats().clone())
    }

    fn route(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        let mut state = self.state.lock();
        if state.down.contains(&from) || state.down.contains(&to) {
            return;
        }
        // Unattached endpoint: the datagram goes nowhere, as with UDP
        if !state.inboxes.contains_key(&to) {
            return;
        }

        let datagram = Datagram {
            data: data.to_vec(),
            source: from,
        };

        let mut inbox = state.inboxes.remove(&to).unwrap_or_default();
        state.link(from, to).transmit(datagram, &mut inbox);
        state.inboxes.insert(to, inbox);
    }

    fn pop(&self, addr: SocketAddr) -> Option<Datagram> {
        let mut state = self.state.lock();
        if state.down.contains(&addr) {
            return None;
        }
        state.inboxes.get_mut(&addr)?.pop_front()
    }
}

/// `Transport` backed by a `SimulatedNetwork` inbox
pub struct MemoryTransport {
    addr: SocketAddr,
    network: SimulatedNetwork,
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    fn try_send_to(&self, datagram: &[u8], dest: SocketAddr) -> GossipResult<()> {
        self.network.route(self.addr, dest, datagram);
        Ok(())
    }

    fn try_recv_from(&self, buf: &mut [u8]) -> GossipResult<Option<(usize, SocketAddr)>> {
        let Some(datagram) = self.network.pop(self.addr) else {
            return Ok(None);
        };

        // Oversized datagrams are truncated, as a UDP socket would
        let len = datagram.data.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram.data[..len]);
        Ok(Some((len, datagram.source)))
    }
}

/// One engine attached to the simulated network
pub struct SimNode {
    pub engine: GossipEngine,
    pub transport: MemoryTransport,
    /// Payloads handed to the application callback
    pub delivered: Arc<Mutex<Vec<Vec<u8>>>>,
    pub crashed: bool,
}

impl SimNode {
    pub fn addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn id(&self) -> MemberId {
        self.engine.me().id()
    }

    pub fn state(&self) -> Lifecycle {
        self.engine.state()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().len()
    }
}

/// Multi-node harness on a virtual clock
pub struct Cluster {
    network: SimulatedNetwork,
    template: GossipConfig,
    nodes: Vec<SimNode>,
    now: Instant,
}

impl Cluster {
    /// Nodes spawned later share every setting of `template` but the endpoint
    pub fn new(network: SimulatedNetwork, template: GossipConfig) -> Self {
        Cluster {
            network,
            template,
            nodes: Vec::new(),
            now: Instant::now(),
        }
    }

    /// Loopback address for `port`
    pub fn addr(port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    /// Start a node on `port`, returning its index
    pub fn spawn(&mut self, port: u16) -> GossipResult<usize> {
        let addr = Self::addr(port);
        let config = GossipConfig {
            self_endpoint: addr,
            ..self.template.clone()
        };

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        let engine = GossipEngine::with_rng(
            config,
            addr,
            Box::new(move |payload: &[u8]| sink.lock().push(payload.to_vec())),
            StdRng::seed_from_u64(port as u64),
        )?;

        self.nodes.push(SimNode {
            engine,
            transport: self.network.attach(addr),
            delivered,
            crashed: false,
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    pub fn node(&self, index: usize) -> &SimNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut SimNode {
        &mut self.nodes[index]
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    /// Current virtual time
    pub fn now(&self) -> Instant {
        self.now
    }

    /// Bootstrap node `index` as the first member of a new cluster
    pub fn bootstrap(&mut self, index: usize) -> GossipResult<()> {
        let now = self.now;
        self.nodes[index].engine.add_members(&[], now)
    }

    /// Node `index` starts joining through node `seed`
    pub fn join(&mut self, index: usize, seed: usize) -> GossipResult<()> {
        let now = self.now;
        let seed_addr = self.nodes[seed].addr();
        self.nodes[index].engine.add_member(seed_addr, now)
    }

    /// Handle pending datagrams on one node without draining its queue
    pub fn receive(&mut self, index: usize) {
        let now = self.now;
        let node = &mut self.nodes[index];
        node.engine.receive(&node.transport, now);
    }

    /// Drain one node's queue without receiving
    pub fn drain(&mut self, index: usize) {
        let now = self.now;
        let node = &mut self.nodes[index];
        node.engine.drain(&node.transport, now);
    }

    /// Take a node off the network and stop ticking it
    pub fn crash(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        node.crashed = true;
        self.network.set_down(node.addr(), true);
    }

    /// Bring a crashed node's endpoint back with a fresh engine and identity.
    /// Returns the new node's index; the old one stays crashed.
    pub fn respawn(&mut self, index: usize) -> GossipResult<usize> {
        let addr = self.nodes[index].addr();
        self.network.set_down(addr, false);
        self.spawn(addr.port())
    }

    /// Advance the clock one tick interval and tick every live node
    pub fn tick(&mut self) {
        self.now += self.template.tick_interval();

        let now = self.now;
        for node in self.nodes.iter_mut().filter(|n| !n.crashed) {
            node.engine.tick(&node.transport, now);
        }
    }

    pub fn run(&mut self, ticks: usize) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Tick until `done` holds, giving up after `max_ticks`.
    /// Returns the number of ticks taken.
    pub fn run_until(&mut self, max_ticks: usize, done: impl Fn(&Cluster) -> bool) -> Option<usize> {
        for taken in 0..=max_ticks {
            if done(self) {
                return Some(taken);
            }
            self.tick();
        }
        None
    }

    /// Does every live node know every other live node?
    pub fn converged(&self) -> bool {
        let live: Vec<&SimNode> = self.nodes.iter().filter(|n| !n.crashed).collect();
        live.iter().all(|node| {
            node.state() == Lifecycle::Connected
                && live
                    .iter()
                    .filter(|other| other.id() != node.id())
                    .all(|other| node.engine.registry().contains(other.id()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_roundtrip() {
        let network = SimulatedNetwork::perfect();
        let a = network.attach(Cluster::addr(1));
        let b = network.attach(Cluster::addr(2));

        a.try_send_to(b"one", b.local_addr()).unwrap();
        a.try_send_to(b"two", b.local_addr()).unwrap();
        assert_eq!(network.pending(b.local_addr()), 2);

        let mut buf = [0u8; 16];
        assert_eq!(b.try_recv_from(&mut buf).unwrap(), Some((3, a.local_addr())));
        assert_eq!(&buf[..3], b"one");
        assert_eq!(b.try_recv_from(&mut buf).unwrap(), Some((3, a.local_addr())));
        assert_eq!(&buf[..3], b"two");
        assert_eq!(b.try_recv_from(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_down_endpoint_is_unreachable() {
        let network = SimulatedNetwork::perfect();
        let a = network.attach(Cluster::addr(1));
        let b = network.attach(Cluster::addr(2));

        network.set_down(b.local_addr(), true);
        a.try_send_to(b"lost", b.local_addr()).unwrap();
        assert_eq!(network.pending(b.local_addr()), 0);

        network.set_down(b.local_addr(), false);
        a.try_send_to(b"found", b.local_addr()).unwrap();
        assert_eq!(network.pending(b.local_addr()), 1);
    }

    #[test]
    fn test_unattached_destination_drops() {
        let network = SimulatedNetwork::perfect();
        let a = network.attach(Cluster::addr(1));

        a.try_send_to(b"void", Cluster::addr(99)).unwrap();
        assert!(network.link_stats(a.local_addr(), Cluster::addr(99)).is_none());
    }

    #[test]
    fn test_lossy_link_config() {
        let network = SimulatedNetwork::perfect();
        let a = network.attach(Cluster::addr(1));
        let b = network.attach(Cluster::addr(2));
        network.set_link_config(a.local_addr(), b.local_addr(), ChaosConfig::lossy(1.0));

        for _ in 0..10 {
            a.try_send_to(b"x", b.local_addr()).unwrap();
        }

        let stats = network.link_stats(a.local_addr(), b.local_addr()).unwrap();
        assert_eq!(stats.datagrams_lost, 10);
        assert_eq!(network.pending(b.local_addr()), 0);
    }

    #[test]
    fn test_respawn_gets_new_identity() {
        let mut cluster = Cluster::new(SimulatedNetwork::perfect(), GossipConfig::default());
        let a = cluster.spawn(7101).unwrap();
        cluster.crash(a);

        let b = cluster.respawn(a).unwrap();
        assert_eq!(cluster.node(b).addr(), cluster.node(a).addr());
        assert_ne!(cluster.node(b).id(), cluster.node(a).id());
        assert!(!cluster.node(b).crashed);
    }

    #[test]
    fn test_cluster_spawn_and_bootstrap() {
        let mut cluster = Cluster::new(SimulatedNetwork::perfect(), GossipConfig::default());
        let a = cluster.spawn(7001).unwrap();
        let b = cluster.spawn(7002).unwrap();

        assert_eq!(cluster.node(a).addr(), Cluster::addr(7001));
        assert_ne!(cluster.node(a).id(), cluster.node(b).id());

        cluster.bootstrap(a).unwrap();
        assert_eq!(cluster.node(a).state(), Lifecycle::Connected);
        assert_eq!(cluster.node(b).state(), Lifecycle::Initialized);
    }
}
