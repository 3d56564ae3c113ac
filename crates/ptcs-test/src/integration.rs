//! End-to-end scenarios over the simulated network
//!
//! Multi-node join handshakes, membership convergence, fan-out bounds and
//! failure-driven eviction.

use std::collections::HashSet;

use bytes::Bytes;

use ptcs_core::{GossipConfig, GossipError, Lifecycle, Sequence};
use ptcs_wire::MessageType;

use crate::chaos::ChaosConfig;
use crate::simulator::{Cluster, SimulatedNetwork};

fn fast_config() -> GossipConfig {
    GossipConfig {
        gossip_tick_interval_ms: 50,
        message_retry_interval_ms: 100,
        ..GossipConfig::default()
    }
}

/// Bootstrap node 0 and join every other node through it
fn converged_cluster(ports: &[u16], network: SimulatedNetwork, config: GossipConfig) -> Cluster {
    let mut cluster = Cluster::new(network, config);
    for port in ports {
        cluster.spawn(*port).unwrap();
    }

    cluster.bootstrap(0).unwrap();
    for index in 1..ports.len() {
        cluster.join(index, 0).unwrap();
    }

    let taken = cluster.run_until(200, Cluster::converged);
    assert!(taken.is_some(), "cluster did not converge");

    // Let outstanding acks land
    cluster.run(5);
    cluster
}

fn queued_of_type(cluster: &Cluster, index: usize, kind: MessageType) -> usize {
    cluster
        .node(index)
        .engine
        .disseminator()
        .entries()
        .filter(|e| e.message.message_type() == kind)
        .count()
}

#[test]
fn test_join_handshake() {
    let mut cluster = Cluster::new(SimulatedNetwork::perfect(), fast_config());
    let x = cluster.spawn(9001).unwrap();
    let y = cluster.spawn(9002).unwrap();
    cluster.bootstrap(y).unwrap();

    // X asks Y to join
    cluster.join(x, y).unwrap();
    assert_eq!(cluster.node(x).state(), Lifecycle::Joining);

    let (hello_seq, hello_dest) = {
        let entries: Vec<_> = cluster.node(x).engine.disseminator().entries().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message.message_type(), MessageType::Hello);
        (entries[0].sequence(), entries[0].destination())
    };
    assert_eq!(hello_dest.endpoint(), Cluster::addr(9002));

    // Y receives the Hello
    cluster.drain(x);
    cluster.receive(y);

    let x_id = cluster.node(x).id();
    assert!(cluster.node(y).engine.registry().contains(x_id));
    assert_eq!(queued_of_type(&cluster, y, MessageType::Welcome), 1);
    let welcome_dest = cluster
        .node(y)
        .engine
        .disseminator()
        .entries()
        .find(|e| e.message.message_type() == MessageType::Welcome)
        .map(|e| e.destination());
    assert_eq!(welcome_dest, Some(cluster.node(x).engine.me()));

    // X receives the Welcome
    cluster.drain(y);
    cluster.receive(x);

    let y_id = cluster.node(y).id();
    assert_eq!(cluster.node(x).state(), Lifecycle::Connected);
    assert!(cluster.node(x).engine.registry().contains(y_id));
    assert!(cluster.node(x).engine.disseminator().find(hello_seq).is_none());
    assert_eq!(cluster.node(x).engine.stats().entries_acknowledged, 1);
}

#[test]
fn test_send_fans_out_to_rumor_factor() {
    let config = GossipConfig {
        message_rumor_factor: 3,
        ..fast_config()
    };
    let mut cluster = converged_cluster(
        &[9101, 9102, 9103, 9104, 9105, 9106],
        SimulatedNetwork::perfect(),
        config,
    );

    let x = 1;
    assert_eq!(cluster.node(x).engine.registry().len(), 5);

    let now = cluster.now();
    let seqs = cluster
        .node_mut(x)
        .engine
        .send(Bytes::from_static(b"x"), now)
        .unwrap();
    assert_eq!(seqs.len(), 3);

    let destinations: HashSet<_> = cluster
        .node(x)
        .engine
        .disseminator()
        .entries()
        .filter(|e| seqs.contains(&e.sequence()))
        .inspect(|e| assert_eq!(e.message.message_type(), MessageType::Data))
        .map(|e| e.destination().id())
        .collect();
    assert_eq!(destinations.len(), 3);
}

#[test]
fn test_payload_reaches_peers() {
    let mut cluster = converged_cluster(
        &[9201, 9202, 9203],
        SimulatedNetwork::perfect(),
        fast_config(),
    );

    let now = cluster.now();
    cluster
        .node_mut(0)
        .engine
        .send(Bytes::from_static(b"rumor"), now)
        .unwrap();
    cluster.tick();

    for index in 1..3 {
        let delivered = cluster.node(index).delivered.lock().clone();
        assert!(!delivered.is_empty());
        assert!(delivered.iter().all(|p| p == b"rumor"));
    }
}

#[test]
fn test_hello_broadcasts_snapshot_to_every_member() {
    let mut cluster = converged_cluster(
        &[9301, 9302, 9303, 9304],
        SimulatedNetwork::perfect(),
        fast_config(),
    );
    assert!(cluster.node(0).engine.disseminator().is_empty());

    let newcomer = cluster.spawn(9305).unwrap();
    cluster.join(newcomer, 0).unwrap();
    cluster.drain(newcomer);
    cluster.receive(0);

    let registry_size = cluster.node(0).engine.registry().len();
    assert_eq!(registry_size, 4);
    assert_eq!(
        queued_of_type(&cluster, 0, MessageType::MembershipSnapshot),
        registry_size
    );
}

#[test]
fn test_add_member_after_join_changes_nothing() {
    let mut cluster = Cluster::new(SimulatedNetwork::perfect(), fast_config());
    let a = cluster.spawn(9401).unwrap();
    let b = cluster.spawn(9402).unwrap();
    let c = cluster.spawn(9403).unwrap();
    cluster.bootstrap(b).unwrap();
    cluster.join(a, b).unwrap();

    let queued: Vec<Sequence> = cluster
        .node(a)
        .engine
        .disseminator()
        .entries()
        .map(|e| e.sequence())
        .collect();

    let result = cluster.join(a, c);
    assert!(matches!(
        result,
        Err(GossipError::BadState {
            state: Lifecycle::Joining,
            ..
        })
    ));

    let after: Vec<Sequence> = cluster
        .node(a)
        .engine
        .disseminator()
        .entries()
        .map(|e| e.sequence())
        .collect();
    assert_eq!(after, queued);
    assert!(cluster.node(a).engine.registry().is_empty());
    assert_eq!(cluster.node(a).state(), Lifecycle::Joining);
}

#[test]
fn test_dead_member_evicted_once() {
    let config = GossipConfig {
        message_retry_attempts: 3,
        ..fast_config()
    };
    let mut cluster = converged_cluster(&[9501, 9502, 9503], SimulatedNetwork::perfect(), config);
    let dead = 2;
    let dead_id = cluster.node(dead).id();
    let evictions_before = cluster.node(0).engine.stats().members_evicted;
    assert_eq!(evictions_before, 0);

    cluster.crash(dead);

    // A newcomer makes node 0 broadcast a snapshot, which the dead node never acks
    let newcomer = cluster.spawn(9504).unwrap();
    cluster.join(newcomer, 0).unwrap();
    cluster.run(20);

    let survivor = &cluster.node(0).engine;
    assert!(!survivor.registry().contains(dead_id));
    assert!(survivor.registry().contains(cluster.node(1).id()));
    assert!(survivor.registry().contains(cluster.node(newcomer).id()));
    assert_eq!(survivor.stats().members_evicted, 1);
    assert_eq!(survivor.stats().entries_expired, 1);
    assert!(survivor
        .disseminator()
        .entries()
        .all(|e| e.destination().id() != dead_id));
}

#[test]
fn test_restarted_member_replaces_stale_identity() {
    let mut cluster = converged_cluster(&[9801, 9802, 9803], SimulatedNetwork::perfect(), fast_config());
    let stale_id = cluster.node(2).id();

    cluster.crash(2);
    let restarted = cluster.respawn(2).unwrap();
    cluster.join(restarted, 0).unwrap();
    cluster.run(30);

    // Snapshots addressed to the old identity go unacknowledged
    let survivor = &cluster.node(0).engine;
    assert!(!survivor.registry().contains(stale_id));
    assert!(survivor.registry().contains(cluster.node(restarted).id()));
    assert_eq!(survivor.registry().len(), 2);
    assert_eq!(survivor.stats().members_evicted, 1);
    assert!(cluster.converged());
}

#[test]
fn test_convergence_under_loss() {
    let config = GossipConfig {
        message_retry_attempts: 5,
        ..fast_config()
    };
    let cluster = converged_cluster(
        &[9601, 9602, 9603, 9604, 9605],
        SimulatedNetwork::new(ChaosConfig::lossy(0.05), 42),
        config,
    );

    assert!(cluster.converged());
    for node in cluster.nodes() {
        assert_eq!(node.engine.registry().len(), 4);
        assert_eq!(node.engine.stats().invalid_datagrams, 0);
    }
}

#[test]
fn test_shutdown_leaves_cluster_traffic_unprocessed() {
    let mut cluster = converged_cluster(&[9701, 9702], SimulatedNetwork::perfect(), fast_config());

    cluster.node_mut(1).engine.shutdown();
    assert_eq!(cluster.node(1).state(), Lifecycle::Destroyed);

    let now = cluster.now();
    cluster
        .node_mut(0)
        .engine
        .send(Bytes::from_static(b"anyone?"), now)
        .unwrap();
    cluster.run(3);

    assert_eq!(cluster.node(1).delivered_count(), 0);
    assert!(cluster.network().pending(cluster.node(1).addr()) > 0);
}
