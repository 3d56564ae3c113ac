//! Gossip node - async event loop around the engine
//!
//! The engine is only touched from `GossipNode::run`. Other tasks reach it
//! through a `NodeHandle`, whose commands are drained at the start of each
//! tick.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use ptcs_core::{GossipConfig, GossipError, GossipResult, Lifecycle, Member};
use ptcs_transport::{Transport, UdpTransport};

use crate::{EngineStats, GossipEngine};

/// Work submitted from outside the loop
#[derive(Debug)]
enum Command {
    AddMembers {
        seeds: Vec<SocketAddr>,
        reply: oneshot::Sender<GossipResult<()>>,
    },
    Send(Bytes),
    Shutdown,
}

/// Cloneable ingress into a running node
#[derive(Clone, Debug)]
pub struct NodeHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl NodeHandle {
    /// Start joining through `seed`
    pub async fn add_member(&self, seed: SocketAddr) -> GossipResult<()> {
        self.add_members(vec![seed]).await
    }

    /// Start joining through `seeds`; an empty list bootstraps a new cluster
    pub async fn add_members(&self, seeds: Vec<SocketAddr>) -> GossipResult<()> {
        let (reply, response) = oneshot::channel();
        self.submit(Command::AddMembers { seeds, reply }, "add members")?;
        response.await.map_err(|_| stopped("add members"))?
    }

    /// Gossip `payload` to a random subset of peers
    pub fn send(&self, payload: impl Into<Bytes>) -> GossipResult<()> {
        self.submit(Command::Send(payload.into()), "send")
    }

    /// Ask the loop to tear down and exit
    pub fn shutdown(&self) {
        // A stopped loop is already shut down
        let _ = self.commands.send(Command::Shutdown);
    }

    fn submit(&self, command: Command, operation: &'static str) -> GossipResult<()> {
        self.commands.send(command).map_err(|_| stopped(operation))
    }
}

fn stopped(operation: &'static str) -> GossipError {
    GossipError::BadState {
        state: Lifecycle::Destroyed,
        operation,
    }
}

/// A gossip node bound to a UDP socket
pub struct GossipNode {
    engine: GossipEngine,
    transport: UdpTransport,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl GossipNode {
    /// Bind the transport and build the engine. Nothing runs until `run`.
    pub async fn bind<F>(config: GossipConfig, deliver: F) -> GossipResult<(Self, NodeHandle)>
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let transport = UdpTransport::bind(config.self_endpoint).await?;
        let engine = GossipEngine::new(config, transport.local_addr(), Box::new(deliver))?;
        let (tx, rx) = mpsc::unbounded_channel();

        let node = GossipNode {
            engine,
            transport,
            commands: rx,
        };
        Ok((node, NodeHandle { commands: tx }))
    }

    /// This node as advertised to peers
    pub fn member(&self) -> Member {
        self.engine.me()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn engine(&self) -> &GossipEngine {
        &self.engine
    }

    /// Join through the seeds in the configuration
    pub fn join_seeds(&mut self) -> GossipResult<()> {
        let seeds = self.engine.config().seeds.clone();
        self.engine.add_members(&seeds, Instant::now())
    }

    /// Run the loop until the node is destroyed
    pub async fn run(mut self) -> GossipResult<EngineStats> {
        let tick = self.engine.config().tick_interval();
        tracing::info!(endpoint = %self.local_addr(), ?tick, "Gossip loop started");

        loop {
            self.process_commands();
            if self.engine.state().is_destroyed() {
                break;
            }

            self.engine.tick(&self.transport, Instant::now());

            tokio::time::sleep(tick).await;
        }

        let stats = self.engine.stats().clone();
        tracing::info!(
            ticks = stats.ticks,
            delivered = stats.payloads_delivered,
            "Gossip loop stopped"
        );
        Ok(stats)
    }

    fn process_commands(&mut self) {
        let now = Instant::now();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::AddMembers { seeds, reply } => {
                    let result = self.engine.add_members(&seeds, now);
                    // Caller may have stopped waiting
                    let _ = reply.send(result);
                }
                Command::Send(payload) => {
                    if let Err(e) = self.engine.send(payload, now) {
                        tracing::warn!("Payload not sent: {}", e);
                    }
                }
                Command::Shutdown => self.engine.shutdown(),
            }
        }
    }
}
