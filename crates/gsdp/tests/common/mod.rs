// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared harness for the end-to-end query scenarios: an in-memory
//! datagram network with deterministic virtual time, plus recording sinks.

#![allow(dead_code)]

use gsdp::config::{EngineTunables, PrefStore};
use gsdp::core::ser::PacketReader;
use gsdp::protocol::messages::PacketHeader;
use gsdp::{Datagram, ProgressSink, QueryEngine, ServerAddr, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;

/// One in-flight datagram: (from, to, payload).
pub type Packet = (ServerAddr, ServerAddr, Vec<u8>);

/// Route engine logs through the test harness (`RUST_LOG=debug` to see
/// the full exchange when a scenario fails).
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Transport that drops every datagram into a shared queue.
pub struct NodeTransport {
    addr: ServerAddr,
    queue: Arc<Mutex<Vec<Packet>>>,
}

impl Datagram for NodeTransport {
    fn send_to(&self, payload: &[u8], addr: &ServerAddr) -> Result<usize, TransportError> {
        if matches!(addr, ServerAddr::IpxBroadcast { .. }) {
            return Err(TransportError::Unreachable(*addr));
        }
        self.queue.lock().push((self.addr, *addr, payload.to_vec()));
        Ok(payload.len())
    }
}

/// Progress sink that records every callback as (phase, message, progress).
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<(String, String, f32)>>,
}

impl RecordingProgress {
    fn record(&self, phase: &str, message: &str, progress: f32) {
        self.events
            .lock()
            .push((phase.into(), message.into(), progress));
    }

    pub fn messages_for(&self, phase: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(p, _, _)| p == phase)
            .map(|(_, m, _)| m.clone())
            .collect()
    }

    pub fn last_done(&self) -> Option<String> {
        self.messages_for("done").last().cloned()
    }
}

impl ProgressSink for RecordingProgress {
    fn start(&self, message: &str, progress: f32) {
        self.record("start", message, progress);
    }
    fn update(&self, message: &str, progress: f32) {
        self.record("update", message, progress);
    }
    fn ping(&self, message: &str, progress: f32) {
        self.record("ping", message, progress);
    }
    fn query(&self, message: &str, progress: f32) {
        self.record("query", message, progress);
    }
    fn done(&self, message: &str, progress: f32) {
        self.record("done", message, progress);
    }
}

pub struct Node {
    pub addr: ServerAddr,
    pub engine: QueryEngine,
    pub prefs: PrefStore,
    pub progress: Arc<RecordingProgress>,
}

/// A little LAN: engines joined by a shared queue, advanced in lockstep
/// over virtual time. Delivery is instant and loss-free; packet loss is
/// modeled by simply not adding a responder.
pub struct Network {
    queue: Arc<Mutex<Vec<Packet>>>,
    pub nodes: Vec<Node>,
    /// Every datagram that crossed the network, delivered or not.
    pub traffic: Vec<Packet>,
    now_ms: u32,
}

impl Network {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            nodes: Vec::new(),
            traffic: Vec::new(),
            now_ms: 0,
        }
    }

    /// Add an engine at `addr`; returns its node index.
    pub fn add_node(&mut self, addr: ServerAddr) -> usize {
        let prefs = PrefStore::new();
        let transport = Arc::new(NodeTransport {
            addr,
            queue: self.queue.clone(),
        });
        let mut engine = QueryEngine::new(transport, prefs.clone(), EngineTunables::default());
        let progress = Arc::new(RecordingProgress::default());
        engine.set_progress_sink(progress.clone());
        self.nodes.push(Node {
            addr,
            engine,
            prefs,
            progress,
        });
        self.nodes.len() - 1
    }

    /// Advance all nodes to `until_ms`, one virtual millisecond at a time,
    /// delivering queued datagrams between steps.
    pub fn run_to(&mut self, until_ms: u32) {
        while self.now_ms < until_ms {
            self.now_ms += 1;
            let now = self.now_ms;
            for node in &mut self.nodes {
                node.engine.pump(now);
            }
            self.deliver();
        }
    }

    /// Flush the queue until quiescent (replies may queue more).
    pub fn deliver(&mut self) {
        for _ in 0..8 {
            let batch = std::mem::take(&mut *self.queue.lock());
            if batch.is_empty() {
                return;
            }
            for (from, to, payload) in batch {
                self.traffic.push((from, to, payload.clone()));
                match to {
                    ServerAddr::Broadcast { port } => {
                        for node in &mut self.nodes {
                            if node.addr != from && node.addr.port() == port {
                                node.engine.dispatch(from, &payload);
                            }
                        }
                    }
                    ServerAddr::Ip { .. } => {
                        if let Some(node) =
                            self.nodes.iter_mut().find(|n| n.addr == to)
                        {
                            node.engine.dispatch(from, &payload);
                        }
                    }
                    ServerAddr::IpxBroadcast { .. } => {}
                }
            }
        }
    }

    pub fn count_traffic(&self, to: ServerAddr, packet_type: u8) -> usize {
        self.traffic
            .iter()
            .filter(|(_, t, p)| *t == to && p.first() == Some(&packet_type))
            .count()
    }

    /// Datagrams addressed to `to`, oldest first.
    pub fn traffic_to(&self, to: ServerAddr) -> Vec<Packet> {
        self.traffic
            .iter()
            .filter(|(_, t, _)| *t == to)
            .cloned()
            .collect()
    }
}

/// Parse the header off a captured datagram.
pub fn header_of(payload: &[u8]) -> PacketHeader {
    let mut r = PacketReader::new(payload);
    PacketHeader::read(&mut r).expect("captured datagram should carry a header")
}

/// Configure a node as a joinable game server.
pub fn host_a_game(node: &mut Node, name: &str) {
    node.engine.set_allow_connections(true);
    node.prefs.set("server.name", name);
    node.prefs.set("server.game-type", "Deathmatch");
    node.prefs.set("server.mission-type", "dm");
    node.prefs.set("server.mission-name", "Forgotten.mis");
    node.prefs.set("server.max-players", "16");
    node.prefs.set("server.player-count", "3");
    node.prefs.set("server.bot-count", "1");
    node.prefs.set("server.cpu-speed", "2400");
    node.prefs.set("server.info", "come play");
}
