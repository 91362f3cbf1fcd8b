// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # GSDP - Game Server Discovery Protocol engine
//!
//! Server discovery and liveness for multiplayer games over a
//! connectionless datagram transport: master-list fetch, LAN broadcast
//! probing, ping and info exchanges with bounded fan-out and per-request
//! retry budgets, responder-side answering, heartbeat presence publication,
//! and an optional NAT traversal profile (arranged connections, relay
//! fallback, invite-code join).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gsdp::config::{EngineTunables, PrefStore};
//! use gsdp::discovery::{EngineHost, QueryEngine, QueryParams};
//! use gsdp::transport::UdpTransport;
//! use std::sync::Arc;
//!
//! fn main() -> std::io::Result<()> {
//!     let transport = Arc::new(UdpTransport::bind(0)?);
//!     let prefs = PrefStore::new();
//!     prefs.set("client.master0", "2:master.example.net:28002");
//!
//!     let engine = QueryEngine::new(transport.clone(), prefs, EngineTunables::default());
//!     let host = EngineHost::new(engine, transport);
//!
//!     host.with_engine(|e| e.query_master_server(28000, 0, &QueryParams::default(), &[]));
//!     loop {
//!         host.poll(); // once per frame
//!         # break;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +----------------------------------------------------------------+
//! |                        Host runtime                            |
//! |      queries, browse list, ProgressSink, SessionEvents         |
//! +----------------------------------------------------------------+
//! |                      Discovery engine                          |
//! |  QueryEngine | registry | pending tables | masters | filter    |
//! +----------------------------------------------------------------+
//! |                     Protocol / codec                           |
//! |  typed messages | packet cursors | session-key tokens          |
//! +----------------------------------------------------------------+
//! |                        Transport                               |
//! |        Datagram port | UDP binding (broadcast-capable)         |
//! +----------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`QueryEngine`] | The discovery state machine; owns every table |
//! | [`ServerInfo`] | One discovered endpoint's record |
//! | [`PrefStore`] | Key/value preferences and published server facts |
//! | [`ProgressSink`] | Query progress port toward the host UI |
//! | [`EngineHost`] | Wall-clock pump over the UDP binding |

/// Protocol constants, engine tunables and the preference store.
pub mod config;
/// Low-level building blocks (endpoint addresses, packet cursors).
pub mod core;
/// The discovery and liveness engine.
pub mod discovery;
/// Wire layer: packet types, flags, typed messages.
pub mod protocol;
/// Deferred-event scheduler with a virtual-time clock.
pub mod runtime;
/// Datagram transport port and the UDP binding.
pub mod transport;

pub use config::{EngineTunables, PrefStore};
pub use core::addr::ServerAddr;
pub use discovery::host::EngineHost;
pub use discovery::{
    FilterSpec, NullSink, ProgressSink, QueryEngine, QueryParams, QueryType, ServerInfo,
    SessionEvents, StatusFlags,
};
pub use transport::{Datagram, TransportError, UdpTransport};

/// GSDP version string.
pub const VERSION: &str = "0.2.0";
