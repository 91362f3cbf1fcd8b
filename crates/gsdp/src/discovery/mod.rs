// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server discovery and liveness engine.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `engine` | The query state machine and its public operations |
//! | `handlers` | Inbound dispatch, requester + responder packet handlers |
//! | `info` | `ServerInfo` records and the address-keyed registry |
//! | `pending` | In-flight ping/query/list-page bookkeeping |
//! | `masters` | Configured master directory and region-preferred selection |
//! | `filter` | The active query filter |
//! | `heartbeat` | Sequence-guarded presence publication |
//! | `nat` | Arranged connect, relay, invite join (feature `nat`) |
//! | `progress` | Output ports toward the host runtime |
//! | `host` | Wall-clock pump binding the engine to a UDP socket |

pub mod engine;
pub mod filter;
mod handlers;
pub mod heartbeat;
pub mod host;
pub mod info;
pub mod masters;
#[cfg(feature = "nat")]
mod nat;
pub mod pending;
pub mod progress;

pub use engine::{Event, QueryEngine, QueryParams};
pub use filter::{FilterSpec, QueryType};
pub use host::EngineHost;
pub use info::{ServerInfo, ServerRegistry, StatusFlags};
pub use masters::{MasterDirectory, MasterInfo};
pub use pending::{PacketStatus, PendingTable, Ping};
pub use progress::{NullSink, ProgressSink, SessionEvents};

#[cfg(test)]
pub(crate) mod testutil {
    use crate::config::{EngineTunables, PrefStore};
    use crate::core::addr::ServerAddr;
    use crate::discovery::engine::QueryEngine;
    use crate::discovery::progress::SessionEvents;
    use crate::transport::{Datagram, TransportError};
    use parking_lot::Mutex;
    use std::sync::Arc;

    pub const PROBE_PORT: u16 = 28000;

    /// Transport that records outbound datagrams instead of sending them.
    /// IPX broadcast stays unreachable, as on the real UDP binding.
    #[derive(Default)]
    pub struct CaptureTransport {
        sent: Mutex<Vec<(ServerAddr, Vec<u8>)>>,
    }

    impl Datagram for CaptureTransport {
        fn send_to(&self, payload: &[u8], addr: &ServerAddr) -> Result<usize, TransportError> {
            if matches!(addr, ServerAddr::IpxBroadcast { .. }) {
                return Err(TransportError::Unreachable(*addr));
            }
            self.sent.lock().push((*addr, payload.to_vec()));
            Ok(payload.len())
        }
    }

    pub fn drain_sent(transport: &Arc<CaptureTransport>) -> Vec<(ServerAddr, Vec<u8>)> {
        std::mem::take(&mut *transport.sent.lock())
    }

    pub fn test_engine() -> (QueryEngine, Arc<CaptureTransport>) {
        let transport = Arc::new(CaptureTransport::default());
        let engine = QueryEngine::new(
            transport.clone(),
            PrefStore::new(),
            EngineTunables::default(),
        );
        (engine, transport)
    }

    /// Session-event sink that stores the last of each outcome.
    #[derive(Default)]
    pub struct RecordingEvents {
        pub game_types: Mutex<Option<(Vec<String>, Vec<String>)>>,
        #[cfg(feature = "nat")]
        pub arranged: Mutex<Option<(u16, Vec<ServerAddr>)>>,
        #[cfg(feature = "nat")]
        pub relay: Mutex<Option<(bool, ServerAddr)>>,
        #[cfg(feature = "nat")]
        pub invite: Mutex<Option<(ServerAddr, bool)>>,
    }

    impl SessionEvents for RecordingEvents {
        fn game_types(&self, games: &[String], missions: &[String]) {
            *self.game_types.lock() = Some((games.to_vec(), missions.to_vec()));
        }

        #[cfg(feature = "nat")]
        fn arranged_request(&self, client_id: u16, candidates: &[ServerAddr]) {
            *self.arranged.lock() = Some((client_id, candidates.to_vec()));
        }

        #[cfg(feature = "nat")]
        fn relay_assigned(&self, is_host: bool, relay: ServerAddr) {
            *self.relay.lock() = Some((is_host, relay));
        }

        #[cfg(feature = "nat")]
        fn invite_response(&self, host: ServerAddr, is_local: bool) {
            *self.invite.lock() = Some((host, is_local));
        }
    }
}
