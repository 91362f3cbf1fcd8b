// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wall-clock pump binding the engine to a UDP socket.
//!
//! The engine itself is single-threaded over virtual time; this wrapper is
//! the production glue that maps wall-clock milliseconds onto the virtual
//! clock, drains the socket, and serializes host access to the engine. Game
//! loops call [`EngineHost::poll`] once per frame; headless servers can
//! spin it from a timer thread.

use crate::config::MAX_PACKET_DATA_SIZE;
use crate::discovery::engine::QueryEngine;
use crate::transport::UdpTransport;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// One engine plus the socket it speaks through.
pub struct EngineHost {
    engine: Mutex<QueryEngine>,
    transport: Arc<UdpTransport>,
    started: Instant,
}

impl EngineHost {
    /// Wrap an engine that was constructed over `transport`.
    pub fn new(engine: QueryEngine, transport: Arc<UdpTransport>) -> Self {
        Self {
            engine: Mutex::new(engine),
            transport,
            started: Instant::now(),
        }
    }

    /// Run a closure against the engine (issue queries, read the list).
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut QueryEngine) -> R) -> R {
        f(&mut self.engine.lock())
    }

    /// Advance timers and deliver every datagram waiting on the socket.
    pub fn poll(&self) {
        let now_ms = self.started.elapsed().as_millis() as u32;
        let mut engine = self.engine.lock();
        engine.pump(now_ms);

        let mut buf = [0u8; MAX_PACKET_DATA_SIZE];
        loop {
            match self.transport.try_recv(&mut buf) {
                Ok(Some((len, from))) => engine.dispatch(from, &buf[..len]),
                Ok(None) => break,
                Err(err) => {
                    log::debug!("[udp] receive failed: {}", err);
                    break;
                }
            }
        }
        // Datagrams may have scheduled immediate work.
        engine.pump(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineTunables, PrefStore};
    use crate::discovery::engine::QueryParams;

    #[test]
    fn test_poll_drives_a_lan_query_to_completion() {
        let transport = Arc::new(UdpTransport::bind(0).expect("bind"));
        let engine = QueryEngine::new(
            transport.clone(),
            PrefStore::new(),
            EngineTunables::default(),
        );
        let host = EngineHost::new(engine, transport);

        // Probe a port nobody answers on; the query must still terminate.
        host.with_engine(|e| {
            e.query_lan_servers(47999, 0, &QueryParams::default(), false)
        });

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        loop {
            host.poll();
            let idle = host.with_engine(|e| e.pending.is_idle());
            if idle || Instant::now() > deadline {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(host.with_engine(|e| e.pending.is_idle()));
    }
}
