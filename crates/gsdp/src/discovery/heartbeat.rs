// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic presence publication to the configured masters.
//!
//! Each heartbeat cycle carries the sequence number it was started with;
//! a scheduled send whose sequence no longer matches returns without
//! effect. Stopping therefore only bumps the sequence, no cancellation
//! token needed.

use crate::discovery::engine::{Event, QueryEngine};
use crate::discovery::masters::MasterDirectory;
use crate::protocol::constants::PacketType;
use crate::protocol::wire_token;

impl QueryEngine {
    /// Begin (or restart) the heartbeat cycle: one send to every master
    /// immediately, then one per interval.
    pub fn start_heartbeat(&mut self) {
        self.heartbeat_seq = self.heartbeat_seq.wrapping_add(1);
        let seq = self.heartbeat_seq;
        self.process_heartbeat(seq);
    }

    /// Invalidate the running cycle; the next scheduled send is stale and
    /// returns without effect.
    pub fn stop_heartbeat(&mut self) {
        self.heartbeat_seq = self.heartbeat_seq.wrapping_add(1);
    }

    pub(crate) fn process_heartbeat(&mut self, seq: u32) {
        if seq != self.heartbeat_seq {
            return;
        }
        self.send_heartbeat(0);
        self.sched
            .submit_in(Event::Heartbeat { seq }, self.tunables.heartbeat_interval_ms);
    }

    /// One presence datagram to every configured master. The master list
    /// is re-read from the preferences so edits apply without a restart.
    pub(crate) fn send_heartbeat(&mut self, flags: u8) {
        let masters = MasterDirectory::load_from(&self.prefs);
        let token = wire_token(self.session, 0);
        for master in masters.iter() {
            log::info!("[heartbeat] sending heartbeat to master server [{}]", master.address);
            self.send_header_only(PacketType::GameHeartbeat, flags, token, &master.address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ser::PacketReader;
    use crate::discovery::testutil::{drain_sent, test_engine};
    use crate::protocol::messages::PacketHeader;

    #[test]
    fn test_heartbeat_lifecycle() {
        let (mut engine, transport) = test_engine();
        engine.prefs.set("client.master0", "1:10.0.0.100:28002");
        engine.prefs.set("client.master1", "1:10.0.0.101:28002");

        engine.start_heartbeat();

        // One send per master immediately.
        let sent = drain_sent(&transport);
        assert_eq!(sent.len(), 2);
        for (_, bytes) in &sent {
            let mut r = PacketReader::new(bytes);
            let header = PacketHeader::read(&mut r).expect("header");
            assert_eq!(header.packet_type, PacketType::GameHeartbeat);
            assert!(r.is_eof(), "heartbeat has no body beyond the header");
        }

        // One more round after the interval.
        let interval = engine.tunables.heartbeat_interval_ms;
        engine.run_until_idle(interval + 10);
        assert_eq!(drain_sent(&transport).len(), 2);

        // Stop: the next scheduled send is stale and does nothing.
        engine.stop_heartbeat();
        engine.run_until_idle(3 * interval);
        assert!(drain_sent(&transport).is_empty());
        assert!(engine.sched.is_empty(), "stale cycle did not reschedule");
    }

    #[test]
    fn test_restart_supersedes_older_cycle() {
        let (mut engine, transport) = test_engine();
        engine.prefs.set("client.master0", "1:10.0.0.100:28002");

        engine.start_heartbeat();
        drain_sent(&transport);

        // Restart: the old cycle's scheduled event is now stale, the new
        // one sends immediately.
        engine.start_heartbeat();
        assert_eq!(drain_sent(&transport).len(), 1);

        let interval = engine.tunables.heartbeat_interval_ms;
        engine.run_until_idle(interval + 10);
        // Only the new cycle fired; the superseded one was a no-op.
        assert_eq!(drain_sent(&transport).len(), 1);
    }
}
