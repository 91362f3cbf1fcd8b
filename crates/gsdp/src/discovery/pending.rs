// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-flight exchange bookkeeping.
//!
//! Two ordered queues of pending exchanges (`pings`, `queries`), the list of
//! outstanding master list pages, and the finished set that suppresses
//! re-probing an address within a session. Entries are created on first
//! send and destroyed on response or retry exhaustion; only a bounded
//! prefix of each queue is serviced per tick.

use crate::core::addr::{AddrSet, ServerAddr};

/// One in-flight ping or info-query exchange.
#[derive(Debug, Clone)]
pub struct Ping {
    pub address: ServerAddr,
    pub session: u32,
    pub key: u16,
    /// Virtual time of the last send; 0 forces an immediate send.
    pub time: u32,
    /// Remaining attempts.
    pub try_count: u32,
    pub broadcast: bool,
    pub is_local: bool,
}

/// One outstanding master list page beyond the first.
#[derive(Debug, Clone)]
pub struct PacketStatus {
    pub index: u8,
    pub key: u16,
    pub time: u32,
    pub try_count: u32,
}

impl PacketStatus {
    pub fn new(index: u8, key: u16, time: u32, try_count: u32) -> Self {
        Self {
            index,
            key,
            time,
            try_count,
        }
    }
}

/// The three pending lists plus the per-session finished set.
#[derive(Debug, Default)]
pub struct PendingTable {
    pub pings: Vec<Ping>,
    pub queries: Vec<Ping>,
    pub packets: Vec<PacketStatus>,
    pub finished: AddrSet,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a unicast ping unless the address already ran to completion
    /// this session. Returns true when an entry was queued.
    pub fn push_ping_request(&mut self, addr: ServerAddr, session: u32, retry_count: u32) -> bool {
        if self.finished.contains(&addr) {
            return false;
        }
        self.pings.push(Ping {
            address: addr,
            session,
            key: 0,
            time: 0,
            try_count: retry_count,
            broadcast: false,
            is_local: false,
        });
        true
    }

    /// Queue a broadcast probe: one send, no retry, counts as local.
    pub fn push_ping_broadcast(&mut self, addr: ServerAddr, session: u32) -> bool {
        if self.finished.contains(&addr) {
            return false;
        }
        self.pings.push(Ping {
            address: addr,
            session,
            key: 0,
            time: 0,
            try_count: 1,
            broadcast: true,
            is_local: true,
        });
        true
    }

    /// Pings excluding broadcast probes; broadcasts hold a slot but are not
    /// part of the user-visible request count.
    pub fn ping_request_count(&self) -> usize {
        self.pings.iter().filter(|p| !p.broadcast).count()
    }

    pub fn find_ping(&self, addr: &ServerAddr) -> Option<usize> {
        self.pings.iter().position(|p| p.address == *addr)
    }

    pub fn find_query(&self, addr: &ServerAddr) -> Option<usize> {
        self.queries.iter().position(|p| p.address == *addr)
    }

    /// Move a ping entry into the query queue with a fresh retry budget.
    /// The address is also recorded as finished: the ping exchange for it
    /// is complete.
    pub fn promote_to_query(&mut self, ping_index: usize, retry_count: u32) {
        let mut entry = self.pings.remove(ping_index);
        self.finished.insert(entry.address);
        entry.key = 0;
        entry.time = 0;
        entry.try_count = retry_count;
        self.queries.push(entry);
    }

    pub fn find_packet(&self, index: u8) -> Option<usize> {
        self.packets.iter().position(|p| p.index == index)
    }

    pub fn is_idle(&self) -> bool {
        self.pings.is_empty() && self.queries.is_empty() && self.packets.is_empty()
    }

    /// Drop every pending entry (the finished set survives the session).
    pub fn clear_in_flight(&mut self) {
        self.pings.clear();
        self.queries.clear();
        self.packets.clear();
    }

    /// Full reset at the start of a new session.
    pub fn clear_all(&mut self) {
        self.clear_in_flight();
        self.finished.clear();
    }
}
