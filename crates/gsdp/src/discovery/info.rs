// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovered-server records and the registry that owns them.
//!
//! One [`ServerInfo`] per discovered endpoint, keyed by address. The first
//! five status bits are client-side query state; the last four mirror what
//! the server publishes about itself in info responses.

use crate::core::addr::ServerAddr;
use crate::protocol::constants::{
    STATUS_BIT_DEDICATED, STATUS_BIT_LINUX, STATUS_BIT_PASSWORDED, STATUS_BIT_PRIVATE,
};
use std::fmt;

/// Bitset over the server-record states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags(u16);

impl StatusFlags {
    /// Record created this session, nothing heard yet.
    pub const NEW: StatusFlags = StatusFlags(1 << 0);
    /// A per-server refresh is in progress; filters must not evict.
    pub const UPDATING: StatusFlags = StatusFlags(1 << 1);
    /// Info query in flight.
    pub const QUERYING: StatusFlags = StatusFlags(1 << 2);
    /// Retry budget exhausted without an answer.
    pub const TIMED_OUT: StatusFlags = StatusFlags(1 << 3);
    /// The most recent exchange completed.
    pub const RESPONDED: StatusFlags = StatusFlags(1 << 4);

    // Server-published attributes.
    pub const DEDICATED: StatusFlags = StatusFlags(1 << 5);
    pub const PASSWORDED: StatusFlags = StatusFlags(1 << 6);
    pub const PRIVATE: StatusFlags = StatusFlags(1 << 7);
    pub const LINUX: StatusFlags = StatusFlags(1 << 8);

    pub fn empty() -> Self {
        StatusFlags(0)
    }

    pub fn test(&self, flag: StatusFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn set(&mut self, flag: StatusFlags) {
        self.0 |= flag.0;
    }

    pub fn clear(&mut self, flag: StatusFlags) {
        self.0 &= !flag.0;
    }

    /// Map the wire status byte of an info response into the published
    /// attribute bits. Client-side state bits are not carried on the wire.
    pub fn from_wire(status: u8) -> Self {
        let mut flags = StatusFlags::empty();
        if status & STATUS_BIT_LINUX != 0 {
            flags.set(StatusFlags::LINUX);
        }
        if status & STATUS_BIT_DEDICATED != 0 {
            flags.set(StatusFlags::DEDICATED);
        }
        if status & STATUS_BIT_PASSWORDED != 0 {
            flags.set(StatusFlags::PASSWORDED);
        }
        if status & STATUS_BIT_PRIVATE != 0 {
            flags.set(StatusFlags::PRIVATE);
        }
        flags
    }
}

impl std::ops::BitOr for StatusFlags {
    type Output = StatusFlags;
    fn bitor(self, rhs: StatusFlags) -> StatusFlags {
        StatusFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (StatusFlags::NEW, "new"),
            (StatusFlags::UPDATING, "updating"),
            (StatusFlags::QUERYING, "querying"),
            (StatusFlags::TIMED_OUT, "timed-out"),
            (StatusFlags::RESPONDED, "responded"),
            (StatusFlags::DEDICATED, "dedicated"),
            (StatusFlags::PASSWORDED, "passworded"),
            (StatusFlags::PRIVATE, "private"),
            (StatusFlags::LINUX, "linux"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.test(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// Everything known about one discovered endpoint.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub address: ServerAddr,
    pub name: String,
    pub game_type: String,
    pub mission_type: String,
    pub mission_name: String,
    pub status_string: String,
    pub info_string: String,
    pub num_players: u8,
    pub max_players: u8,
    pub num_bots: u8,
    pub version: u32,
    pub cpu_speed: u16,
    /// Most recent round-trip time in milliseconds (0 if none measured).
    pub ping: u32,
    pub status: StatusFlags,
    pub is_favorite: bool,
    /// Learned via LAN broadcast, or matches one of our own addresses.
    pub is_local: bool,
}

impl ServerInfo {
    pub fn new(address: ServerAddr) -> Self {
        Self {
            address,
            name: String::new(),
            game_type: String::new(),
            mission_type: String::new(),
            mission_name: String::new(),
            status_string: String::new(),
            info_string: String::new(),
            num_players: 0,
            max_players: 0,
            num_bots: 0,
            version: 0,
            cpu_speed: 0,
            ping: 0,
            status: StatusFlags::NEW,
            is_favorite: false,
            is_local: false,
        }
    }

    pub fn is_updating(&self) -> bool {
        self.status.test(StatusFlags::UPDATING)
    }

    pub fn is_querying(&self) -> bool {
        self.status.test(StatusFlags::QUERYING)
    }

    pub fn has_responded(&self) -> bool {
        self.status.test(StatusFlags::RESPONDED)
    }

    pub fn is_dedicated(&self) -> bool {
        self.status.test(StatusFlags::DEDICATED)
    }

    pub fn is_passworded(&self) -> bool {
        self.status.test(StatusFlags::PASSWORDED)
    }
}

/// Ordered collection of [`ServerInfo`] records, keyed by address.
///
/// Insertion order is the browse order the host indexes into, so records
/// live in a vector; lists stay small enough that linear lookup wins over
/// a map plus an index side-table.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: Vec<ServerInfo>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ServerInfo> {
        self.servers.get(index)
    }

    pub fn find(&self, addr: &ServerAddr) -> Option<&ServerInfo> {
        self.servers.iter().find(|s| s.address == *addr)
    }

    pub fn find_mut(&mut self, addr: &ServerAddr) -> Option<&mut ServerInfo> {
        self.servers.iter_mut().find(|s| s.address == *addr)
    }

    /// Fetch the record for `addr`, creating a fresh one when absent.
    pub fn find_or_create(&mut self, addr: ServerAddr) -> &mut ServerInfo {
        if let Some(pos) = self.servers.iter().position(|s| s.address == addr) {
            return &mut self.servers[pos];
        }
        self.servers.push(ServerInfo::new(addr));
        let last = self.servers.len() - 1;
        &mut self.servers[last]
    }

    /// Drop the record for `addr`. Returns true when something was removed.
    pub fn remove(&mut self, addr: &ServerAddr) -> bool {
        let before = self.servers.len();
        self.servers.retain(|s| s.address != *addr);
        self.servers.len() != before
    }

    pub fn clear(&mut self) {
        self.servers.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerInfo> {
        self.servers.iter()
    }
}
