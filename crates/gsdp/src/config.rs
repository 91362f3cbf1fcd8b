// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GSDP Global Configuration - Single Source of Truth
//!
//! This module centralizes the query-protocol constants and the runtime
//! preference store. **NEVER hardcode elsewhere!**
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: Compile-time constants (timers, retry budgets,
//!   fan-out caps, wire limits)
//! - **Level 2 (Dynamic)**: [`PrefStore`] for host-supplied preferences and
//!   server-published facts (master list, favorites, server name, ...)
//! - **Level 3 (Per-engine)**: [`EngineTunables`], a plain struct carried by
//!   each engine, defaulting to the Level-1 constants

use dashmap::DashMap;
use std::sync::Arc;

// =======================================================================
// Wire & protocol constants
// =======================================================================

/// Maximum datagram body size the writer will produce.
pub const MAX_PACKET_DATA_SIZE: usize = 1500;

/// Query protocol version tag carried in every ping response.
pub const VERSION_STRING: &str = "VER1";

/// Current game protocol version advertised in ping responses.
pub const CURRENT_PROTOCOL_VERSION: u32 = 12;

/// Oldest game protocol version we still talk to.
pub const MIN_REQUIRED_PROTOCOL_VERSION: u32 = 9;

/// Build version advertised in ping responses; peers on a different build
/// are dropped from consideration.
pub const BUILD_VERSION: u32 = 1001;

/// Server names are truncated to this many bytes on the wire.
pub const MAX_SERVER_NAME_LEN: usize = 24;

/// Upper bound on configured master servers.
pub const MAX_MASTERS: usize = 10;

// =======================================================================
// Timers & retry budgets (milliseconds of virtual time)
// =======================================================================

/// Master list request timeout before a resend.
pub const MASTER_TIMEOUT_MS: u32 = 2_000;

/// Master list request attempts before failing over to another master.
pub const MASTER_RETRY_COUNT: u32 = 3;

/// List-page re-request timeout.
pub const PACKET_TIMEOUT_MS: u32 = 1_000;

/// List-page re-request attempts before the page is abandoned.
pub const PACKET_RETRY_COUNT: u32 = 4;

/// Ping exchange timeout before a resend.
pub const PING_TIMEOUT_MS: u32 = 800;

/// Ping attempts before the address is marked timed out.
pub const PING_RETRY_COUNT: u32 = 4;

/// Info query timeout before a resend.
pub const QUERY_TIMEOUT_MS: u32 = 1_000;

/// Info query attempts before the address is marked timed out.
pub const QUERY_RETRY_COUNT: u32 = 4;

/// Presence heartbeat publication interval.
pub const HEARTBEAT_INTERVAL_MS: u32 = 10_000;

/// Concurrent ping exchanges serviced per tick window.
pub const MAX_CONCURRENT_PINGS: usize = 10;

/// Concurrent info queries serviced per tick window.
pub const MAX_CONCURRENT_QUERIES: usize = 2;

/// Phase ticks re-post themselves at this granularity.
pub const TICK_GRANULARITY_MS: u32 = 1;

/// The list-page timer runs on a coarser cadence than phase ticks.
pub const PACKET_TICK_GRANULARITY_MS: u32 = 30;

// =======================================================================
// Preference keys consumed by the engine
// =======================================================================

/// Master lines `"<region>:<host:port>"`, keys `client.master0..client.master9`.
pub const KEY_MASTER_PREFIX: &str = "client.master";
/// Preferred region mask used by master selection.
pub const KEY_REGION_MASK: &str = "client.region-mask";
/// Number of favorite entries.
pub const KEY_FAVORITE_COUNT: &str = "client.favorites.count";
/// Favorite lines `"<name>\t<address>"`, keys `client.favorite<N>`.
pub const KEY_FAVORITE_PREFIX: &str = "client.favorite";

pub const KEY_SERVER_NAME: &str = "server.name";
pub const KEY_SERVER_PASSWORD: &str = "server.password";
pub const KEY_SERVER_INFO: &str = "server.info";
pub const KEY_SERVER_MAX_PLAYERS: &str = "server.max-players";
pub const KEY_SERVER_PRIVATE_SLOTS: &str = "server.private-slots";
pub const KEY_SERVER_PLAYER_COUNT: &str = "server.player-count";
pub const KEY_SERVER_BOT_COUNT: &str = "server.bot-count";
pub const KEY_SERVER_REGION_MASK: &str = "server.region-mask";
pub const KEY_SERVER_DEDICATED: &str = "server.dedicated";
pub const KEY_SERVER_TYPE: &str = "server.type";
pub const KEY_SERVER_PORT: &str = "server.port";
pub const KEY_SERVER_INVITE_CODE: &str = "server.invite-code";
pub const KEY_SERVER_GAME_TYPE: &str = "server.game-type";
pub const KEY_SERVER_MISSION_TYPE: &str = "server.mission-type";
pub const KEY_SERVER_MISSION_NAME: &str = "server.mission-name";
/// Tab-separated player GUID list.
pub const KEY_SERVER_GUID_LIST: &str = "server.guid-list";
/// Published CPU speed in MHz.
pub const KEY_SERVER_CPU_SPEED: &str = "server.cpu-speed";

// =======================================================================
// PrefStore
// =======================================================================

/// Concurrent string key/value store for host preferences and published
/// server facts.
///
/// `DashMap`: concurrent hash map with internal sharding (no global lock),
/// `Arc<str>` keys/values so reads hand out cheap clones.
#[derive(Clone, Default)]
pub struct PrefStore {
    entries: Arc<DashMap<Arc<str>, Arc<str>>>,
}

impl PrefStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.entries.insert(Arc::from(key), Arc::from(value));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        self.entries.get(key).map(|v| Arc::clone(&v))
    }

    /// Value as an owned string, empty when unset.
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.get(key).map(|v| v.to_string()).unwrap_or_default()
    }

    /// Numeric value; unset or unparsable yields the default.
    #[must_use]
    pub fn get_u32_or(&self, key: &str, default: u32) -> u32 {
        self.get(key)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(default)
    }

    /// Boolean value: `1`/`true`/`yes` are true, anything else false.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<str>> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =======================================================================
// EngineTunables
// =======================================================================

/// Per-engine copies of the timing/retry/fan-out knobs.
///
/// Defaults are the protocol constants above; hosts override fields to tune
/// a particular deployment (the caps were fixed in older engines, they are
/// deliberately configurable here).
#[derive(Debug, Clone)]
pub struct EngineTunables {
    pub master_timeout_ms: u32,
    pub master_retry_count: u32,
    pub packet_timeout_ms: u32,
    pub packet_retry_count: u32,
    pub ping_timeout_ms: u32,
    pub ping_retry_count: u32,
    pub query_timeout_ms: u32,
    pub query_retry_count: u32,
    pub heartbeat_interval_ms: u32,
    pub max_concurrent_pings: usize,
    pub max_concurrent_queries: usize,
}

impl Default for EngineTunables {
    fn default() -> Self {
        Self {
            master_timeout_ms: MASTER_TIMEOUT_MS,
            master_retry_count: MASTER_RETRY_COUNT,
            packet_timeout_ms: PACKET_TIMEOUT_MS,
            packet_retry_count: PACKET_RETRY_COUNT,
            ping_timeout_ms: PING_TIMEOUT_MS,
            ping_retry_count: PING_RETRY_COUNT,
            query_timeout_ms: QUERY_TIMEOUT_MS,
            query_retry_count: QUERY_RETRY_COUNT,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            max_concurrent_pings: MAX_CONCURRENT_PINGS,
            max_concurrent_queries: MAX_CONCURRENT_QUERIES,
        }
    }
}
