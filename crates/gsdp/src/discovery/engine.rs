// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The query state machine.
//!
//! One long-running discovery session walks Idle -> MasterFetch ->
//! PingFanOut -> QueryFanOut -> Done. Every phase is driven by deferred
//! tick events; a tick evaluates its timers, emits whatever datagrams are
//! due, and re-posts itself until its queue drains. Public operations
//! mutate state and schedule the first tick; inbound datagrams are fed to
//! [`QueryEngine::dispatch`] by the host's receive loop.
//!
//! Session/key discipline: the session counter bumps whenever the server
//! list is cleared, the key counter bumps per outbound request, and every
//! response must match a pending `(session, key)` token, which keeps late
//! datagrams from an earlier query out of a newer one.

use crate::config::{
    EngineTunables, PrefStore, BUILD_VERSION, KEY_FAVORITE_COUNT, KEY_FAVORITE_PREFIX,
    KEY_REGION_MASK, MAX_SERVER_NAME_LEN, PACKET_TICK_GRANULARITY_MS, TICK_GRANULARITY_MS,
};
use crate::core::addr::{AddrSet, ServerAddr};
use crate::discovery::filter::{FilterSpec, QueryType};
use crate::discovery::info::{ServerInfo, ServerRegistry, StatusFlags};
use crate::discovery::masters::MasterDirectory;
use crate::discovery::pending::PendingTable;
use crate::discovery::progress::{NullSink, ProgressSink, SessionEvents};
use crate::protocol::constants::{PacketType, LIST_REQUEST_ALL_PAGES, QUERY_FLAG_NO_STRING_COMPRESS};
use crate::protocol::messages::{encode_header_only, MasterServerListRequest};
use crate::protocol::wire_token;
use crate::runtime::Scheduler;
use crate::transport::Datagram;
use std::sync::Arc;

/// Deferred events that drive the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Master list request timer.
    MasterQuery { session: u32 },
    /// Ping/query fan-out tick.
    PingTick { session: u32 },
    /// List-page re-request timer (coarser cadence).
    PacketTick { session: u32 },
    /// Presence publication cycle.
    Heartbeat { seq: u32 },
}

/// The in-flight master list fetch, absent outside MasterFetch.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MasterFetch {
    pub address: ServerAddr,
    pub key: u16,
    pub time: u32,
    pub try_count: u32,
}

/// Host-supplied filter arguments shared by the query operations.
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub game_type: String,
    pub mission_type: String,
    pub min_players: u8,
    pub max_players: u8,
    pub max_bots: u8,
    pub region_mask: u32,
    pub max_ping: u32,
    pub min_cpu: u16,
    pub filter_flags: u8,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            game_type: "any".into(),
            mission_type: "any".into(),
            min_players: 0,
            max_players: 255,
            max_bots: 16,
            region_mask: 0xFFFF_FFFF,
            max_ping: 0,
            min_cpu: 0,
            filter_flags: 0,
        }
    }
}

/// Hook producing the long-string content block of an info response.
pub type ContentHook = Box<dyn Fn() -> String + Send + Sync>;

/// The discovery engine: owns every table for its process lifetime.
pub struct QueryEngine {
    pub(crate) tunables: EngineTunables,
    pub(crate) prefs: PrefStore,
    pub(crate) transport: Arc<dyn Datagram>,
    pub(crate) progress: Arc<dyn ProgressSink>,
    pub(crate) events: Arc<dyn SessionEvents>,
    pub(crate) sched: Scheduler<Event>,

    pub(crate) registry: ServerRegistry,
    pub(crate) pending: PendingTable,
    /// Working copy of the master list for the current session; failed
    /// masters are removed from here, never from the preferences.
    pub(crate) masters: MasterDirectory,
    pub(crate) filter: FilterSpec,
    pub(crate) local_addrs: AddrSet,

    pub(crate) session: u32,
    pub(crate) key: u16,
    pub(crate) active: bool,
    pub(crate) got_first_list_packet: bool,
    pub(crate) master_fetch: Option<MasterFetch>,
    /// Master that served the first list page; re-requests go here.
    pub(crate) master_query_addr: Option<ServerAddr>,
    pub(crate) server_ping_count: u32,
    pub(crate) server_query_count: u32,
    pub(crate) heartbeat_seq: u32,
    pub(crate) browser_dirty: bool,

    /// Listening side: answer pings/info queries at all.
    pub(crate) allow_connections: bool,
    pub(crate) content_hook: Option<ContentHook>,
}

impl QueryEngine {
    pub fn new(transport: Arc<dyn Datagram>, prefs: PrefStore, tunables: EngineTunables) -> Self {
        Self {
            tunables,
            prefs,
            transport,
            progress: Arc::new(NullSink),
            events: Arc::new(NullSink),
            sched: Scheduler::new(),
            registry: ServerRegistry::new(),
            pending: PendingTable::new(),
            masters: MasterDirectory::new(),
            filter: FilterSpec::default(),
            local_addrs: AddrSet::new(),
            session: 0,
            key: 0,
            active: false,
            got_first_list_packet: false,
            master_fetch: None,
            master_query_addr: None,
            server_ping_count: 0,
            server_query_count: 0,
            heartbeat_seq: 0,
            browser_dirty: false,
            allow_connections: false,
            content_hook: None,
        }
    }

    pub fn set_progress_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.progress = sink;
    }

    pub fn set_session_events(&mut self, events: Arc<dyn SessionEvents>) {
        self.events = events;
    }

    /// Whether the listening side answers pings and info queries.
    pub fn set_allow_connections(&mut self, allow: bool) {
        self.allow_connections = allow;
    }

    pub fn set_content_hook(&mut self, hook: ContentHook) {
        self.content_hook = Some(hook);
    }

    // ===================================================================
    // Browse accessors
    // ===================================================================

    pub fn server_count(&self) -> usize {
        self.registry.len()
    }

    pub fn server_info(&self, index: usize) -> Option<&ServerInfo> {
        self.registry.get(index)
    }

    pub fn is_local_address(&self, addr: &ServerAddr) -> bool {
        self.local_addrs.contains(addr)
    }

    /// Read and clear the "list changed" flag the browse UI polls.
    pub fn take_browser_dirty(&mut self) -> bool {
        std::mem::take(&mut self.browser_dirty)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    // ===================================================================
    // Event pump
    // ===================================================================

    /// Advance the virtual clock and process everything that came due.
    pub fn pump(&mut self, now_ms: u32) {
        self.sched.advance_to(now_ms);
        while let Some(event) = self.sched.pop_due() {
            self.process(event);
        }
    }

    /// Drain the scheduler, jumping the clock straight to each deadline,
    /// until it is empty or the deadline passes `until_ms`. Test harnesses
    /// and headless tools drive the engine with this.
    pub fn run_until_idle(&mut self, until_ms: u32) {
        while let Some(due) = self.sched.next_due() {
            if due > until_ms {
                break;
            }
            self.pump(due);
        }
    }

    fn process(&mut self, event: Event) {
        match event {
            Event::MasterQuery { session } => self.process_master_server_query(session),
            Event::PingTick { session } => self.process_pings_and_queries(session),
            Event::PacketTick { session } => self.process_server_list_packets(session),
            Event::Heartbeat { seq } => self.process_heartbeat(seq),
        }
    }

    // ===================================================================
    // Public query operations
    // ===================================================================

    /// Reset the per-session tables and invalidate every in-flight key.
    pub fn clear_server_list(&mut self, clear_records: bool) {
        self.pending.clear_all();
        if clear_records {
            self.registry.clear();
        }
        self.server_ping_count = 0;
        self.server_query_count = 0;
        self.local_addrs.clear();
        self.session = self.session.wrapping_add(1);
    }

    /// Broadcast-probe the LAN on `lan_port`. With `use_filters` the normal
    /// client-side filter ladder applies to whatever answers.
    pub fn query_lan_servers(
        &mut self,
        lan_port: u16,
        flags: u8,
        params: &QueryParams,
        use_filters: bool,
    ) {
        self.clear_server_list(true);
        self.active = true;
        self.push_server_favorites();

        let query_type = if use_filters {
            QueryType::OfflineFiltered
        } else {
            QueryType::Offline
        };
        self.apply_filter_params(query_type, flags, params, &[]);
        self.seed_lan_probes(lan_port);

        self.progress.start("Querying LAN servers", 0.0);
        let session = self.session;
        self.sched
            .submit_in(Event::PingTick { session }, TICK_GRANULARITY_MS);
    }

    /// Fetch a filtered list from a master (with LAN probes alongside), or
    /// run a buddy search when `buddy_list` is non-empty.
    pub fn query_master_server(
        &mut self,
        lan_port: u16,
        flags: u8,
        params: &QueryParams,
        buddy_list: &[u32],
    ) {
        self.clear_server_list(true);
        self.got_first_list_packet = false;
        self.master_query_addr = None;
        self.active = true;

        self.progress.start("Querying master server", 0.0);

        if buddy_list.is_empty() {
            self.apply_filter_params(QueryType::Normal, flags, params, &[]);
            // A master query also sweeps the local network.
            self.push_server_favorites();
            self.seed_lan_probes(lan_port);
        } else {
            self.apply_filter_params(QueryType::Buddy, flags, params, buddy_list);
        }

        self.masters = MasterDirectory::load_from(&self.prefs);
        let session = self.session;
        if self.pick_master() {
            // First tick lands at t >= 1 so a zero send-time always means
            // "never sent".
            self.sched
                .submit_in(Event::MasterQuery { session }, TICK_GRANULARITY_MS);
        } else {
            log::warn!("[query] no master servers found");
            // Degrade to whatever is already queued (LAN, favorites).
            self.sched
                .submit_in(Event::PingTick { session }, TICK_GRANULARITY_MS);
        }
    }

    /// Re-ping every stored favorite.
    pub fn query_favorite_servers(&mut self, _flags: u8) {
        self.clear_server_list(true);
        self.active = true;
        self.filter = FilterSpec {
            query_type: QueryType::Favorites,
            ..FilterSpec::default()
        };
        self.push_server_favorites();

        self.progress.start("Query favorites...", 0.0);
        let session = self.session;
        self.sched
            .submit_in(Event::PingTick { session }, TICK_GRANULARITY_MS);
    }

    /// Refresh a single known server without touching the rest of the list.
    pub fn query_single_server(&mut self, addr: ServerAddr, _flags: u8) {
        self.active = true;
        if let Some(si) = self.registry.find_mut(&addr) {
            si.status = StatusFlags::NEW | StatusFlags::UPDATING;
        }
        // Allow the re-probe even if the address already finished.
        self.pending.finished.remove(&addr);

        self.progress.start("Refreshing server...", 0.0);
        self.server_ping_count = 0;
        self.server_query_count = 0;
        if self
            .pending
            .push_ping_request(addr, self.session, self.tunables.ping_retry_count)
        {
            self.server_ping_count += 1;
        }
        let session = self.session;
        self.sched
            .submit_in(Event::PingTick { session }, TICK_GRANULARITY_MS);
    }

    /// Ask a random configured master for its game and mission type lists.
    /// The answer arrives through [`SessionEvents::game_types`].
    pub fn query_master_game_types(&mut self) {
        let masters = MasterDirectory::load_from(&self.prefs);
        if masters.is_empty() {
            return;
        }
        let Some(addr) = masters.pick(self.sched.now(), self.preferred_region()) else {
            return;
        };
        log::info!("[query] requesting game types from the master server");
        let key = self.next_key();
        let token = wire_token(self.session, key);
        self.send_header_only(PacketType::MasterServerGameTypesRequest, 0, token, &addr);
    }

    /// Hard cancel: drop everything in flight. Records that never answered
    /// are marked timed out; late responses will not find an entry.
    pub fn cancel_server_query(&mut self) {
        if !self.active {
            return;
        }
        log::info!("[query] server query canceled");

        self.pending.packets.clear();
        while let Some(entry) = self.pending.pings.pop() {
            self.mark_unresponded_timed_out(&entry.address);
        }
        while let Some(entry) = self.pending.queries.pop() {
            self.mark_unresponded_timed_out(&entry.address);
        }

        self.active = false;
        self.browser_dirty = true;
    }

    /// Soft stop: remaining pings are treated as complete and moved to the
    /// finished set; with nothing left this falls through to cancel.
    pub fn stop_server_query(&mut self) {
        if !self.active {
            return;
        }
        self.pending.packets.clear();
        if self.pending.pings.is_empty() {
            self.cancel_server_query();
        } else {
            while let Some(entry) = self.pending.pings.pop() {
                self.pending.finished.insert(entry.address);
            }
        }
    }

    fn mark_unresponded_timed_out(&mut self, addr: &ServerAddr) {
        if let Some(si) = self.registry.find_mut(addr) {
            if !si.has_responded() {
                si.status = StatusFlags::TIMED_OUT;
            }
        }
    }

    // ===================================================================
    // Tick processing
    // ===================================================================

    pub(crate) fn process_master_server_query(&mut self, session: u32) {
        if session != self.session || !self.active || self.got_first_list_packet {
            return;
        }

        let now = self.sched.now();
        let mut keep_going = true;

        let Some(fetch) = self.master_fetch else {
            return;
        };
        let due = fetch.time == 0 || fetch.time + self.tunables.master_timeout_ms < now;

        if due {
            if fetch.try_count == 0 {
                log::info!("[query] server list request to {} timed out", fetch.address);
                self.masters.remove(&fetch.address);
                keep_going = self.pick_master();
                if keep_going {
                    self.progress.update("Switching master servers...", 0.0);
                }
            }

            if keep_going {
                let key = self.next_key();
                let mut addr = fetch.address;
                let mut tries_left = 0;
                if let Some(fetch) = self.master_fetch.as_mut() {
                    fetch.try_count -= 1;
                    fetch.time = now;
                    fetch.key = key;
                    addr = fetch.address;
                    tries_left = fetch.try_count;
                }

                let request = self.build_list_request(LIST_REQUEST_ALL_PAGES, false);
                let token = wire_token(session, key);
                match request.encode(self.filter.query_flags, token) {
                    Ok(bytes) => self.send(&bytes, &addr),
                    Err(err) => log::warn!("[query] list request encode failed: {}", err),
                }

                log::info!(
                    "[query] requesting the server list from master server {} ({} tries left)...",
                    addr,
                    tries_left
                );
                if tries_left + 1 < self.tunables.master_retry_count {
                    self.progress.update("Retrying the master server...", 0.0);
                }
            }
        }

        if keep_going {
            self.sched
                .submit_in(Event::MasterQuery { session }, TICK_GRANULARITY_MS);
        } else {
            log::warn!("[query] there are no more master servers to try");
            self.master_fetch = None;
            // Fall back to the LAN probes already queued.
            self.process_pings_and_queries(self.session);
        }
    }

    pub(crate) fn process_pings_and_queries(&mut self, session: u32) {
        if session != self.session {
            return;
        }

        let now = self.sched.now();
        let flags = QUERY_FLAG_NO_STRING_COMPRESS;
        let waiting_for_master = self.waiting_for_master();

        // Ping fan-out: service the queue prefix up to the cap. A removed
        // entry is processed in place so the next candidate slides up; a
        // send advances the slot index.
        let mut i = 0;
        while i < self.pending.pings.len() && i < self.tunables.max_concurrent_pings {
            let entry = &self.pending.pings[i];
            let due = entry.time == 0 || entry.time + self.tunables.ping_timeout_ms < now;
            if !due {
                i += 1;
                continue;
            }

            if entry.try_count == 0 {
                let entry = self.pending.pings.remove(i);
                if !entry.broadcast {
                    log::info!("[query] ping to server {} timed out", entry.address);
                }
                if let Some(si) = self.registry.find_mut(&entry.address) {
                    si.status = StatusFlags::TIMED_OUT;
                    self.browser_dirty = true;
                }
                self.pending.finished.insert(entry.address);
                if !waiting_for_master {
                    self.update_ping_progress();
                }
            } else {
                let key = self.next_key();
                let entry = &mut self.pending.pings[i];
                entry.try_count -= 1;
                entry.time = now;
                entry.key = key;
                let addr = entry.address;
                let broadcast = entry.broadcast;
                let token = wire_token(entry.session, key);
                let tries_left = entry.try_count;

                if broadcast {
                    log::info!("[query] LAN server ping: {}...", addr);
                } else {
                    log::info!("[query] pinging server {} ({})...", addr, tries_left);
                }
                self.send_header_only(PacketType::GamePingRequest, flags, token, &addr);
                #[cfg(feature = "nat")]
                if !broadcast {
                    self.mirror_probe(PacketType::MasterServerGamePingRequest, addr, flags, token);
                }
                i += 1;
            }
        }

        // Query fan-out starts once pings drain and the master fetch is
        // not still owed its first page.
        if self.pending.pings.is_empty() && !waiting_for_master {
            let mut i = 0;
            while i < self.pending.queries.len() && i < self.tunables.max_concurrent_queries {
                let (due, addr, try_count) = {
                    let entry = &self.pending.queries[i];
                    (
                        entry.time == 0 || entry.time + self.tunables.query_timeout_ms < now,
                        entry.address,
                        entry.try_count,
                    )
                };
                if !due {
                    i += 1;
                    continue;
                }

                if self.registry.find(&addr).is_none() {
                    // The record was filtered away; drop the query.
                    self.pending.queries.remove(i);
                    self.browser_dirty = true;
                    continue;
                }

                if try_count == 0 {
                    log::info!("[query] query to server {} timed out", addr);
                    self.pending.queries.remove(i);
                    if let Some(si) = self.registry.find_mut(&addr) {
                        si.status = StatusFlags::TIMED_OUT;
                    }
                    self.browser_dirty = true;
                } else {
                    let key = self.next_key();
                    let entry = &mut self.pending.queries[i];
                    entry.try_count -= 1;
                    entry.time = now;
                    entry.key = key;
                    let token = wire_token(entry.session, key);
                    let tries_left = entry.try_count;

                    log::info!("[query] querying server {} ({})...", addr, tries_left);
                    self.send_header_only(PacketType::GameInfoRequest, flags, token, &addr);
                    #[cfg(feature = "nat")]
                    self.mirror_probe(PacketType::MasterServerGameInfoRequest, addr, flags, token);

                    if let Some(si) = self.registry.find_mut(&addr) {
                        if !si.is_querying() {
                            si.status.set(StatusFlags::QUERYING);
                            self.browser_dirty = true;
                        }
                    }
                    i += 1;
                }
            }
        }

        if !self.pending.pings.is_empty()
            || !self.pending.queries.is_empty()
            || waiting_for_master
        {
            self.sched
                .submit_in(Event::PingTick { session }, TICK_GRANULARITY_MS);
        } else {
            let found = self.registry.len();
            let message = match found {
                0 => "No servers found.".to_string(),
                1 => "One server found.".to_string(),
                n => format!("{} servers found.", n),
            };
            log::info!("[query] {}", message);
            self.progress.done(&message, 1.0);
        }
    }

    pub(crate) fn process_server_list_packets(&mut self, session: u32) {
        if session != self.session || !self.active {
            return;
        }

        let now = self.sched.now();
        let mut i = 0;
        while i < self.pending.packets.len() {
            let packet = &self.pending.packets[i];
            if packet.time + self.tunables.packet_timeout_ms >= now {
                i += 1;
                continue;
            }
            if packet.try_count == 0 {
                log::info!(
                    "[query] server list packet #{} timed out",
                    packet.index + 1
                );
                self.pending.packets.remove(i);
                continue;
            }

            log::info!(
                "[query] rerequesting server list packet #{}...",
                self.pending.packets[i].index + 1
            );
            let key = self.next_key();
            let packet = &mut self.pending.packets[i];
            packet.try_count -= 1;
            packet.time = now;
            packet.key = key;
            let page_index = packet.index;

            // Page re-requests reuse the session with an empty filter body;
            // the master pages a list it already computed.
            let request = self.build_list_request(page_index, true);
            let token = wire_token(session, key);
            if let Some(addr) = self.master_query_addr {
                match request.encode(self.filter.query_flags, token) {
                    Ok(bytes) => self.send(&bytes, &addr),
                    Err(err) => log::warn!("[query] page request encode failed: {}", err),
                }
            }
            i += 1;
        }

        if !self.pending.packets.is_empty() {
            self.sched
                .submit_in(Event::PacketTick { session }, PACKET_TICK_GRANULARITY_MS);
        } else {
            self.process_pings_and_queries(self.session);
        }
    }

    // ===================================================================
    // Internals
    // ===================================================================

    pub(crate) fn next_key(&mut self) -> u16 {
        self.key = self.key.wrapping_add(1);
        self.key
    }

    /// A Normal query holds the fan-out transitions until the master's
    /// first list page arrives. Once the master working copy is exhausted
    /// (no fetch in flight) the session stops waiting and runs on whatever
    /// is queued.
    pub(crate) fn waiting_for_master(&self) -> bool {
        self.filter.query_type == QueryType::Normal
            && !self.got_first_list_packet
            && self.active
            && self.master_fetch.is_some()
    }

    pub(crate) fn preferred_region(&self) -> u32 {
        self.prefs.get_u32_or(KEY_REGION_MASK, 1)
    }

    /// Reset the master fetch onto a freshly selected master. False when
    /// the working copy is exhausted.
    pub(crate) fn pick_master(&mut self) -> bool {
        let region = self.preferred_region();
        match self.masters.pick(self.sched.now(), region) {
            Some(address) => {
                self.master_fetch = Some(MasterFetch {
                    address,
                    key: 0,
                    time: 0,
                    try_count: self.tunables.master_retry_count,
                });
                true
            }
            None => {
                self.master_fetch = None;
                false
            }
        }
    }

    fn apply_filter_params(
        &mut self,
        query_type: QueryType,
        flags: u8,
        params: &QueryParams,
        buddy_list: &[u32],
    ) {
        self.filter = FilterSpec {
            query_type,
            game_type: params.game_type.clone(),
            mission_type: params.mission_type.clone(),
            // The engine always asks for uncompressed strings; the peer's
            // compressed form belongs to the transport helper we don't carry.
            query_flags: flags | QUERY_FLAG_NO_STRING_COMPRESS,
            min_players: params.min_players,
            max_players: params.max_players,
            max_bots: params.max_bots,
            region_mask: params.region_mask,
            max_ping: params.max_ping,
            filter_flags: params.filter_flags,
            min_cpu: params.min_cpu,
            buddy_list: buddy_list.to_vec(),
        };
    }

    fn build_list_request(&self, page_index: u8, empty_filter: bool) -> MasterServerListRequest {
        if empty_filter {
            return MasterServerListRequest {
                page_index,
                ..MasterServerListRequest::default()
            };
        }
        MasterServerListRequest {
            page_index,
            game_type: self.filter.game_type.clone(),
            mission_type: self.filter.mission_type.clone(),
            min_players: self.filter.min_players,
            max_players: self.filter.max_players,
            region_mask: self.filter.region_mask,
            version: BUILD_VERSION,
            filter_flags: self.filter.filter_flags,
            max_bots: self.filter.max_bots,
            min_cpu: self.filter.min_cpu,
            buddy_list: self.filter.buddy_list.clone(),
        }
    }

    /// Queue the LAN broadcast probes (IP always, IPX where the transport
    /// can route it).
    fn seed_lan_probes(&mut self, lan_port: u16) {
        self.pending
            .push_ping_broadcast(ServerAddr::broadcast(lan_port), self.session);
        self.pending
            .push_ping_broadcast(ServerAddr::ipx_broadcast(lan_port), self.session);
    }

    /// Reload favorites from the preference store; names show in the
    /// browse list before any ping answer arrives.
    fn push_server_favorites(&mut self) {
        let count = self.prefs.get_u32_or(KEY_FAVORITE_COUNT, 0);
        for i in 0..count {
            let line = self
                .prefs
                .get_string(&format!("{}{}", KEY_FAVORITE_PREFIX, i));
            if line.is_empty() {
                continue;
            }
            let Some((name, addr_text)) = line.split_once('\t') else {
                log::warn!("[query] bad favorite line {}: {}", i, line);
                continue;
            };
            let Ok(addr) = addr_text.trim().parse::<ServerAddr>() else {
                log::warn!("[query] bad favorite address {}: {}", i, addr_text);
                continue;
            };

            let si = self.registry.find_or_create(addr);
            si.name = truncate_name(name);
            si.is_favorite = true;
            if self
                .pending
                .push_ping_request(addr, self.session, self.tunables.ping_retry_count)
            {
                self.server_ping_count += 1;
            }
        }
    }

    pub(crate) fn update_ping_progress(&mut self) {
        if self.pending.pings.is_empty() {
            self.update_query_progress();
            return;
        }

        let pings_left = self.pending.ping_request_count() as u32;
        let message = if pings_left == 0 {
            "Waiting for lan servers...".to_string()
        } else {
            format!("Pinging servers: {} left...", pings_left)
        };

        // Ping progress spans 0.0 - 0.5.
        let mut progress = 0.0;
        if self.server_ping_count > 0 {
            progress = (self.server_ping_count.saturating_sub(pings_left)) as f32
                / (self.server_ping_count * 2) as f32;
        }
        self.progress.ping(&message, progress);
    }

    pub(crate) fn update_query_progress(&mut self) {
        if !self.pending.pings.is_empty() {
            return;
        }

        let queries_left = self.pending.queries.len() as u32;
        let message = format!("Querying servers: {} left...", queries_left);

        // Query progress spans 0.5 - 1.0.
        let mut progress = 0.5;
        if self.server_query_count > 0 {
            progress += (self.server_query_count.saturating_sub(queries_left)) as f32
                / (self.server_query_count * 2) as f32;
        }
        self.progress.query(&message, progress);
    }

    pub(crate) fn send(&self, payload: &[u8], addr: &ServerAddr) {
        if let Err(err) = self.transport.send_to(payload, addr) {
            // Equivalent to a missed response; the next tick retries.
            log::debug!("[query] send to {} failed: {}", addr, err);
        }
    }

    pub(crate) fn send_header_only(
        &self,
        packet_type: PacketType,
        flags: u8,
        token: u32,
        addr: &ServerAddr,
    ) {
        match encode_header_only(packet_type, flags, token) {
            Ok(bytes) => self.send(&bytes, addr),
            Err(err) => log::warn!("[query] encode of {:?} failed: {}", packet_type, err),
        }
    }
}

/// Clamp a server name to the wire limit without splitting a character.
pub(crate) fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_SERVER_NAME_LEN {
        return name.to_string();
    }
    let mut end = MAX_SERVER_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}
