// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound datagram dispatch and the packet handlers.
//!
//! The request side answers pings and info queries when this node is
//! hosting; the response side validates every datagram against the pending
//! session/key token before letting it mutate the registry. Anything that
//! fails validation or parsing is dropped, at most with a debug line.

use crate::config::{
    BUILD_VERSION, CURRENT_PROTOCOL_VERSION, KEY_SERVER_BOT_COUNT, KEY_SERVER_CPU_SPEED,
    KEY_SERVER_DEDICATED, KEY_SERVER_GAME_TYPE, KEY_SERVER_GUID_LIST, KEY_SERVER_INFO,
    KEY_SERVER_INVITE_CODE, KEY_SERVER_MAX_PLAYERS, KEY_SERVER_MISSION_NAME,
    KEY_SERVER_MISSION_TYPE, KEY_SERVER_NAME, KEY_SERVER_PASSWORD, KEY_SERVER_PLAYER_COUNT,
    KEY_SERVER_PRIVATE_SLOTS, KEY_SERVER_REGION_MASK, KEY_SERVER_TYPE,
    MIN_REQUIRED_PROTOCOL_VERSION, VERSION_STRING,
};
use crate::core::addr::ServerAddr;
use crate::core::ser::PacketReader;
use crate::discovery::engine::{truncate_name, Event, QueryEngine};
use crate::discovery::filter::QueryType;
use crate::discovery::info::StatusFlags;
use crate::discovery::masters::MasterDirectory;
use crate::discovery::pending::{PacketStatus, Ping};
use crate::protocol::constants::{
    PacketType, QUERY_FLAG_OFFLINE, STATUS_BIT_DEDICATED, STATUS_BIT_LINUX, STATUS_BIT_PASSWORDED,
    STATUS_BIT_PRIVATE,
};
use crate::protocol::messages::{
    GameInfoResponse, GameMasterInfoResponse, GamePingResponse, MasterServerGameTypesResponse,
    MasterServerListResponse, PacketHeader,
};
use crate::protocol::{split_token, wire_token};

impl QueryEngine {
    /// Entry point for every inbound datagram, fed by the host's receive
    /// loop.
    pub fn dispatch(&mut self, from: ServerAddr, payload: &[u8]) {
        let mut r = PacketReader::new(payload);
        let header = match PacketHeader::read(&mut r) {
            Ok(header) => header,
            Err(err) => {
                log::debug!("[query] malformed datagram from {}: {}", from, err);
                return;
            }
        };

        match header.packet_type {
            PacketType::GamePingRequest => self.handle_game_ping_request(from, header),
            PacketType::GamePingResponse => self.handle_game_ping_response(from, &mut r, header),
            PacketType::GameInfoRequest => self.handle_game_info_request(from, header),
            PacketType::GameInfoResponse => self.handle_game_info_response(from, &mut r, header),
            PacketType::GameMasterInfoRequest => {
                self.handle_game_master_info_request(from, header)
            }
            PacketType::MasterServerGameTypesResponse => {
                self.handle_game_types_response(from, &mut r, header)
            }
            PacketType::MasterServerListResponse => {
                self.handle_master_list_response(from, &mut r, header)
            }

            #[cfg(feature = "nat")]
            PacketType::MasterServerClientRequestedArrangedConnection => {
                self.handle_client_requested_arranged(from, &mut r, header)
            }
            #[cfg(feature = "nat")]
            PacketType::MasterServerArrangedConnectionAccepted => {
                self.handle_arranged_accepted(from, &mut r, header)
            }
            #[cfg(feature = "nat")]
            PacketType::MasterServerArrangedConnectionRejected => {
                self.handle_arranged_rejected(from, &mut r, header)
            }
            #[cfg(feature = "nat")]
            PacketType::MasterServerGamePingResponse
            | PacketType::MasterServerGameInfoResponse => {
                self.handle_relayed_response(from, &mut r, header)
            }
            #[cfg(feature = "nat")]
            PacketType::MasterServerRelayResponse => {
                self.handle_relay_response(from, &mut r, header)
            }
            #[cfg(feature = "nat")]
            PacketType::MasterServerRelayReady => self.handle_relay_ready(from),
            #[cfg(feature = "nat")]
            PacketType::MasterServerJoinInvite => self.handle_join_invite(from, &mut r, header),
            #[cfg(feature = "nat")]
            PacketType::MasterServerJoinInviteResponse => {
                self.handle_join_invite_response(from, &mut r, header)
            }

            other => {
                // Master-side requests and everything we never consume.
                log::debug!("[query] ignoring {:?} from {}", other, from);
            }
        }
    }

    // ===================================================================
    // Responder side
    // ===================================================================

    fn handle_game_ping_request(&mut self, from: ServerAddr, header: PacketHeader) {
        if !self.allow_connections {
            return;
        }
        // Single-player nodes never advertise.
        if self
            .prefs
            .get_string(KEY_SERVER_TYPE)
            .eq_ignore_ascii_case("SinglePlayer")
        {
            return;
        }
        if header.flags & QUERY_FLAG_OFFLINE != 0 {
            return;
        }
        // A full server stays silent rather than advertising a seat it
        // cannot grant.
        if self.player_count() >= self.public_slots() {
            return;
        }

        let response = GamePingResponse {
            version_tag: VERSION_STRING.into(),
            cur_protocol: CURRENT_PROTOCOL_VERSION,
            min_protocol: MIN_REQUIRED_PROTOCOL_VERSION,
            build: BUILD_VERSION,
            name: truncate_name(&self.prefs.get_string(KEY_SERVER_NAME)),
        };
        match response.encode(header.flags, header.token) {
            Ok(bytes) => self.send(&bytes, &from),
            Err(err) => log::warn!("[query] ping response encode failed: {}", err),
        }
    }

    fn handle_game_info_request(&mut self, from: ServerAddr, header: PacketHeader) {
        if !self.allow_connections {
            return;
        }
        if header.flags & QUERY_FLAG_OFFLINE != 0 {
            return;
        }

        let response = GameInfoResponse {
            game_type: self.prefs.get_string(KEY_SERVER_GAME_TYPE),
            mission_type: self.prefs.get_string(KEY_SERVER_MISSION_TYPE),
            mission_name: self.prefs.get_string(KEY_SERVER_MISSION_NAME),
            status: self.published_status_bits(false),
            num_players: self.player_count() as u8,
            max_players: self.prefs.get_u32_or(KEY_SERVER_MAX_PLAYERS, 0) as u8,
            num_bots: self.prefs.get_u32_or(KEY_SERVER_BOT_COUNT, 0) as u8,
            cpu_speed: self.prefs.get_u32_or(KEY_SERVER_CPU_SPEED, 0) as u16,
            info: self.prefs.get_string(KEY_SERVER_INFO),
            content: self.content_hook.as_ref().map(|h| h()).unwrap_or_default(),
        };
        match response.encode(header.flags, header.token) {
            Ok(bytes) => self.send(&bytes, &from),
            Err(err) => log::warn!("[query] info response encode failed: {}", err),
        }
    }

    fn handle_game_master_info_request(&mut self, from: ServerAddr, header: PacketHeader) {
        if !self.allow_connections {
            return;
        }

        let from_master = MasterDirectory::load_from(&self.prefs)
            .iter()
            .any(|m| m.address.octets() == from.octets());
        log::info!(
            "[query] received info request from {} [{}]",
            if from_master { "a master server" } else { "a machine" },
            from
        );

        let player_count = self.player_count() as usize;
        let mut guids: Vec<u32> = self
            .prefs
            .get_string(KEY_SERVER_GUID_LIST)
            .split('\t')
            .filter_map(|g| g.trim().parse().ok())
            .take(player_count)
            .collect();
        // The roster is padded to the player count with zeros.
        guids.resize(player_count, 0);

        let response = GameMasterInfoResponse {
            game_type: self.prefs.get_string(KEY_SERVER_GAME_TYPE),
            mission_type: self.prefs.get_string(KEY_SERVER_MISSION_TYPE),
            invite_code: self.prefs.get_string(KEY_SERVER_INVITE_CODE),
            open_slots: self.public_slots() as u8,
            region_mask: self.prefs.get_u32_or(KEY_SERVER_REGION_MASK, 0),
            version: BUILD_VERSION,
            status: self.published_status_bits(true),
            num_bots: self.prefs.get_u32_or(KEY_SERVER_BOT_COUNT, 0) as u8,
            cpu_speed: self.prefs.get_u32_or(KEY_SERVER_CPU_SPEED, 0) as u16,
            player_guids: guids,
        };
        match response.encode(header.flags, header.token) {
            Ok(bytes) => self.send(&bytes, &from),
            Err(err) => log::warn!("[query] master info response encode failed: {}", err),
        }
    }

    pub(crate) fn player_count(&self) -> u32 {
        self.prefs.get_u32_or(KEY_SERVER_PLAYER_COUNT, 0)
    }

    /// Advertised capacity: published maximum minus the reserved slots.
    pub(crate) fn public_slots(&self) -> u32 {
        self.prefs
            .get_u32_or(KEY_SERVER_MAX_PLAYERS, 0)
            .saturating_sub(self.prefs.get_u32_or(KEY_SERVER_PRIVATE_SLOTS, 0))
    }

    pub(crate) fn published_status_bits(&self, include_private: bool) -> u8 {
        let mut status = 0u8;
        if cfg!(target_os = "linux") {
            status |= STATUS_BIT_LINUX;
        }
        if self.prefs.get_bool(KEY_SERVER_DEDICATED) {
            status |= STATUS_BIT_DEDICATED;
        }
        if !self.prefs.get_string(KEY_SERVER_PASSWORD).is_empty() {
            status |= STATUS_BIT_PASSWORDED;
        }
        if include_private && self.prefs.get_u32_or(KEY_SERVER_PRIVATE_SLOTS, 0) > 0 {
            status |= STATUS_BIT_PRIVATE;
        }
        status
    }

    // ===================================================================
    // Requester side
    // ===================================================================

    fn handle_game_ping_response(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        header: PacketHeader,
    ) {
        // Broadcast already timed out, or the query was cancelled.
        if self.pending.pings.is_empty() {
            return;
        }
        let response = match GamePingResponse::decode_body(r) {
            Ok(response) => response,
            Err(err) => {
                log::debug!("[query] bad ping response from {}: {}", from, err);
                return;
            }
        };

        let Some(index) = self.pending.find_ping(&from) else {
            self.handle_unsolicited_ping_response(from, response);
            return;
        };

        let entry = self.pending.pings[index].clone();
        if wire_token(entry.session, entry.key) != header.token {
            return;
        }

        let waiting_for_master = self.waiting_for_master();
        let apply_filter = match self.filter.query_type {
            QueryType::Normal | QueryType::OfflineFiltered => self
                .registry
                .find(&from)
                .map(|si| !si.is_updating())
                .unwrap_or(true),
            _ => false,
        };

        if response.version_tag != VERSION_STRING {
            log::info!("[query] server {} is a different version", from);
            self.fail_ping_candidate(index, &from, false, waiting_for_master);
            return;
        }
        if response.cur_protocol < MIN_REQUIRED_PROTOCOL_VERSION {
            log::info!(
                "[query] protocol for server {} does not meet minimum protocol",
                from
            );
            self.fail_ping_candidate(index, &from, false, waiting_for_master);
            return;
        }
        if CURRENT_PROTOCOL_VERSION < response.min_protocol {
            log::info!(
                "[query] you do not meet the minimum protocol for server {}",
                from
            );
            self.fail_ping_candidate(index, &from, false, waiting_for_master);
            return;
        }

        let rtt = self.sched.now().saturating_sub(entry.time);
        if apply_filter && !self.filter.accepts_ping(rtt) {
            log::info!("[query] server {} filtered out by maximum ping", from);
            self.fail_ping_candidate(index, &from, true, waiting_for_master);
            return;
        }

        // Build-version mismatches always drop the candidate.
        if response.build != BUILD_VERSION {
            log::info!("[query] server {} filtered out by version number", from);
            self.fail_ping_candidate(index, &from, true, waiting_for_master);
            return;
        }

        let si = self.registry.find_or_create(from);
        si.ping = rtt;
        si.version = response.build;
        si.is_local = entry.is_local;
        if si.name.is_empty() {
            si.name = response.name;
        }

        self.pending
            .promote_to_query(index, self.tunables.query_retry_count);
        self.server_query_count += 1;
        if !waiting_for_master {
            self.update_ping_progress();
        }
        self.browser_dirty = true;
    }

    /// An untracked ping response from a not-yet-finished address is a LAN
    /// broadcast discovery: record it as responded and promote it straight
    /// into the query fan-out without re-probing.
    fn handle_unsolicited_ping_response(&mut self, from: ServerAddr, response: GamePingResponse) {
        if self.pending.finished.contains(&from) {
            return;
        }
        if response.version_tag != VERSION_STRING
            || response.cur_protocol < MIN_REQUIRED_PROTOCOL_VERSION
            || CURRENT_PROTOCOL_VERSION < response.min_protocol
            || response.build != BUILD_VERSION
        {
            log::info!("[query] broadcast responder {} is incompatible", from);
            self.pending.finished.insert(from);
            return;
        }

        let session = self.session;
        let si = self.registry.find_or_create(from);
        si.ping = 0;
        si.version = response.build;
        si.is_local = true;
        si.status.set(StatusFlags::RESPONDED);
        if si.name.is_empty() {
            si.name = response.name;
        }

        self.pending.finished.insert(from);
        self.pending.queries.push(Ping {
            address: from,
            session,
            key: 0,
            time: 0,
            try_count: self.tunables.query_retry_count,
            broadcast: false,
            is_local: true,
        });
        self.server_query_count += 1;
        self.browser_dirty = true;
        self.sched.submit_in(Event::PingTick { session }, 1);
    }

    /// Remove a pinged candidate: either keep its record flagged timed out
    /// (compatibility mismatch on a favorite) or evict it entirely (filter
    /// and build failures).
    fn fail_ping_candidate(
        &mut self,
        index: usize,
        addr: &ServerAddr,
        remove_record: bool,
        waiting_for_master: bool,
    ) {
        self.pending.finished.insert(*addr);
        self.pending.pings.remove(index);
        if remove_record {
            if self.registry.remove(addr) {
                self.browser_dirty = true;
            }
        } else if let Some(si) = self.registry.find_mut(addr) {
            si.status = StatusFlags::TIMED_OUT;
            self.browser_dirty = true;
        }
        if !waiting_for_master {
            self.update_ping_progress();
        }
    }

    fn handle_game_info_response(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        header: PacketHeader,
    ) {
        if self.pending.queries.is_empty() {
            return;
        }
        let Some(index) = self.pending.find_query(&from) else {
            return;
        };
        let entry = &self.pending.queries[index];
        if wire_token(entry.session, entry.key) != header.token {
            return;
        }

        let response = match GameInfoResponse::decode_body(r) {
            Ok(response) => response,
            Err(err) => {
                log::debug!("[query] bad info response from {}: {}", from, err);
                return;
            }
        };

        // The server answered; the exchange is over regardless of filters.
        self.pending.queries.remove(index);
        self.update_query_progress();

        let Some(si) = self.registry.find(&from) else {
            return;
        };
        let apply_filter = self.filter.applies_to(si.is_updating());
        let wire_status = StatusFlags::from_wire(response.status);

        if apply_filter {
            if !self.filter.accepts_game_type(&response.game_type) {
                log::info!(
                    "[query] server {} filtered out by rules set ({}:{})",
                    from,
                    self.filter.game_type,
                    response.game_type
                );
                self.remove_record(&from);
                return;
            }
            if !self.filter.accepts_mission_type(&response.mission_type) {
                log::info!(
                    "[query] server {} filtered out by mission type ({}:{})",
                    from,
                    self.filter.mission_type,
                    response.mission_type
                );
                self.remove_record(&from);
                return;
            }
            if self.filter.requires_dedicated() && !wire_status.test(StatusFlags::DEDICATED) {
                log::info!("[query] server {} filtered out by dedicated flag", from);
                self.remove_record(&from);
                return;
            }
            if self.filter.requires_not_passworded() && wire_status.test(StatusFlags::PASSWORDED)
            {
                log::info!("[query] server {} filtered out by no-password flag", from);
                self.remove_record(&from);
                return;
            }
            if !self.filter.accepts_players(response.num_players) {
                log::info!("[query] server {} filtered out by player count", from);
                self.remove_record(&from);
                return;
            }
            if !self.filter.accepts_bots(response.num_bots) {
                log::info!("[query] server {} filtered out by maximum bot count", from);
                self.remove_record(&from);
                return;
            }
            if !self.filter.accepts_cpu(response.cpu_speed) {
                log::info!("[query] server {} filtered out by minimum CPU speed", from);
                self.remove_record(&from);
                return;
            }
        }

        if let Some(si) = self.registry.find_mut(&from) {
            si.game_type = response.game_type;
            si.mission_type = response.mission_type;
            si.mission_name = strip_mission_extension(response.mission_name);
            si.status = wire_status;
            si.status.set(StatusFlags::RESPONDED);
            si.num_players = response.num_players;
            si.max_players = response.max_players;
            si.num_bots = response.num_bots;
            si.cpu_speed = response.cpu_speed;
            si.info_string = response.info;
            si.status_string = response.content;
        }
        self.browser_dirty = true;
    }

    fn remove_record(&mut self, addr: &ServerAddr) {
        if self.registry.remove(addr) {
            self.browser_dirty = true;
        }
    }

    fn handle_master_list_response(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        header: PacketHeader,
    ) {
        let response = match MasterServerListResponse::decode_body(r) {
            Ok(response) => response,
            Err(err) => {
                log::debug!("[query] bad list response from {}: {}", from, err);
                return;
            }
        };

        // First page validates against the fetch key; later pages against
        // their per-page re-request keys.
        let fetch_key = self.master_fetch.map(|f| f.key);
        let packet_key = if self.got_first_list_packet {
            self.pending
                .packets
                .iter()
                .find(|p| p.index == response.page_index)
                .map(|p| p.key)
                .or(fetch_key)
        } else {
            fetch_key
        };
        let Some(packet_key) = packet_key else {
            return;
        };
        if wire_token(self.session, packet_key) != header.token {
            return;
        }

        log::info!(
            "[query] received server list packet {} of {} from the master server ({} servers)",
            response.page_index + 1,
            response.page_total,
            response.servers.len()
        );

        // A nonzero flag byte means the first tuple is our own public
        // address as the master sees it.
        if header.flags != 0 {
            if let Some(own) = response.servers.first() {
                log::info!("[query] master reports our public address as {}", own);
                self.local_addrs.insert(*own);
            }
        }

        for addr in &response.servers {
            if self
                .pending
                .push_ping_request(*addr, self.session, self.tunables.ping_retry_count)
            {
                self.server_ping_count += 1;
            }
        }

        let session = self.session;
        if !self.got_first_list_packet {
            self.got_first_list_packet = true;
            self.master_query_addr = self.master_fetch.map(|f| f.address);

            let now = self.sched.now();
            if let Some(key) = fetch_key {
                for i in 0..response.page_total {
                    if i != response.page_index {
                        self.pending.packets.push(PacketStatus::new(
                            i,
                            key,
                            now,
                            self.tunables.packet_retry_count,
                        ));
                    }
                }
            }
            self.process_server_list_packets(session);
            // The ping fan-out runs while the remaining pages trickle in.
            if !self.pending.packets.is_empty() {
                self.sched.submit_in(Event::PingTick { session }, 1);
            }
        } else if let Some(pos) = self.pending.find_packet(response.page_index) {
            self.pending.packets.remove(pos);
        }
    }

    fn handle_game_types_response(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        header: PacketHeader,
    ) {
        let (session, _key) = split_token(header.token);
        if session != (self.session & 0xFFFF) {
            return;
        }
        let response = match MasterServerGameTypesResponse::decode_body(r) {
            Ok(response) => response,
            Err(err) => {
                log::debug!("[query] bad game types response from {}: {}", from, err);
                return;
            }
        };
        log::info!("[query] received game type list from the master server");
        self.events.game_types(&response.games, &response.missions);
    }
}

/// Mission names are stored without the map-file extension.
fn strip_mission_extension(mut name: String) -> String {
    if let Some(pos) = name.find(".mis") {
        name.truncate(pos);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::testutil::{drain_sent, test_engine, PROBE_PORT};
    use crate::protocol::constants::FILTER_FLAG_DEDICATED;

    fn addr(last: u8) -> ServerAddr {
        ServerAddr::new([10, 0, 0, last], PROBE_PORT)
    }

    fn ping_response() -> GamePingResponse {
        GamePingResponse {
            version_tag: VERSION_STRING.into(),
            cur_protocol: CURRENT_PROTOCOL_VERSION,
            min_protocol: MIN_REQUIRED_PROTOCOL_VERSION,
            build: BUILD_VERSION,
            name: "Peer".into(),
        }
    }

    fn info_response() -> GameInfoResponse {
        GameInfoResponse {
            game_type: "Deathmatch".into(),
            mission_type: "dm".into(),
            mission_name: "Forgotten.mis".into(),
            status: STATUS_BIT_DEDICATED,
            num_players: 3,
            max_players: 16,
            num_bots: 0,
            cpu_speed: 2400,
            info: "info".into(),
            content: "content".into(),
        }
    }

    /// Put one tracked ping entry in flight and return its token.
    fn track_ping(engine: &mut QueryEngine, target: ServerAddr) -> u32 {
        engine.active = true;
        engine
            .pending
            .push_ping_request(target, engine.session, 4);
        let key = engine.next_key();
        let entry = engine.pending.pings.last_mut().expect("entry pushed");
        entry.key = key;
        entry.time = engine.sched.now();
        wire_token(engine.session, key)
    }

    fn track_query(engine: &mut QueryEngine, target: ServerAddr) -> u32 {
        engine.active = true;
        let key = engine.next_key();
        engine.pending.queries.push(Ping {
            address: target,
            session: engine.session,
            key,
            time: 0,
            try_count: 4,
            broadcast: false,
            is_local: false,
        });
        wire_token(engine.session, key)
    }

    #[test]
    fn test_responder_echoes_flags_and_key() {
        let (mut engine, transport) = test_engine();
        engine.set_allow_connections(true);
        engine.prefs.set(KEY_SERVER_NAME, "Midnight Arena");
        engine.prefs.set(KEY_SERVER_MAX_PLAYERS, "16");

        let token = wire_token(9, 1234);
        let request =
            crate::protocol::messages::encode_header_only(PacketType::GamePingRequest, 2, token)
                .expect("encode");
        engine.dispatch(addr(1), &request);

        let sent = drain_sent(&transport);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, addr(1));

        let mut r = PacketReader::new(&sent[0].1);
        let header = PacketHeader::read(&mut r).expect("header");
        assert_eq!(header.packet_type, PacketType::GamePingResponse);
        assert_eq!(header.flags, 2);
        assert_eq!(header.token, token);

        let body = GamePingResponse::decode_body(&mut r).expect("body");
        assert_eq!(body.version_tag, VERSION_STRING);
        assert_eq!(body.name, "Midnight Arena");
    }

    #[test]
    fn test_responder_gates() {
        let (mut engine, transport) = test_engine();
        engine.prefs.set(KEY_SERVER_MAX_PLAYERS, "8");

        let request = crate::protocol::messages::encode_header_only(
            PacketType::GamePingRequest,
            0,
            1,
        )
        .expect("encode");

        // Not accepting connections.
        engine.dispatch(addr(1), &request);
        assert!(drain_sent(&transport).is_empty());

        // Single player.
        engine.set_allow_connections(true);
        engine.prefs.set(KEY_SERVER_TYPE, "SinglePlayer");
        engine.dispatch(addr(1), &request);
        assert!(drain_sent(&transport).is_empty());
        engine.prefs.set(KEY_SERVER_TYPE, "MultiPlayer");

        // Offline-flagged request.
        let offline = crate::protocol::messages::encode_header_only(
            PacketType::GamePingRequest,
            QUERY_FLAG_OFFLINE,
            1,
        )
        .expect("encode");
        engine.dispatch(addr(1), &offline);
        assert!(drain_sent(&transport).is_empty());

        // Full server (8 max, 2 private, 6 players).
        engine.prefs.set(KEY_SERVER_PRIVATE_SLOTS, "2");
        engine.prefs.set(KEY_SERVER_PLAYER_COUNT, "6");
        engine.dispatch(addr(1), &request);
        assert!(drain_sent(&transport).is_empty());

        // One seat free again.
        engine.prefs.set(KEY_SERVER_PLAYER_COUNT, "5");
        engine.dispatch(addr(1), &request);
        assert_eq!(drain_sent(&transport).len(), 1);
    }

    #[test]
    fn test_ping_response_promotes_to_query() {
        let (mut engine, _transport) = test_engine();
        let token = track_ping(&mut engine, addr(1));
        engine.sched.advance_to(42);

        let bytes = ping_response().encode(0, token).expect("encode");
        engine.dispatch(addr(1), &bytes);

        assert!(engine.pending.pings.is_empty());
        assert_eq!(engine.pending.queries.len(), 1);
        assert!(engine.pending.finished.contains(&addr(1)));

        let si = engine.registry.find(&addr(1)).expect("record created");
        assert_eq!(si.ping, 42);
        assert_eq!(si.name, "Peer");
        assert_eq!(si.version, BUILD_VERSION);
    }

    #[test]
    fn test_ping_response_with_stale_token_is_dropped() {
        let (mut engine, _transport) = test_engine();
        let token = track_ping(&mut engine, addr(1));

        let bytes = ping_response().encode(0, token ^ 1).expect("encode");
        engine.dispatch(addr(1), &bytes);

        // Nothing moved; the entry is still pending.
        assert_eq!(engine.pending.pings.len(), 1);
        assert!(engine.pending.queries.is_empty());
        assert!(engine.registry.find(&addr(1)).is_none());
    }

    #[test]
    fn test_version_tag_mismatch_drops_candidate() {
        let (mut engine, _transport) = test_engine();
        let token = track_ping(&mut engine, addr(1));

        let mut response = ping_response();
        response.version_tag = "VER0".into();
        let bytes = response.encode(0, token).expect("encode");
        engine.dispatch(addr(1), &bytes);

        assert!(engine.pending.pings.is_empty());
        assert!(engine.pending.queries.is_empty(), "no query phase");
        assert!(engine.pending.finished.contains(&addr(1)));
        assert!(engine.registry.find(&addr(1)).is_none());
    }

    #[test]
    fn test_build_version_mismatch_evicts_record() {
        let (mut engine, _transport) = test_engine();
        engine.registry.find_or_create(addr(1)).is_favorite = true;
        let token = track_ping(&mut engine, addr(1));

        let mut response = ping_response();
        response.build = BUILD_VERSION + 1;
        let bytes = response.encode(0, token).expect("encode");
        engine.dispatch(addr(1), &bytes);

        assert!(engine.registry.find(&addr(1)).is_none());
        assert!(engine.pending.finished.contains(&addr(1)));
    }

    #[test]
    fn test_max_ping_filter_applies_at_ping_time() {
        let (mut engine, _transport) = test_engine();
        engine.filter.query_type = QueryType::OfflineFiltered;
        engine.filter.max_ping = 100;
        let token = track_ping(&mut engine, addr(1));
        engine.sched.advance_to(250); // rtt 250 > 100

        let bytes = ping_response().encode(0, token).expect("encode");
        engine.dispatch(addr(1), &bytes);

        assert!(engine.registry.find(&addr(1)).is_none());
        assert!(engine.pending.queries.is_empty());
    }

    #[test]
    fn test_unsolicited_ping_response_promotes_without_reprobe() {
        let (mut engine, transport) = test_engine();
        engine.active = true;
        engine.filter.query_type = QueryType::Offline;
        // A broadcast probe is in flight, so the ping list is not empty.
        engine
            .pending
            .push_ping_broadcast(ServerAddr::broadcast(PROBE_PORT), engine.session);
        drain_sent(&transport);

        let bytes = ping_response().encode(0, 7).expect("encode");
        engine.dispatch(addr(9), &bytes);

        let si = engine.registry.find(&addr(9)).expect("record created");
        assert!(si.has_responded());
        assert!(si.is_local);
        assert_eq!(si.ping, 0);
        assert!(engine.pending.find_query(&addr(9)).is_some());
        assert!(engine.pending.finished.contains(&addr(9)));
        // No ping datagram was re-sent toward the responder.
        assert!(drain_sent(&transport)
            .iter()
            .all(|(to, _)| *to != addr(9)));

        // A duplicate of the same response is now ignored.
        let bytes = ping_response().encode(0, 7).expect("encode");
        engine.dispatch(addr(9), &bytes);
        assert_eq!(
            engine
                .pending
                .queries
                .iter()
                .filter(|q| q.address == addr(9))
                .count(),
            1
        );
    }

    #[test]
    fn test_info_response_fills_record() {
        let (mut engine, _transport) = test_engine();
        engine.registry.find_or_create(addr(1));
        let token = track_query(&mut engine, addr(1));

        let bytes = info_response().encode(0, token).expect("encode");
        engine.dispatch(addr(1), &bytes);

        assert!(engine.pending.queries.is_empty());
        let si = engine.registry.find(&addr(1)).expect("record");
        assert!(si.has_responded());
        assert!(si.is_dedicated());
        assert_eq!(si.game_type, "Deathmatch");
        assert_eq!(si.mission_name, "Forgotten", "extension stripped");
        assert_eq!(si.num_players, 3);
        assert_eq!(si.cpu_speed, 2400);
        assert_eq!(si.status_string, "content");
    }

    #[test]
    fn test_info_response_filtered_by_mission_type() {
        let (mut engine, _transport) = test_engine();
        engine.filter.query_type = QueryType::Normal;
        engine.got_first_list_packet = true;
        engine.filter.mission_type = "ctf".into();
        engine.registry.find_or_create(addr(1));
        let token = track_query(&mut engine, addr(1));

        let bytes = info_response().encode(0, token).expect("encode"); // mission "dm"
        engine.dispatch(addr(1), &bytes);

        assert!(engine.registry.find(&addr(1)).is_none(), "record evicted");
        assert!(engine.pending.queries.is_empty());
    }

    #[test]
    fn test_info_filters_skip_updating_records() {
        let (mut engine, _transport) = test_engine();
        engine.filter.query_type = QueryType::Normal;
        engine.got_first_list_packet = true;
        engine.filter.mission_type = "ctf".into();
        engine.filter.filter_flags = FILTER_FLAG_DEDICATED;

        let si = engine.registry.find_or_create(addr(1));
        si.status.set(StatusFlags::UPDATING);
        let token = track_query(&mut engine, addr(1));

        let mut response = info_response();
        response.status = 0; // not dedicated either
        let bytes = response.encode(0, token).expect("encode");
        engine.dispatch(addr(1), &bytes);

        // Refresh in progress: the record survives the failing filters.
        let si = engine.registry.find(&addr(1)).expect("record kept");
        assert!(si.has_responded());
    }

    #[test]
    fn test_master_list_first_page_seeds_pings_and_pages() {
        let (mut engine, _transport) = test_engine();
        engine.prefs.set("client.master0", "1:10.0.0.100:28002");
        engine.query_master_server(PROBE_PORT, 0, &Default::default(), &[]);
        engine.run_until_idle(1); // emit the list request

        let fetch = engine.master_fetch.expect("fetch in flight");
        let token = wire_token(engine.session, fetch.key);

        let page = MasterServerListResponse {
            page_index: 1,
            page_total: 3,
            servers: vec![addr(1), addr(2)],
        };
        let bytes = page.encode(1, token).expect("encode"); // flags=1: first is us
        engine.dispatch(fetch.address, &bytes);

        assert!(engine.got_first_list_packet);
        assert!(engine.is_local_address(&addr(1)));
        assert_eq!(engine.pending.pings.len(), 4, "2 broadcasts + 2 servers");
        // Pages 0 and 2 are outstanding; page 1 was this one.
        assert_eq!(engine.pending.packets.len(), 2);
        assert!(engine.pending.find_packet(1).is_none());

        // The second page retires its status entry.
        let key0 = engine.pending.packets[0].key;
        let page0 = MasterServerListResponse {
            page_index: 0,
            page_total: 3,
            servers: vec![addr(3)],
        };
        let bytes = page0
            .encode(0, wire_token(engine.session, key0))
            .expect("encode");
        engine.dispatch(fetch.address, &bytes);
        assert_eq!(engine.pending.packets.len(), 1);
    }

    #[test]
    fn test_master_list_with_wrong_key_is_dropped() {
        let (mut engine, _transport) = test_engine();
        engine.prefs.set("client.master0", "1:10.0.0.100:28002");
        engine.query_master_server(PROBE_PORT, 0, &Default::default(), &[]);
        engine.run_until_idle(1);

        let fetch = engine.master_fetch.expect("fetch in flight");
        let page = MasterServerListResponse {
            page_index: 0,
            page_total: 1,
            servers: vec![addr(1)],
        };
        let bytes = page
            .encode(0, wire_token(engine.session, fetch.key ^ 0x00FF))
            .expect("encode");
        engine.dispatch(fetch.address, &bytes);

        assert!(!engine.got_first_list_packet);
        assert!(engine.pending.find_ping(&addr(1)).is_none());
    }

    #[test]
    fn test_game_types_response_reaches_events() {
        use crate::discovery::testutil::RecordingEvents;
        use std::sync::Arc;

        let (mut engine, _transport) = test_engine();
        let events = Arc::new(RecordingEvents::default());
        engine.set_session_events(events.clone());

        let response = MasterServerGameTypesResponse {
            games: vec!["Deathmatch".into()],
            missions: vec!["dm".into(), "ctf".into()],
        };
        let bytes = response
            .encode(0, wire_token(engine.session, 1))
            .expect("encode");
        engine.dispatch(addr(1), &bytes);

        let got = events.game_types.lock().clone();
        assert_eq!(got, Some((vec!["Deathmatch".into()], vec!["dm".into(), "ctf".into()])));

        // A stale session is ignored.
        let bytes = response
            .encode(0, wire_token(engine.session + 1, 1))
            .expect("encode");
        engine.dispatch(addr(1), &bytes);
        assert_eq!(events.game_types.lock().clone().map(|g| g.0.len()), Some(1));
    }

    #[test]
    fn test_strip_mission_extension() {
        assert_eq!(strip_mission_extension("Forgotten.mis".into()), "Forgotten");
        assert_eq!(strip_mission_extension("Forgotten".into()), "Forgotten");
        assert_eq!(strip_mission_extension("A.mis.backup".into()), "A");
    }
}
