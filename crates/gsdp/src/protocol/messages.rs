// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed message structs with wire encode/decode.
//!
//! `encode` produces a complete datagram (header included); `decode_body`
//! parses the payload after the dispatcher has consumed the three header
//! fields. Unicast endpoints travel as four raw octets plus a u16 port.

use crate::core::addr::ServerAddr;
use crate::core::ser::{PacketReader, PacketWriter, WireError, WireResult};
use crate::protocol::constants::PacketType;

/// Common datagram header: `u8 packet_type, u8 flags, u32 token`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub token: u32,
}

impl PacketHeader {
    pub fn write(&self, w: &mut PacketWriter) -> WireResult<()> {
        w.write_u8(self.packet_type as u8)?;
        w.write_u8(self.flags)?;
        w.write_u32(self.token)
    }

    pub fn read(r: &mut PacketReader) -> WireResult<Self> {
        let raw = r.read_u8()?;
        let packet_type = PacketType::from_u8(raw).ok_or(WireError::InvalidData {
            reason: format!("unknown packet type {}", raw),
        })?;
        let flags = r.read_u8()?;
        let token = r.read_u32()?;
        Ok(Self {
            packet_type,
            flags,
            token,
        })
    }
}

/// Build a header-only datagram (`GamePingRequest`, `GameInfoRequest`,
/// `GameHeartbeat`, ...).
pub fn encode_header_only(packet_type: PacketType, flags: u8, token: u32) -> WireResult<Vec<u8>> {
    let mut w = PacketWriter::new();
    PacketHeader {
        packet_type,
        flags,
        token,
    }
    .write(&mut w)?;
    Ok(w.into_bytes())
}

fn write_addr(w: &mut PacketWriter, addr: &ServerAddr) -> WireResult<()> {
    let octets = addr.octets().ok_or(WireError::InvalidData {
        reason: "broadcast address has no wire form".into(),
    })?;
    w.write_bytes(&octets)?;
    w.write_u16(addr.port())
}

fn read_addr(r: &mut PacketReader) -> WireResult<ServerAddr> {
    let bytes = r.read_bytes(4)?;
    let octets = [bytes[0], bytes[1], bytes[2], bytes[3]];
    let port = r.read_u16()?;
    Ok(ServerAddr::new(octets, port))
}

// =======================================================================
// Master directory messages
// =======================================================================

/// Filtered server-list request sent to a master.
///
/// A `page_index` of [`LIST_REQUEST_ALL_PAGES`] asks for every page; the
/// per-page re-request form carries a concrete index and an empty filter
/// body (protocol requirement, see the list-page timer).
///
/// [`LIST_REQUEST_ALL_PAGES`]: crate::protocol::constants::LIST_REQUEST_ALL_PAGES
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MasterServerListRequest {
    pub page_index: u8,
    pub game_type: String,
    pub mission_type: String,
    pub min_players: u8,
    pub max_players: u8,
    pub region_mask: u32,
    pub version: u32,
    pub filter_flags: u8,
    pub max_bots: u8,
    pub min_cpu: u16,
    pub buddy_list: Vec<u32>,
}

impl MasterServerListRequest {
    pub fn encode(&self, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type: PacketType::MasterServerListRequest,
            flags,
            token,
        }
        .write(&mut w)?;
        w.write_u8(self.page_index)?;
        w.write_string_short(&self.game_type)?;
        w.write_string_short(&self.mission_type)?;
        w.write_u8(self.min_players)?;
        w.write_u8(self.max_players)?;
        w.write_u32(self.region_mask)?;
        w.write_u32(self.version)?;
        w.write_u8(self.filter_flags)?;
        w.write_u8(self.max_bots)?;
        w.write_u16(self.min_cpu)?;
        if self.buddy_list.len() > u8::MAX as usize {
            return Err(WireError::InvalidData {
                reason: "buddy list longer than 255 entries".into(),
            });
        }
        w.write_u8(self.buddy_list.len() as u8)?;
        for guid in &self.buddy_list {
            w.write_u32(*guid)?;
        }
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        let page_index = r.read_u8()?;
        let game_type = r.read_string_short()?;
        let mission_type = r.read_string_short()?;
        let min_players = r.read_u8()?;
        let max_players = r.read_u8()?;
        let region_mask = r.read_u32()?;
        let version = r.read_u32()?;
        let filter_flags = r.read_u8()?;
        let max_bots = r.read_u8()?;
        let min_cpu = r.read_u16()?;
        let buddy_count = r.read_u8()?;
        let mut buddy_list = Vec::with_capacity(buddy_count as usize);
        for _ in 0..buddy_count {
            buddy_list.push(r.read_u32()?);
        }
        Ok(Self {
            page_index,
            game_type,
            mission_type,
            min_players,
            max_players,
            region_mask,
            version,
            filter_flags,
            max_bots,
            min_cpu,
            buddy_list,
        })
    }
}

/// One page of the master's server list.
///
/// A nonzero header `flags` signals that the first tuple is the requester's
/// own public address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterServerListResponse {
    pub page_index: u8,
    pub page_total: u8,
    pub servers: Vec<ServerAddr>,
}

impl MasterServerListResponse {
    pub fn encode(&self, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type: PacketType::MasterServerListResponse,
            flags,
            token,
        }
        .write(&mut w)?;
        w.write_u8(self.page_index)?;
        w.write_u8(self.page_total)?;
        if self.servers.len() > u16::MAX as usize {
            return Err(WireError::InvalidData {
                reason: "server list page longer than 65535 entries".into(),
            });
        }
        w.write_u16(self.servers.len() as u16)?;
        for addr in &self.servers {
            write_addr(&mut w, addr)?;
        }
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        let page_index = r.read_u8()?;
        let page_total = r.read_u8()?;
        let count = r.read_u16()?;
        let mut servers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            servers.push(read_addr(r)?);
        }
        Ok(Self {
            page_index,
            page_total,
            servers,
        })
    }
}

/// Game and mission type lists published by a master.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MasterServerGameTypesResponse {
    pub games: Vec<String>,
    pub missions: Vec<String>,
}

impl MasterServerGameTypesResponse {
    pub fn encode(&self, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type: PacketType::MasterServerGameTypesResponse,
            flags,
            token,
        }
        .write(&mut w)?;
        for list in [&self.games, &self.missions] {
            if list.len() > u8::MAX as usize {
                return Err(WireError::InvalidData {
                    reason: "type list longer than 255 entries".into(),
                });
            }
            w.write_u8(list.len() as u8)?;
            for name in list {
                w.write_string_short(name)?;
            }
        }
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        let mut lists: [Vec<String>; 2] = [Vec::new(), Vec::new()];
        for list in &mut lists {
            let count = r.read_u8()?;
            for _ in 0..count {
                list.push(r.read_string_short()?);
            }
        }
        let [games, missions] = lists;
        Ok(Self { games, missions })
    }
}

// =======================================================================
// Ping / info exchanges
// =======================================================================

/// Liveness reply: protocol compatibility facts plus the server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GamePingResponse {
    pub version_tag: String,
    pub cur_protocol: u32,
    pub min_protocol: u32,
    pub build: u32,
    pub name: String,
}

impl GamePingResponse {
    pub fn encode(&self, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type: PacketType::GamePingResponse,
            flags,
            token,
        }
        .write(&mut w)?;
        w.write_string_short(&self.version_tag)?;
        w.write_u32(self.cur_protocol)?;
        w.write_u32(self.min_protocol)?;
        w.write_u32(self.build)?;
        w.write_string_short(&self.name)?;
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        Ok(Self {
            version_tag: r.read_string_short()?,
            cur_protocol: r.read_u32()?,
            min_protocol: r.read_u32()?,
            build: r.read_u32()?,
            name: r.read_string_short()?,
        })
    }
}

/// Detailed info reply: rules, mission, occupancy, machine facts and the
/// host-supplied content string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInfoResponse {
    pub game_type: String,
    pub mission_type: String,
    pub mission_name: String,
    pub status: u8,
    pub num_players: u8,
    pub max_players: u8,
    pub num_bots: u8,
    pub cpu_speed: u16,
    pub info: String,
    pub content: String,
}

impl GameInfoResponse {
    pub fn encode(&self, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type: PacketType::GameInfoResponse,
            flags,
            token,
        }
        .write(&mut w)?;
        w.write_string_short(&self.game_type)?;
        w.write_string_short(&self.mission_type)?;
        w.write_string_short(&self.mission_name)?;
        w.write_u8(self.status)?;
        w.write_u8(self.num_players)?;
        w.write_u8(self.max_players)?;
        w.write_u8(self.num_bots)?;
        w.write_u16(self.cpu_speed)?;
        w.write_string_short(&self.info)?;
        w.write_string_long(&self.content)?;
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        Ok(Self {
            game_type: r.read_string_short()?,
            mission_type: r.read_string_short()?,
            mission_name: r.read_string_short()?,
            status: r.read_u8()?,
            num_players: r.read_u8()?,
            max_players: r.read_u8()?,
            num_bots: r.read_u8()?,
            cpu_speed: r.read_u16()?,
            info: r.read_string_short()?,
            content: r.read_string_long()?,
        })
    }
}

/// Richer info reply sent to masters: adds the invite code, region mask,
/// build version and the player GUID roster (padded to `player count` with
/// zeros on encode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameMasterInfoResponse {
    pub game_type: String,
    pub mission_type: String,
    pub invite_code: String,
    pub open_slots: u8,
    pub region_mask: u32,
    pub version: u32,
    pub status: u8,
    pub num_bots: u8,
    pub cpu_speed: u16,
    pub player_guids: Vec<u32>,
}

impl GameMasterInfoResponse {
    pub fn encode(&self, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type: PacketType::GameMasterInfoResponse,
            flags,
            token,
        }
        .write(&mut w)?;
        w.write_string_short(&self.game_type)?;
        w.write_string_short(&self.mission_type)?;
        w.write_string_short(&self.invite_code)?;
        w.write_u8(self.open_slots)?;
        w.write_u32(self.region_mask)?;
        w.write_u32(self.version)?;
        w.write_u8(self.status)?;
        w.write_u8(self.num_bots)?;
        w.write_u16(self.cpu_speed)?;
        if self.player_guids.len() > u8::MAX as usize {
            return Err(WireError::InvalidData {
                reason: "player roster longer than 255 entries".into(),
            });
        }
        w.write_u8(self.player_guids.len() as u8)?;
        for guid in &self.player_guids {
            w.write_u32(*guid)?;
        }
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        let game_type = r.read_string_short()?;
        let mission_type = r.read_string_short()?;
        let invite_code = r.read_string_short()?;
        let open_slots = r.read_u8()?;
        let region_mask = r.read_u32()?;
        let version = r.read_u32()?;
        let status = r.read_u8()?;
        let num_bots = r.read_u8()?;
        let cpu_speed = r.read_u16()?;
        let player_count = r.read_u8()?;
        let mut player_guids = Vec::with_capacity(player_count as usize);
        for _ in 0..player_count {
            player_guids.push(r.read_u32()?);
        }
        Ok(Self {
            game_type,
            mission_type,
            invite_code,
            open_slots,
            region_mask,
            version,
            status,
            num_bots,
            cpu_speed,
            player_guids,
        })
    }
}

// =======================================================================
// NAT traversal profile
// =======================================================================

/// Ask a master to introduce us to `target` (arranged connection) or to
/// nominate a relay for `target`; also the body of the master-relayed probe
/// mirrors, where the header token is the probe's own token.
#[cfg(feature = "nat")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetedRequest {
    pub target: ServerAddr,
}

#[cfg(feature = "nat")]
impl TargetedRequest {
    pub fn encode(
        &self,
        packet_type: PacketType,
        flags: u8,
        token: u32,
    ) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type,
            flags,
            token,
        }
        .write(&mut w)?;
        write_addr(&mut w, &self.target)?;
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        Ok(Self {
            target: read_addr(r)?,
        })
    }
}

/// Candidate-address list used by both directions of the arranged handshake.
#[cfg(feature = "nat")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrangedCandidates {
    /// Present on the hosting side (`ClientRequestedArrangedConnection`),
    /// absent on `ArrangedConnectionAccepted`.
    pub client_id: Option<u16>,
    pub candidates: Vec<ServerAddr>,
}

#[cfg(feature = "nat")]
impl ArrangedCandidates {
    pub fn encode(
        &self,
        packet_type: PacketType,
        flags: u8,
        token: u32,
    ) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type,
            flags,
            token,
        }
        .write(&mut w)?;
        if let Some(id) = self.client_id {
            w.write_u16(id)?;
        }
        if self.candidates.len() > u8::MAX as usize {
            return Err(WireError::InvalidData {
                reason: "candidate list longer than 255 entries".into(),
            });
        }
        w.write_u8(self.candidates.len() as u8)?;
        for addr in &self.candidates {
            write_addr(&mut w, addr)?;
        }
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader, with_client_id: bool) -> WireResult<Self> {
        let client_id = if with_client_id {
            Some(r.read_u16()?)
        } else {
            None
        };
        let count = r.read_u8()?;
        let mut candidates = Vec::with_capacity(count as usize);
        for _ in 0..count {
            candidates.push(read_addr(r)?);
        }
        Ok(Self {
            client_id,
            candidates,
        })
    }
}

/// Relay nomination from a master: who hosts, and where the relay listens.
#[cfg(feature = "nat")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterServerRelayResponse {
    pub is_host: bool,
    pub relay: ServerAddr,
}

#[cfg(feature = "nat")]
impl MasterServerRelayResponse {
    pub fn encode(&self, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type: PacketType::MasterServerRelayResponse,
            flags,
            token,
        }
        .write(&mut w)?;
        w.write_u8(u8::from(self.is_host))?;
        write_addr(&mut w, &self.relay)?;
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        Ok(Self {
            is_host: r.read_u8()? != 0,
            relay: read_addr(r)?,
        })
    }
}

/// Invite-code join broadcast and its answer. A host of `255.255.255.255`
/// in the response means "use the datagram's sender address".
#[cfg(feature = "nat")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterServerJoinInvite {
    pub code: String,
}

#[cfg(feature = "nat")]
impl MasterServerJoinInvite {
    pub fn encode(&self, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type: PacketType::MasterServerJoinInvite,
            flags,
            token,
        }
        .write(&mut w)?;
        w.write_string_short(&self.code)?;
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        Ok(Self {
            code: r.read_string_short()?,
        })
    }
}

#[cfg(feature = "nat")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterServerJoinInviteResponse {
    pub found: bool,
    pub host: ServerAddr,
}

#[cfg(feature = "nat")]
impl MasterServerJoinInviteResponse {
    pub fn encode(&self, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type: PacketType::MasterServerJoinInviteResponse,
            flags,
            token,
        }
        .write(&mut w)?;
        w.write_u8(u8::from(self.found))?;
        write_addr(&mut w, &self.host)?;
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        Ok(Self {
            found: r.read_u8()? != 0,
            host: read_addr(r)?,
        })
    }
}

/// Master-relayed probe response: the origin endpoint followed by the
/// embedded reply datagram, which is re-dispatched as if it had arrived
/// from the origin directly.
#[cfg(feature = "nat")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedResponse {
    pub origin: ServerAddr,
    pub inner: Vec<u8>,
}

#[cfg(feature = "nat")]
impl RelayedResponse {
    pub fn encode(&self, packet_type: PacketType, flags: u8, token: u32) -> WireResult<Vec<u8>> {
        let mut w = PacketWriter::new();
        PacketHeader {
            packet_type,
            flags,
            token,
        }
        .write(&mut w)?;
        write_addr(&mut w, &self.origin)?;
        w.write_bytes(&self.inner)?;
        Ok(w.into_bytes())
    }

    pub fn decode_body(r: &mut PacketReader) -> WireResult<Self> {
        let origin = read_addr(r)?;
        let inner = r.read_bytes(r.remaining())?.to_vec();
        Ok(Self { origin, inner })
    }
}
