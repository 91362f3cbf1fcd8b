// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet-type ids and flag bits.
//!
//! Packet ids are even by convention, request/response pairs adjacent. Ids
//! 40 and above belong to the NAT traversal profile.

/// Datagram discriminator, first byte of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    MasterServerGameTypesRequest = 2,
    MasterServerGameTypesResponse = 4,
    MasterServerListRequest = 6,
    MasterServerListResponse = 8,
    GameMasterInfoRequest = 10,
    GameMasterInfoResponse = 12,
    GamePingRequest = 14,
    GamePingResponse = 16,
    GameInfoRequest = 18,
    GameInfoResponse = 20,
    GameHeartbeat = 22,

    // NAT traversal profile
    MasterServerRequestArrangedConnection = 40,
    MasterServerClientRequestedArrangedConnection = 42,
    MasterServerAcceptArrangedConnection = 44,
    MasterServerArrangedConnectionAccepted = 46,
    MasterServerArrangedConnectionRejected = 48,
    MasterServerGamePingRequest = 50,
    MasterServerGamePingResponse = 52,
    MasterServerGameInfoRequest = 54,
    MasterServerGameInfoResponse = 56,
    MasterServerRelayRequest = 58,
    MasterServerRelayResponse = 60,
    MasterServerRelayReady = 62,
    MasterServerJoinInvite = 64,
    MasterServerJoinInviteResponse = 66,
}

impl PacketType {
    /// Map a wire byte back to a packet type. Unknown ids yield `None` and
    /// the datagram is dropped by the dispatcher.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        use PacketType::*;
        Some(match value {
            2 => MasterServerGameTypesRequest,
            4 => MasterServerGameTypesResponse,
            6 => MasterServerListRequest,
            8 => MasterServerListResponse,
            10 => GameMasterInfoRequest,
            12 => GameMasterInfoResponse,
            14 => GamePingRequest,
            16 => GamePingResponse,
            18 => GameInfoRequest,
            20 => GameInfoResponse,
            22 => GameHeartbeat,
            40 => MasterServerRequestArrangedConnection,
            42 => MasterServerClientRequestedArrangedConnection,
            44 => MasterServerAcceptArrangedConnection,
            46 => MasterServerArrangedConnectionAccepted,
            48 => MasterServerArrangedConnectionRejected,
            50 => MasterServerGamePingRequest,
            52 => MasterServerGamePingResponse,
            54 => MasterServerGameInfoRequest,
            56 => MasterServerGameInfoResponse,
            58 => MasterServerRelayRequest,
            60 => MasterServerRelayResponse,
            62 => MasterServerRelayReady,
            64 => MasterServerJoinInvite,
            66 => MasterServerJoinInviteResponse,
            _ => return None,
        })
    }
}

// =======================================================================
// Query flags (header `flags` byte)
// =======================================================================

/// Authenticated query through a master (flag byte of zero).
pub const QUERY_FLAGS_ONLINE: u8 = 0;
/// Self-directed query; listening servers ignore these when online.
pub const QUERY_FLAG_OFFLINE: u8 = 1 << 0;
/// Responder must use the uncompressed short-string form.
pub const QUERY_FLAG_NO_STRING_COMPRESS: u8 = 1 << 1;

// =======================================================================
// Filter flags (master-side and client-side filtering)
// =======================================================================

pub const FILTER_FLAG_DEDICATED: u8 = 1 << 0;
pub const FILTER_FLAG_NOT_PASSWORDED: u8 = 1 << 1;
pub const FILTER_FLAG_LINUX: u8 = 1 << 2;
/// Retained in the wire layout for forward compatibility; build-version
/// mismatches always drop the candidate regardless of this bit.
pub const FILTER_FLAG_CURRENT_VERSION: u8 = 1 << 7;

// =======================================================================
// Server status bits (published in info responses)
// =======================================================================

pub const STATUS_BIT_LINUX: u8 = 1 << 0;
pub const STATUS_BIT_DEDICATED: u8 = 1 << 1;
pub const STATUS_BIT_PASSWORDED: u8 = 1 << 2;
pub const STATUS_BIT_PRIVATE: u8 = 1 << 3;

/// Page index meaning "send every page" in a master list request.
pub const LIST_REQUEST_ALL_PAGES: u8 = 255;
