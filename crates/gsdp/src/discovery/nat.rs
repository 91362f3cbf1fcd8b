// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! NAT traversal profile: arranged connections, relay fallback and
//! invite-code join, all layered on the same datagram channel.
//!
//! Requests go to every configured master; the rendezvous outcomes surface
//! through [`crate::discovery::SessionEvents`], the actual game connection
//! is the host's business. While this profile is enabled, non-broadcast
//! ping/info probes are also mirrored through the masters so that peers
//! behind NATs can be reached during discovery.

use crate::config::{KEY_SERVER_INVITE_CODE, KEY_SERVER_PORT};
use crate::core::addr::ServerAddr;
use crate::core::ser::{PacketReader, PacketWriter};
use crate::discovery::engine::QueryEngine;
use crate::discovery::masters::MasterDirectory;
use crate::protocol::constants::PacketType;
use crate::protocol::messages::{
    ArrangedCandidates, MasterServerJoinInvite, MasterServerJoinInviteResponse,
    MasterServerRelayResponse, PacketHeader, RelayedResponse, TargetedRequest,
};
use crate::protocol::wire_token;

impl QueryEngine {
    // ===================================================================
    // Client operations
    // ===================================================================

    /// Ask every configured master to introduce us to `target` for a
    /// hole-punched connection.
    pub fn request_arranged_connection(&mut self, target: ServerAddr) {
        let key = self.next_key();
        let token = wire_token(self.session, key);
        let request = TargetedRequest { target };
        for master in MasterDirectory::load_from(&self.prefs).iter() {
            log::info!(
                "[nat] sending arranged connect request to master server [{}]",
                master.address
            );
            match request.encode(PacketType::MasterServerRequestArrangedConnection, 0, token) {
                Ok(bytes) => self.send(&bytes, &master.address),
                Err(err) => log::warn!("[nat] arranged request encode failed: {}", err),
            }
        }
    }

    /// Ask every configured master to nominate a relay for `target`.
    pub fn request_relay(&mut self, target: ServerAddr) {
        let key = self.next_key();
        let token = wire_token(self.session, key);
        let request = TargetedRequest { target };
        for master in MasterDirectory::load_from(&self.prefs).iter() {
            log::info!(
                "[nat] requesting relay for {} from master server [{}]",
                target,
                master.address
            );
            match request.encode(PacketType::MasterServerRelayRequest, 0, token) {
                Ok(bytes) => self.send(&bytes, &master.address),
                Err(err) => log::warn!("[nat] relay request encode failed: {}", err),
            }
        }
    }

    /// Broadcast an invite code to every master and the LAN; a server with
    /// the matching configured code answers with its reachable endpoint.
    pub fn join_game_by_invite(&mut self, code: &str) {
        let invite = MasterServerJoinInvite { code: code.into() };
        let bytes = match invite.encode(0, 0) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("[nat] invite encode failed: {}", err);
                return;
            }
        };
        for master in MasterDirectory::load_from(&self.prefs).iter() {
            self.send(&bytes, &master.address);
        }
        let lan_port = self.prefs.get_u32_or(KEY_SERVER_PORT, 0) as u16;
        if lan_port != 0 {
            self.send(&bytes, &ServerAddr::broadcast(lan_port));
        }
    }

    /// Mirror a probe through the masters so it also reaches peers the
    /// direct path cannot.
    pub(crate) fn mirror_probe(
        &mut self,
        packet_type: PacketType,
        target: ServerAddr,
        flags: u8,
        token: u32,
    ) {
        if self.masters.is_empty() {
            return;
        }
        let request = TargetedRequest { target };
        let bytes = match request.encode(packet_type, flags, token) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("[nat] probe mirror encode failed: {}", err);
                return;
            }
        };
        let masters: Vec<ServerAddr> = self.masters.iter().map(|m| m.address).collect();
        for master in masters {
            self.send(&bytes, &master);
        }
    }

    // ===================================================================
    // Inbound handlers
    // ===================================================================

    /// A master forwarded a client that wants to reach us: accept and hand
    /// the candidate list to the host.
    pub(crate) fn handle_client_requested_arranged(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        header: PacketHeader,
    ) {
        let Ok(request) = ArrangedCandidates::decode_body(r, true) else {
            log::debug!("[nat] bad arranged connection request from {}", from);
            return;
        };
        let Some(client_id) = request.client_id else {
            return;
        };
        log::info!(
            "[nat] client {} requested an arranged connection ({} candidates)",
            client_id,
            request.candidates.len()
        );

        let mut w = PacketWriter::new();
        let accept = PacketHeader {
            packet_type: PacketType::MasterServerAcceptArrangedConnection,
            flags: header.flags,
            token: header.token,
        };
        if accept.write(&mut w).and_then(|_| w.write_u16(client_id)).is_ok() {
            let bytes = w.into_bytes();
            self.send(&bytes, &from);
        }

        self.events.arranged_request(client_id, &request.candidates);
    }

    pub(crate) fn handle_arranged_accepted(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        _header: PacketHeader,
    ) {
        let Ok(accepted) = ArrangedCandidates::decode_body(r, false) else {
            log::debug!("[nat] bad arranged accept from {}", from);
            return;
        };
        log::info!(
            "[nat] received accept arranged connect response from the master server ({} candidates)",
            accepted.candidates.len()
        );
        self.events.arranged_accepted(&accepted.candidates);
    }

    pub(crate) fn handle_arranged_rejected(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        _header: PacketHeader,
    ) {
        let Ok(reason) = r.read_u8() else {
            log::debug!("[nat] bad arranged reject from {}", from);
            return;
        };
        log::info!(
            "[nat] received reject arranged connect response from the master server (reason {})",
            reason
        );
        self.events.arranged_rejected(reason);
    }

    /// A master relayed a ping/info response on behalf of a NAT-bound
    /// peer: unwrap it and feed it back through dispatch as if the origin
    /// had answered directly.
    pub(crate) fn handle_relayed_response(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        _header: PacketHeader,
    ) {
        let Ok(wrapped) = RelayedResponse::decode_body(r) else {
            log::debug!("[nat] bad relayed response from {}", from);
            return;
        };
        // Only plain exchange replies may be embedded; anything else (in
        // particular another wrapper) is dropped to keep dispatch finite.
        let inner_type = wrapped.inner.first().and_then(|b| PacketType::from_u8(*b));
        match inner_type {
            Some(PacketType::GamePingResponse) | Some(PacketType::GameInfoResponse) => {
                self.dispatch(wrapped.origin, &wrapped.inner);
            }
            _ => {
                log::debug!(
                    "[nat] relayed response from {} embeds unexpected payload",
                    from
                );
            }
        }
    }

    pub(crate) fn handle_relay_response(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        _header: PacketHeader,
    ) {
        let Ok(response) = MasterServerRelayResponse::decode_body(r) else {
            log::debug!("[nat] bad relay response from {}", from);
            return;
        };
        log::info!(
            "[nat] master nominated relay {} (host: {})",
            response.relay,
            response.is_host
        );
        // Knock on the relay so it learns our endpoint and role.
        self.send(&[u8::from(response.is_host)], &response.relay);
        self.events.relay_assigned(response.is_host, response.relay);
    }

    pub(crate) fn handle_relay_ready(&mut self, from: ServerAddr) {
        log::info!("[nat] relay {} is ready", from);
        self.events.relay_ready(from);
    }

    /// Invite broadcast: answer only when the code matches our configured
    /// one. The response carries the wildcard host; the joiner substitutes
    /// our visible source address.
    pub(crate) fn handle_join_invite(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        _header: PacketHeader,
    ) {
        let Ok(invite) = MasterServerJoinInvite::decode_body(r) else {
            log::debug!("[nat] bad join invite from {}", from);
            return;
        };
        let ours = self.prefs.get_string(KEY_SERVER_INVITE_CODE);
        if ours.is_empty() || ours != invite.code {
            return;
        }

        let port = self.prefs.get_u32_or(KEY_SERVER_PORT, 0) as u16;
        let response = MasterServerJoinInviteResponse {
            found: true,
            // "Use the sender address as host" sentinel.
            host: ServerAddr::new([255, 255, 255, 255], port),
        };
        match response.encode(0, 0) {
            Ok(bytes) => self.send(&bytes, &from),
            Err(err) => log::warn!("[nat] invite response encode failed: {}", err),
        }
    }

    pub(crate) fn handle_join_invite_response(
        &mut self,
        from: ServerAddr,
        r: &mut PacketReader,
        _header: PacketHeader,
    ) {
        let Ok(response) = MasterServerJoinInviteResponse::decode_body(r) else {
            log::debug!("[nat] bad join invite response from {}", from);
            return;
        };
        if !response.found {
            self.events.invite_rejected();
            return;
        }

        let (host, is_local) = match response.host.octets() {
            Some([255, 255, 255, 255]) => {
                // Sentinel: the responder is reachable at its visible
                // source address.
                let Some(octets) = from.octets() else {
                    return;
                };
                (ServerAddr::new(octets, response.host.port()), true)
            }
            Some(_) => (response.host, false),
            None => return,
        };
        log::info!("[nat] invite accepted, host {} (local: {})", host, is_local);
        self.events.invite_response(host, is_local);
    }
}
