// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Output ports toward the host runtime.
//!
//! The engine never calls into the host directly; it reports through these
//! traits. [`ProgressSink`] carries user-visible query progress (ping phase
//! spans 0.0-0.5, query phase 0.5-1.0). [`SessionEvents`] carries the
//! auxiliary results (game-type lists, NAT rendezvous outcomes) and is
//! no-op by default so hosts implement only what they consume.

#[cfg(feature = "nat")]
use crate::core::addr::ServerAddr;

/// User-visible query progress.
pub trait ProgressSink: Send + Sync {
    /// A query operation began.
    fn start(&self, message: &str, progress: f32);
    /// Mid-flight status change (master retry, failover).
    fn update(&self, message: &str, progress: f32);
    /// Ping fan-out progress, 0.0-0.5.
    fn ping(&self, message: &str, progress: f32);
    /// Info fan-out progress, 0.5-1.0.
    fn query(&self, message: &str, progress: f32);
    /// Terminal report ("N servers found.").
    fn done(&self, message: &str, progress: f32);
}

/// Auxiliary session results. All methods default to no-ops.
pub trait SessionEvents: Send + Sync {
    /// Game and mission type lists arrived from a master.
    fn game_types(&self, games: &[String], missions: &[String]) {
        let _ = (games, missions);
    }

    /// A master introduced a client that wants an arranged connection to
    /// us; the engine has already accepted.
    #[cfg(feature = "nat")]
    fn arranged_request(&self, client_id: u16, candidates: &[ServerAddr]) {
        let _ = (client_id, candidates);
    }

    /// The remote host accepted our arranged connection; try these
    /// candidate endpoints.
    #[cfg(feature = "nat")]
    fn arranged_accepted(&self, candidates: &[ServerAddr]) {
        let _ = candidates;
    }

    /// The arranged connection was rejected (0 = no such server,
    /// 1 = server rejected).
    #[cfg(feature = "nat")]
    fn arranged_rejected(&self, reason: u8) {
        let _ = reason;
    }

    /// A master nominated a relay endpoint for us.
    #[cfg(feature = "nat")]
    fn relay_assigned(&self, is_host: bool, relay: ServerAddr) {
        let _ = (is_host, relay);
    }

    /// The relay is ready for the game connection.
    #[cfg(feature = "nat")]
    fn relay_ready(&self, relay: ServerAddr) {
        let _ = relay;
    }

    /// An invite-code join was answered with a reachable endpoint.
    #[cfg(feature = "nat")]
    fn invite_response(&self, host: ServerAddr, is_local: bool) {
        let _ = (host, is_local);
    }

    /// An invite-code join was answered negatively.
    #[cfg(feature = "nat")]
    fn invite_rejected(&self) {}
}

/// Sink that swallows everything; the default wiring for headless hosts.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn start(&self, _message: &str, _progress: f32) {}
    fn update(&self, _message: &str, _progress: f32) {}
    fn ping(&self, _message: &str, _progress: f32) {}
    fn query(&self, _message: &str, _progress: f32) {}
    fn done(&self, _message: &str, _progress: f32) {}
}

impl SessionEvents for NullSink {}
