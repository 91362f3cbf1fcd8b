// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram transport port.
//!
//! The engine only ever *sends*; inbound datagrams are push-delivered by the
//! host's receive loop into [`crate::discovery::QueryEngine::dispatch`]. The
//! [`Datagram`] trait is the send port, and [`udp::UdpTransport`] is the
//! bundled UDP binding. Tests substitute an in-memory implementation.

pub mod udp;

use crate::core::addr::ServerAddr;
use std::fmt;

pub use udp::UdpTransport;

/// Send side of the connectionless transport.
///
/// A send failure is not fatal anywhere in the engine: the retry discipline
/// treats it exactly like a missed response, so implementations should
/// report errors rather than panic.
pub trait Datagram: Send + Sync {
    /// Send one datagram to `addr`. Returns the number of bytes handed to
    /// the transport.
    fn send_to(&self, payload: &[u8], addr: &ServerAddr) -> Result<usize, TransportError>;
}

/// Transport failure surfaced to the engine (and then logged and absorbed).
#[derive(Debug)]
pub enum TransportError {
    /// The endpoint has no representation on this transport (IPX broadcast
    /// over a UDP socket).
    Unreachable(ServerAddr),
    /// Underlying socket error.
    Io(std::io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unreachable(addr) => {
                write!(f, "no route for endpoint {}", addr)
            }
            TransportError::Io(err) => write!(f, "socket error: {}", err),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err)
    }
}
