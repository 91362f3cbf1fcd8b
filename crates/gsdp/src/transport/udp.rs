// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP binding of the datagram port.
//!
//! One broadcast-capable socket handles both the query traffic and the
//! listening side. The socket is non-blocking; the host's pump calls
//! [`UdpTransport::try_recv`] and feeds whatever arrives into the engine.

use crate::core::addr::ServerAddr;
use crate::transport::{Datagram, TransportError};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};

/// Broadcast-capable UDP socket bound to `0.0.0.0:<port>`.
pub struct UdpTransport {
    socket: UdpSocket,
    port: u16,
}

impl UdpTransport {
    /// Bind the query socket. Pass port 0 for an ephemeral client port; a
    /// listening server binds its published port.
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;
        socket2.set_broadcast(true)?;
        socket2.set_nonblocking(true)?;

        let bind_addr = SocketAddr::V4(SocketAddrV4::new([0, 0, 0, 0].into(), port));
        socket2.bind(&bind_addr.into())?;
        let socket: UdpSocket = socket2.into();
        let port = socket.local_addr()?.port();
        log::debug!("[udp] query socket bound to 0.0.0.0:{}", port);

        Ok(Self { socket, port })
    }

    /// The locally bound port (resolved when an ephemeral port was asked for).
    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// Non-blocking receive. Returns the payload and sender when a datagram
    /// was waiting, `None` when the socket is dry.
    pub fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<(usize, ServerAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((len, SocketAddr::V4(from))) => Ok(Some((len, from.into()))),
            // Query traffic is IPv4-only; v6 datagrams on a dual-stack host
            // are not ours.
            Ok((_, SocketAddr::V6(from))) => {
                log::debug!("[udp] ignoring IPv6 datagram from {}", from);
                Ok(None)
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Datagram for UdpTransport {
    fn send_to(&self, payload: &[u8], addr: &ServerAddr) -> Result<usize, TransportError> {
        let Some(dest) = addr.to_socket_addr() else {
            // IPX broadcast has no UDP mapping on modern hosts; the retry
            // discipline absorbs the missed probe.
            log::debug!("[udp] dropping send to unreachable endpoint {}", addr);
            return Err(TransportError::Unreachable(*addr));
        };
        let sent = self.socket.send_to(payload, dest)?;
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_and_loopback_roundtrip() {
        let a = UdpTransport::bind(0).expect("bind a");
        let b = UdpTransport::bind(0).expect("bind b");
        assert_ne!(a.local_port(), 0);

        let dest = ServerAddr::new([127, 0, 0, 1], b.local_port());
        let sent = a.send_to(b"ping", &dest).expect("send should succeed");
        assert_eq!(sent, 4);

        // Non-blocking receive may need a beat for local delivery.
        let mut buf = [0u8; 64];
        let mut got = None;
        for _ in 0..50 {
            if let Some((len, from)) = b.try_recv(&mut buf).expect("recv") {
                got = Some((len, from));
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let (len, from) = got.expect("datagram should arrive on loopback");
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from.octets(), Some([127, 0, 0, 1]));
    }

    #[test]
    fn test_ipx_broadcast_is_unreachable() {
        let t = UdpTransport::bind(0).expect("bind");
        let err = t
            .send_to(b"x", &ServerAddr::ipx_broadcast(28000))
            .unwrap_err();
        assert!(matches!(err, TransportError::Unreachable(_)));
    }

    #[test]
    fn test_try_recv_on_dry_socket_is_none() {
        let t = UdpTransport::bind(0).expect("bind");
        let mut buf = [0u8; 16];
        assert!(t.try_recv(&mut buf).expect("recv").is_none());
    }
}
