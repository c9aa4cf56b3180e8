//! Socket and randomness helpers shared by the transports and the client.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Bind a UDP socket on `addr`. IPv6 sockets are v6-only so a `udp6` device
/// never silently falls back to an IPv4-mapped address.
pub(crate) fn bind_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

/// Ephemeral socket in the same address family as `target`.
pub(crate) fn bind_ephemeral_udp_socket(target: SocketAddr) -> io::Result<UdpSocket> {
    let unspecified = if target.is_ipv6() {
        IpAddr::V6(Ipv6Addr::UNSPECIFIED)
    } else {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    };
    bind_udp_socket(SocketAddr::new(unspecified, 0))
}

/// Random non-zero seed for request IDs and privacy salts.
pub(crate) fn random_nonzero_u64() -> u64 {
    let mut buf = [0u8; 8];
    loop {
        if let Err(e) = getrandom::fill(&mut buf) {
            tracing::warn!(target: "snmp_monitor::v3", { error = %e }, "OS randomness unavailable, seeding from clock");
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0x5EED);
            return nanos | 1;
        }
        let value = u64::from_ne_bytes(buf);
        if value != 0 {
            return value;
        }
    }
}
