//! Transport layer.
//!
//! A [`Transport`] moves encoded messages to one agent and back. A
//! [`Connector`] opens one per logical operation from an [`SnmpDevice`];
//! dropping the transport closes its socket.
//!
//! - [`UdpTransport`]: connected ephemeral UDP socket (udp4 / udp6)
//! - [`TcpTransport`]: RFC 3430 BER-framed stream
//! - [`MockTransport`]: scripted in-memory agent that counts exchanges

mod mock;
mod tcp;
mod udp;

pub use mock::{MockResponse, MockTransport, mib_reply};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use crate::ber::{Decoder, tag};
use crate::device::{SnmpDevice, TransportKind};
use crate::error::{Error, Result};

/// One open path to one agent.
pub trait Transport: Send + Sync {
    /// Send an encoded message.
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Wait up to `timeout` for the next message from the agent.
    ///
    /// `request_id` is informational; correlation is the caller's job
    /// because UDP may deliver stale answers to earlier attempts.
    fn recv(&self, request_id: i32, timeout: Duration) -> impl Future<Output = Result<Bytes>> + Send;

    /// Address of the agent.
    fn peer_addr(&self) -> SocketAddr;
}

/// Opens a transport for a device.
pub trait Connector: Send + Sync {
    type Transport: Transport;

    fn connect(&self, device: &SnmpDevice) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// Transport chosen by [`NetConnector`] from the device's transport kind.
pub enum NetTransport {
    Udp(UdpTransport),
    Tcp(TcpTransport),
}

impl Transport for NetTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        match self {
            Self::Udp(t) => t.send(data).await,
            Self::Tcp(t) => t.send(data).await,
        }
    }

    async fn recv(&self, request_id: i32, timeout: Duration) -> Result<Bytes> {
        match self {
            Self::Udp(t) => t.recv(request_id, timeout).await,
            Self::Tcp(t) => t.recv(request_id, timeout).await,
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        match self {
            Self::Udp(t) => t.peer_addr(),
            Self::Tcp(t) => t.peer_addr(),
        }
    }
}

/// Resolves the device hostname and opens a real socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetConnector;

impl Connector for NetConnector {
    type Transport = NetTransport;

    async fn connect(&self, device: &SnmpDevice) -> Result<NetTransport> {
        let target = resolve(&device.hostname, device.port_u16(), device.transport).await?;
        match device.transport {
            TransportKind::Udp4 | TransportKind::Udp6 => {
                UdpTransport::connect(target).await.map(NetTransport::Udp)
            }
            TransportKind::Tcp => TcpTransport::connect_timeout(target, device.timeout())
                .await
                .map(NetTransport::Tcp),
        }
    }
}

/// Resolve `host` to the first address of the family `kind` requires.
pub async fn resolve(host: &str, port: u16, kind: TransportKind) -> Result<SocketAddr> {
    let resolve_error = || Error::Resolve { host: host.to_owned() }.boxed();
    let addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        tracing::debug!(target: "snmp_monitor::transport", { snmp.host = host, error = %e }, "lookup failed");
        resolve_error()
    })?;

    let mut addrs = addrs.filter(|addr| match kind {
        TransportKind::Udp4 => addr.is_ipv4(),
        TransportKind::Udp6 => addr.is_ipv6(),
        TransportKind::Tcp => true,
    });
    addrs.next().ok_or_else(resolve_error)
}

/// Request ID of a v1/v2c message, or msgID of a v3 message, read without
/// decoding the rest of the message.
pub(crate) fn extract_request_id(data: &[u8]) -> Option<i32> {
    let mut outer = Decoder::from_slice(data);
    let mut message = outer.read_sequence().ok()?;
    if message.read_integer().ok()? == 3 {
        let mut global = message.read_sequence().ok()?;
        return global.read_integer().ok();
    }
    message.read_octet_string().ok()?;
    let pdu_tag = message.read_tag().ok()?;
    if pdu_tag & 0xE0 != tag::pdu::GET_REQUEST & 0xE0 {
        return None;
    }
    message.read_length().ok()?;
    message.read_integer().ok()
}
