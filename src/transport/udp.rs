//! UDP transport.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::Transport;
use crate::error::{Error, Result};
use crate::util::bind_ephemeral_udp_socket;

/// Largest datagram we accept.
const RECV_BUFFER_SIZE: usize = 65535;

/// Connected UDP socket owned by one operation.
pub struct UdpTransport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpTransport {
    /// Bind an ephemeral socket in the target's address family and connect it.
    pub async fn connect(target: SocketAddr) -> Result<Self> {
        let network = |source| Error::Network { target, source }.boxed();
        let socket = bind_ephemeral_udp_socket(target).map_err(network)?;
        socket.connect(target).await.map_err(network)?;
        tracing::debug!(
            target: "snmp_monitor::transport",
            { snmp.target = %target, snmp.local_addr = ?socket.local_addr().ok() },
            "UDP transport connected"
        );
        Ok(Self { socket, target })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

impl Transport for UdpTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        tracing::trace!(target: "snmp_monitor::transport", { snmp.target = %self.target, snmp.bytes = data.len() }, "UDP send");
        self.socket
            .send(data)
            .await
            .map_err(|source| Error::Network { target: self.target, source }.boxed())?;
        Ok(())
    }

    async fn recv(&self, request_id: i32, recv_timeout: Duration) -> Result<Bytes> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        match timeout(recv_timeout, self.socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                buf.truncate(len);
                tracing::trace!(target: "snmp_monitor::transport", { snmp.target = %self.target, snmp.bytes = len }, "UDP recv");
                Ok(Bytes::from(buf))
            }
            Ok(Err(source)) => Err(Error::Network { target: self.target, source }.boxed()),
            Err(_) => {
                tracing::trace!(target: "snmp_monitor::transport", { snmp.target = %self.target, snmp.request_id = request_id }, "UDP recv timeout");
                Err(Error::Timeout {
                    target: self.target,
                    elapsed: recv_timeout,
                    retries: 0,
                }
                .boxed())
            }
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.target
    }
}
