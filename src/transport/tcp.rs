//! TCP transport (RFC 3430).
//!
//! Messages travel back to back on the stream with no extra framing; the
//! outer BER SEQUENCE header tells the reader where each one ends.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::Transport;
use crate::ber::length::decode_length;
use crate::ber::tag;
use crate::error::internal::DecodeErrorKind;
use crate::error::{Error, Result};

/// One TCP connection to one agent.
pub struct TcpTransport {
    stream: Mutex<TcpStream>,
    target: SocketAddr,
}

impl TcpTransport {
    pub async fn connect_timeout(target: SocketAddr, connect_timeout: Duration) -> Result<Self> {
        let stream = match timeout(connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(Error::Network { target, source }.boxed()),
            Err(_) => {
                return Err(Error::Timeout {
                    target,
                    elapsed: connect_timeout,
                    retries: 0,
                }
                .boxed());
            }
        };
        stream
            .set_nodelay(true)
            .map_err(|source| Error::Network { target, source }.boxed())?;
        tracing::debug!(target: "snmp_monitor::transport", { snmp.target = %target }, "TCP transport connected");
        Ok(Self {
            stream: Mutex::new(stream),
            target,
        })
    }
}

impl Transport for TcpTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        let mut stream = self.stream.lock().await;
        stream
            .write_all(data)
            .await
            .map_err(|source| Error::Network { target: self.target, source }.boxed())
    }

    async fn recv(&self, request_id: i32, recv_timeout: Duration) -> Result<Bytes> {
        let mut stream = self.stream.lock().await;
        match timeout(recv_timeout, read_message(&mut stream, self.target)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::trace!(target: "snmp_monitor::transport", { snmp.target = %self.target, snmp.request_id = request_id }, "TCP recv timeout");
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

/// Read one complete BER message. Claimed lengths above the BER maximum
/// are rejected before anything is allocated.
async fn read_message(stream: &mut TcpStream, target: SocketAddr) -> Result<Bytes> {
    let network = |source| Error::Network { target, source }.boxed();

    let mut header = [0u8; 6];
    stream.read_exact(&mut header[..2]).await.map_err(network)?;
    if header[0] != tag::universal::SEQUENCE {
        tracing::debug!(
            target: "snmp_monitor::ber",
            { snmp.target = %target, kind = %DecodeErrorKind::UnexpectedTag { expected: tag::universal::SEQUENCE, actual: header[0] } },
            "bad TCP frame"
        );
        return Err(Error::malformed(target));
    }

    let extra = if header[1] & 0x80 != 0 {
        (header[1] & 0x7F) as usize
    } else {
        0
    };
    if extra > 4 {
        tracing::debug!(target: "snmp_monitor::ber", { snmp.target = %target, kind = %DecodeErrorKind::LengthTooLong { octets: extra } }, "bad TCP frame");
        return Err(Error::malformed(target));
    }
    stream
        .read_exact(&mut header[2..2 + extra])
        .await
        .map_err(network)?;
    let header_len = 2 + extra;
    let (content_len, _) = decode_length(&header[1..header_len], 1, Some(target))?;

    let mut message = vec![0u8; header_len + content_len];
    message[..header_len].copy_from_slice(&header[..header_len]);
    stream
        .read_exact(&mut message[header_len..])
        .await
        .map_err(network)?;
    Ok(Bytes::from(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn frames_by_ber_length() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 4];
            sock.read_exact(&mut req).await.unwrap();
            // two messages in one write, the second with a long-form length
            let mut out = vec![0x30, 0x02, 0x05, 0x00];
            out.extend_from_slice(&[0x30, 0x81, 0x03, 0x02, 0x01, 0x07]);
            sock.write_all(&out).await.unwrap();
        });

        let transport = TcpTransport::connect_timeout(addr, Duration::from_secs(1)).await.unwrap();
        transport.send(&[0x30, 0x02, 0x05, 0x00]).await.unwrap();
        let first = transport.recv(1, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&first[..], &[0x30, 0x02, 0x05, 0x00]);
        let second = transport.recv(2, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&second[..], &[0x30, 0x81, 0x03, 0x02, 0x01, 0x07]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rejects_non_sequence_frame() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[0x04, 0x01, 0x00]).await.unwrap();
        });
        let transport = TcpTransport::connect_timeout(addr, Duration::from_secs(1)).await.unwrap();
        let err = transport.recv(1, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(*err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn rejects_oversized_claim_without_allocating() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[0x30, 0x84, 0x7F, 0xFF, 0xFF, 0xFF]).await.unwrap();
        });
        let transport = TcpTransport::connect_timeout(addr, Duration::from_secs(1)).await.unwrap();
        let err = transport.recv(1, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(*err, Error::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn closed_connection_is_network_error() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });
        let transport = TcpTransport::connect_timeout(addr, Duration::from_secs(1)).await.unwrap();
        let err = transport.recv(1, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(*err, Error::Network { .. }));
    }
}
