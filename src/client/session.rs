//! One conversation with one agent.
//!
//! A [`Session`] owns a connected transport and sends PDUs over it with
//! request-ID correlation, retransmission, and (for v3) engine discovery
//! and clock resynchronization.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{Span, field::Empty, instrument};

use super::retry::RetryPolicy;
use super::v3::{V3Keys, V3Reply, V3Security, build_request, process_response};
use crate::device::SnmpDevice;
use crate::error::{AuthFailure, Error, Result};
use crate::message::{CommunityMessage, Message, V3Message};
use crate::oid::Oid;
use crate::pdu::{Pdu, PduType};
use crate::transport::{Transport, extract_request_id};
use crate::v3::{EngineCache, EngineState, SaltCounter, parse_discovery_response};
use crate::varbind::VarBind;
use crate::version::Version;

/// Socket half of a session: sends bytes and waits for the matching reply.
struct Exchange<T> {
    transport: T,
    target: SocketAddr,
    retry: RetryPolicy,
}

impl<T: Transport> Exchange<T> {
    /// One attempt. Replies carrying another request ID are late answers to
    /// earlier attempts and are dropped.
    async fn round_trip(&self, request_id: i32, data: &[u8]) -> Result<Bytes> {
        tracing::trace!(target: "snmp_monitor::client", { snmp.bytes = data.len() }, "sending request");
        self.transport.send(data).await?;

        let deadline = Instant::now() + self.retry.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout {
                    target: self.target,
                    elapsed: self.retry.timeout,
                    retries: 0,
                }
                .boxed());
            }
            let reply = self.transport.recv(request_id, remaining).await?;
            match extract_request_id(&reply) {
                Some(id) if id != request_id => {
                    tracing::debug!(target: "snmp_monitor::client", { expected_request_id = request_id, actual_request_id = id }, "discarding stale response");
                }
                _ => {
                    tracing::trace!(target: "snmp_monitor::client", { snmp.bytes = reply.len() }, "received response");
                    return Ok(reply);
                }
            }
        }
    }

    #[instrument(
        level = "debug",
        skip(self, data),
        fields(
            snmp.target = %self.target,
            snmp.request_id = request_id,
            snmp.attempt = Empty,
            snmp.elapsed_ms = Empty,
        )
    )]
    async fn send_with_retries(&self, request_id: i32, data: &[u8]) -> Result<Bytes> {
        let start = Instant::now();
        for attempt in 0..self.retry.attempts() {
            Span::current().record("snmp.attempt", attempt);
            if attempt > 0 {
                tracing::debug!(target: "snmp_monitor::client", "retrying request");
            }
            match self.round_trip(request_id, data).await {
                Err(e) if e.is_retriable() => continue,
                result => {
                    Span::current().record("snmp.elapsed_ms", start.elapsed().as_millis() as u64);
                    return result;
                }
            }
        }

        let elapsed = start.elapsed();
        Span::current().record("snmp.elapsed_ms", elapsed.as_millis() as u64);
        tracing::debug!(target: "snmp_monitor::client", { request_id, ?elapsed, retries = self.retry.retries }, "request timed out");
        Err(Error::Timeout {
            target: self.target,
            elapsed,
            retries: self.retry.retries,
        }
        .boxed())
    }

    async fn discover_engine(&self, msg_id: i32) -> Result<EngineState> {
        tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %self.target }, "discovering engine");
        let request = V3Message::discovery_request(msg_id).encode();
        let reply = self.send_with_retries(msg_id, &request).await?;
        let Message::V3(message) = Message::decode(reply, self.target)? else {
            return Err(Error::malformed(self.target));
        };
        parse_discovery_response(&message, self.target)
    }
}

struct V3Context {
    security: V3Security,
    keys: Option<V3Keys>,
    salt: SaltCounter,
    engines: Arc<EngineCache>,
    /// Key into `engines`.
    identity: String,
}

/// Connected conversation with one device.
pub(crate) struct Session<T> {
    io: Exchange<T>,
    version: Version,
    community: Bytes,
    next_id: i32,
    v3: Option<V3Context>,
}

fn next_request_id(next: &mut i32) -> i32 {
    let id = *next;
    *next = if id == i32::MAX { 1 } else { id + 1 };
    id
}

impl<T: Transport> Session<T> {
    pub(crate) fn new(transport: T, device: &SnmpDevice, engines: Arc<EngineCache>) -> Result<Self> {
        let v3 = match device.version() {
            Version::V3 => Some(V3Context {
                security: V3Security::from_credentials(&device.credentials)?,
                keys: None,
                salt: SaltCounter::new(),
                engines,
                identity: device.endpoint(),
            }),
            Version::V1 | Version::V2c => None,
        };
        let first_id = (crate::util::random_nonzero_u64() % i32::MAX as u64) as i32 + 1;
        Ok(Self {
            io: Exchange {
                target: transport.peer_addr(),
                transport,
                retry: RetryPolicy::for_device(device),
            },
            version: device.version(),
            community: Bytes::copy_from_slice(device.credentials.community_bytes()),
            next_id: first_id,
            v3,
        })
    }

    pub(crate) fn target(&self) -> SocketAddr {
        self.io.target
    }

    pub(crate) fn version(&self) -> Version {
        self.version
    }

    pub(crate) async fn get(&mut self, oids: &[Oid]) -> Result<Pdu> {
        let pdu = Pdu::get_request(next_request_id(&mut self.next_id), oids);
        self.request(pdu).await
    }

    pub(crate) async fn get_next(&mut self, oids: &[Oid]) -> Result<Pdu> {
        let pdu = Pdu::get_next_request(next_request_id(&mut self.next_id), oids);
        self.request(pdu).await
    }

    pub(crate) async fn get_bulk(&mut self, non_repeaters: i32, max_repetitions: i32, oids: &[Oid]) -> Result<Pdu> {
        let pdu = Pdu::get_bulk(next_request_id(&mut self.next_id), non_repeaters, max_repetitions, oids);
        self.request(pdu).await
    }

    pub(crate) async fn set(&mut self, varbinds: Vec<VarBind>) -> Result<Pdu> {
        let pdu = Pdu::set_request(next_request_id(&mut self.next_id), varbinds);
        self.request(pdu).await
    }

    /// Send `pdu` and return the agent's Response PDU. A non-zero
    /// error-status becomes [`Error::Snmp`].
    async fn request(&mut self, pdu: Pdu) -> Result<Pdu> {
        tracing::debug!(target: "snmp_monitor::client", { snmp.pdu_type = %pdu.pdu_type, snmp.varbind_count = pdu.varbinds.len() }, "sending {} request", pdu.pdu_type);
        let response = match self.v3 {
            Some(_) => self.request_v3(pdu).await?,
            None => self.request_community(pdu).await?,
        };
        tracing::debug!(target: "snmp_monitor::client", { snmp.pdu_type = %response.pdu_type, snmp.varbind_count = response.varbinds.len(), snmp.error_status = response.error_status, snmp.error_index = response.error_index }, "received {} response", response.pdu_type);

        let target = self.io.target;
        if response.pdu_type != PduType::Response {
            tracing::debug!(target: "snmp_monitor::client", { snmp.target = %target, snmp.pdu_type = %response.pdu_type }, "unexpected PDU type in response");
            return Err(Error::malformed(target));
        }
        if response.is_error() {
            return Err(Error::Snmp {
                target,
                status: response.error_status_enum(),
                index: u32::try_from(response.error_index).unwrap_or(0),
                oid: response.error_oid().cloned(),
            }
            .boxed());
        }
        Ok(response)
    }

    async fn request_community(&mut self, pdu: Pdu) -> Result<Pdu> {
        let target = self.io.target;
        let request_id = pdu.request_id;
        let message = CommunityMessage {
            version: self.version,
            community: self.community.clone(),
            pdu,
        };
        let reply = self.io.send_with_retries(request_id, &message.encode()).await?;

        let Message::Community(response) = Message::decode(reply, target)? else {
            tracing::warn!(target: "snmp_monitor::client", { peer = %target, expected_version = %self.version }, "v3 reply to a community request");
            return Err(Error::malformed(target));
        };
        if response.version != self.version {
            tracing::warn!(target: "snmp_monitor::client", { peer = %target, expected_version = %self.version, response_version = %response.version }, "version mismatch in response");
            return Err(Error::malformed(target));
        }
        if response.pdu.request_id != request_id {
            return Err(Error::malformed(target));
        }
        Ok(response.pdu)
    }

    /// Send a v3 request, discovering the engine first if needed.
    ///
    /// A notInTimeWindow report triggers one resync and an unknownEngineID
    /// report one rediscovery; a second occurrence is an authentication
    /// failure.
    async fn request_v3(&mut self, mut pdu: Pdu) -> Result<Pdu> {
        let target = self.io.target;
        let Some(ctx) = self.v3.as_mut() else {
            return Err(Error::malformed(target));
        };
        let mut resynced = false;
        let mut rediscovered = false;

        loop {
            if ctx.keys.is_none() {
                let engine = match ctx.engines.get(&ctx.identity) {
                    Some(engine) => engine,
                    None => {
                        let engine = self.io.discover_engine(next_request_id(&mut self.next_id)).await?;
                        ctx.engines.insert(ctx.identity.clone(), engine.clone());
                        engine
                    }
                };
                ctx.keys = Some(ctx.security.derive_keys(engine));
            }
            let Some(keys) = ctx.keys.as_mut() else {
                return Err(Error::malformed(target));
            };

            let request_id = next_request_id(&mut self.next_id);
            pdu.request_id = request_id;
            let data = build_request(&ctx.security, keys, &pdu, &ctx.salt, target)?;
            let reply = self.io.send_with_retries(request_id, &data).await?;
            let (outcome, usm) = process_response(&ctx.security, keys, reply, target)?;

            match outcome {
                V3Reply::Pdu(response) => {
                    if keys.engine.update_time(usm.engine_boots, usm.engine_time) {
                        ctx.engines.update_time(&ctx.identity, usm.engine_boots, usm.engine_time);
                    }
                    return Ok(response);
                }
                V3Reply::NotInTimeWindow { boots, time } if !resynced => {
                    tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %target, boots, time }, "resynchronizing engine clock");
                    resynced = true;
                    let engine = EngineState::new(keys.engine.engine_id.clone(), boots, time);
                    ctx.engines.insert(ctx.identity.clone(), engine.clone());
                    keys.engine = engine;
                }
                V3Reply::NotInTimeWindow { .. } => {
                    return Err(Error::Auth { target, reason: AuthFailure::NotInTimeWindow }.boxed());
                }
                V3Reply::UnknownEngine if !rediscovered => {
                    tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %target }, "engine ID rejected, rediscovering");
                    rediscovered = true;
                    ctx.engines.remove(&ctx.identity);
                    ctx.keys = None;
                }
                V3Reply::UnknownEngine => {
                    return Err(Error::Auth { target, reason: AuthFailure::UnknownEngineId }.boxed());
                }
            }
        }
    }
}
