//! SNMPv3 request building and response processing.
//!
//! The [`Session`](super::Session) drives discovery and retries; this module
//! turns a PDU into an authenticated (and possibly encrypted) message and
//! turns an agent's reply back into a PDU or a Report outcome.

use std::net::SocketAddr;

use bytes::Bytes;
use zeroize::Zeroizing;

use crate::ber::Decoder;
use crate::device::SnmpCredentials;
use crate::error::{AuthFailure, Error, ErrorStatus, Result};
use crate::message::{Message, MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel, V3Message, V3MessageData};
use crate::pdu::{Pdu, PduType};
use crate::v3::auth::{authenticate_message, verify_message};
use crate::v3::{
    AuthProtocol, EngineState, LocalizedKey, PrivKey, PrivProtocol, ReportKind, SaltCounter,
    UsmSecurityParams, classify_report,
};

/// v3 user and secrets taken from device credentials.
pub(crate) struct V3Security {
    username: Bytes,
    level: SecurityLevel,
    auth: Option<(AuthProtocol, Zeroizing<Vec<u8>>)>,
    privacy: Option<(PrivProtocol, Zeroizing<Vec<u8>>)>,
    context_name: Bytes,
}

impl V3Security {
    pub(crate) fn from_credentials(creds: &SnmpCredentials) -> Result<Self> {
        let level = creds.security_level();
        let secret = |s: &Option<String>| Zeroizing::new(s.as_deref().unwrap_or_default().as_bytes().to_vec());

        let auth = match (level.requires_auth(), creds.auth_protocol) {
            (false, _) => None,
            (true, Some(protocol)) => Some((protocol, secret(&creds.auth_password))),
            (true, None) => {
                return Err(Error::validation(vec![format!(
                    "authentication protocol is required for {}",
                    level.as_str()
                )]));
            }
        };
        let privacy = match (level.requires_priv(), creds.priv_protocol) {
            (false, _) => None,
            (true, Some(protocol)) => Some((protocol, secret(&creds.priv_password))),
            (true, None) => {
                return Err(Error::validation(vec!["privacy protocol is required for authPriv".into()]));
            }
        };

        Ok(Self {
            username: Bytes::from(creds.username.clone().unwrap_or_default()),
            level,
            auth,
            privacy,
            context_name: Bytes::from(creds.context_name.clone().unwrap_or_default()),
        })
    }

    pub(crate) fn level(&self) -> SecurityLevel {
        self.level
    }

    /// Localize keys for a discovered engine.
    pub(crate) fn derive_keys(&self, engine: EngineState) -> V3Keys {
        let auth_key = self
            .auth
            .as_ref()
            .map(|(protocol, password)| LocalizedKey::from_password(*protocol, password, &engine.engine_id));
        let priv_key = match (&self.auth, &self.privacy) {
            (Some((auth_protocol, _)), Some((priv_protocol, password))) => Some(PrivKey::from_password(
                *auth_protocol,
                *priv_protocol,
                password,
                &engine.engine_id,
            )),
            _ => None,
        };
        tracing::trace!(
            target: "snmp_monitor::v3",
            { snmp.engine_id = %hex::encode(&engine.engine_id), has_auth = auth_key.is_some(), has_priv = priv_key.is_some() },
            "localized keys"
        );
        V3Keys {
            engine,
            auth_key,
            priv_key,
        }
    }
}

/// Engine state with keys localized to it.
pub(crate) struct V3Keys {
    pub(crate) engine: EngineState,
    auth_key: Option<LocalizedKey>,
    priv_key: Option<PrivKey>,
}

/// What an agent's v3 reply amounted to.
#[derive(Debug)]
pub(crate) enum V3Reply {
    Pdu(Pdu),
    /// Our clock estimate is off; the agent's boots/time are attached.
    NotInTimeWindow { boots: u32, time: u32 },
    /// The agent no longer recognizes the engine ID we used.
    UnknownEngine,
}

/// Encode `pdu` for the engine in `keys`, encrypting and authenticating as
/// the security level requires.
pub(crate) fn build_request(
    security: &V3Security,
    keys: &V3Keys,
    pdu: &Pdu,
    salt: &SaltCounter,
    target: SocketAddr,
) -> Result<Bytes> {
    let engine = &keys.engine;
    let boots = engine.engine_boots;
    let time = engine.estimated_time();
    let scoped = ScopedPdu::new(engine.engine_id.clone(), security.context_name.clone(), pdu.clone());

    let mut usm = UsmSecurityParams::new(engine.engine_id.clone(), boots, time, security.username.clone());
    let data = match (&keys.priv_key, security.level.requires_priv()) {
        (Some(priv_key), true) => {
            let (ciphertext, priv_params) = priv_key
                .encrypt(&scoped.encode_to_bytes(), boots, time, salt)
                .map_err(|kind| {
                    tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %target, kind = %kind }, "encryption failed");
                    Error::Auth { target, reason: AuthFailure::DecryptionError }.boxed()
                })?;
            usm = usm.with_priv_params(priv_params);
            V3MessageData::Encrypted(ciphertext)
        }
        _ => V3MessageData::Plaintext(scoped),
    };
    if let Some(key) = &keys.auth_key {
        usm = usm.with_auth_placeholder(key.mac_len());
    }

    let global = MsgGlobalData::new(pdu.request_id, MsgFlags::new(security.level, true));
    let message = match data {
        V3MessageData::Plaintext(scoped) => V3Message::new(global, usm.encode(), scoped),
        V3MessageData::Encrypted(ciphertext) => V3Message::new_encrypted(global, usm.encode(), ciphertext),
    };
    let encoded = message.encode();

    let Some(key) = &keys.auth_key else {
        return Ok(encoded);
    };
    let mut buf = encoded.to_vec();
    let (offset, len) = UsmSecurityParams::find_auth_params_offset(&buf).ok_or_else(|| Error::malformed(target))?;
    authenticate_message(key, &mut buf, offset, len);
    Ok(Bytes::from(buf))
}

/// Verify, decrypt and classify a reply to a request built by [`build_request`].
pub(crate) fn process_response(
    security: &V3Security,
    keys: &V3Keys,
    data: Bytes,
    target: SocketAddr,
) -> Result<(V3Reply, UsmSecurityParams)> {
    let auth_failure = |reason| Error::Auth { target, reason }.boxed();

    let Message::V3(message) = Message::decode(data.clone(), target)? else {
        tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %target }, "v1/v2c reply to a v3 request");
        return Err(Error::malformed(target));
    };
    let usm = UsmSecurityParams::decode(message.security_params.clone())?;
    let response_level = message.security_level();

    if response_level.requires_auth() {
        let key = keys.auth_key.as_ref().ok_or_else(|| auth_failure(AuthFailure::ResponseDigestMismatch))?;
        let (offset, len) = UsmSecurityParams::find_auth_params_offset(&data).ok_or_else(|| Error::malformed(target))?;
        if !verify_message(key, &data, offset, len) {
            tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %target }, "response HMAC mismatch");
            return Err(auth_failure(AuthFailure::ResponseDigestMismatch));
        }
    }

    let pdu = match message.data {
        V3MessageData::Plaintext(scoped) => scoped.pdu,
        V3MessageData::Encrypted(ciphertext) => {
            let priv_key = keys.priv_key.as_ref().ok_or_else(|| auth_failure(AuthFailure::DecryptionError))?;
            let plaintext = priv_key
                .decrypt(&ciphertext, usm.engine_boots, usm.engine_time, &usm.priv_params)
                .map_err(|kind| {
                    tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %target, kind = %kind }, "decryption failed");
                    auth_failure(AuthFailure::DecryptionError)
                })?;
            // A wrong privacy key yields garbage rather than a cipher error.
            ScopedPdu::decode(&mut Decoder::with_target(plaintext, target))
                .map_err(|_| auth_failure(AuthFailure::DecryptionError))?
                .pdu
        }
    };

    if pdu.pdu_type == PduType::Report {
        let reply = match classify_report(&pdu) {
            Some(ReportKind::NotInTimeWindow) => V3Reply::NotInTimeWindow {
                boots: usm.engine_boots,
                time: usm.engine_time,
            },
            Some(ReportKind::UnknownEngineId) => V3Reply::UnknownEngine,
            Some(kind) => {
                let reason = kind.auth_failure().unwrap_or(AuthFailure::UnknownEngineId);
                tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %target, report = ?kind }, "agent rejected credentials");
                return Err(auth_failure(reason));
            }
            None => {
                return Err(Error::Snmp {
                    target,
                    status: ErrorStatus::GenErr,
                    index: 0,
                    oid: pdu.varbinds.first().map(|vb| vb.oid.clone()),
                }
                .boxed());
            }
        };
        return Ok((reply, usm));
    }

    if security.level.requires_auth() && !response_level.requires_auth() {
        tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %target, level = response_level.as_str() }, "unauthenticated reply to an authenticated request");
        return Err(auth_failure(AuthFailure::ResponseDigestMismatch));
    }
    Ok((V3Reply::Pdu(pdu), usm))
}
