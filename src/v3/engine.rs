//! Engine discovery state and time synchronization (RFC 3414 Section 2.3, 4).
//!
//! Discovered state is held in an [`EngineCache`] namespace keyed by device
//! identity (host, port, transport). Entries expire after a TTL like any
//! other cached response, so a rebooted or replaced agent is rediscovered.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::error::internal::DecodeErrorKind;
use crate::error::{AuthFailure, Error, Result};
use crate::message::{MSG_MAX_SIZE, V3Message};
use crate::pdu::{Pdu, PduType};
use crate::v3::UsmSecurityParams;

/// Seconds a message may drift from our estimate of the engine clock.
pub const TIME_WINDOW: u32 = 150;

/// snmpEngineTime and snmpEngineBoots are 31-bit.
pub const MAX_ENGINE_TIME: u32 = 2_147_483_647;

/// usmStats counters carried in Report PDUs.
pub mod report_oids {
    use crate::oid::Oid;

    const USM_STATS: [u32; 9] = [1, 3, 6, 1, 6, 3, 15, 1, 1];

    fn stat(n: u32) -> Oid {
        Oid::from_slice(&USM_STATS).child(n).child(0)
    }

    pub fn unsupported_sec_levels() -> Oid {
        stat(1)
    }

    pub fn not_in_time_windows() -> Oid {
        stat(2)
    }

    pub fn unknown_user_names() -> Oid {
        stat(3)
    }

    pub fn unknown_engine_ids() -> Oid {
        stat(4)
    }

    pub fn wrong_digests() -> Oid {
        stat(5)
    }

    pub fn decryption_errors() -> Oid {
        stat(6)
    }
}

/// Which usmStats counter a Report carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    UnsupportedSecLevel,
    NotInTimeWindow,
    UnknownUserName,
    UnknownEngineId,
    WrongDigest,
    DecryptionError,
}

impl ReportKind {
    /// Reports that mean the credentials themselves were refused.
    ///
    /// `NotInTimeWindow` and `UnknownEngineId` are recoverable by resyncing.
    pub fn auth_failure(self) -> Option<AuthFailure> {
        match self {
            Self::UnsupportedSecLevel => Some(AuthFailure::UnsupportedSecurityLevel),
            Self::UnknownUserName => Some(AuthFailure::UnknownUserName),
            Self::WrongDigest => Some(AuthFailure::WrongDigest),
            Self::DecryptionError => Some(AuthFailure::DecryptionError),
            Self::NotInTimeWindow | Self::UnknownEngineId => None,
        }
    }
}

/// Classify a Report PDU by the usmStats OID it carries.
pub fn classify_report(pdu: &Pdu) -> Option<ReportKind> {
    if pdu.pdu_type != PduType::Report {
        return None;
    }
    let prefix = report_oids::unsupported_sec_levels().parent()?.parent()?;
    pdu.varbinds.iter().find_map(|vb| match vb.oid.suffix_after(&prefix)? {
        [1, 0] => Some(ReportKind::UnsupportedSecLevel),
        [2, 0] => Some(ReportKind::NotInTimeWindow),
        [3, 0] => Some(ReportKind::UnknownUserName),
        [4, 0] => Some(ReportKind::UnknownEngineId),
        [5, 0] => Some(ReportKind::WrongDigest),
        [6, 0] => Some(ReportKind::DecryptionError),
        _ => None,
    })
}

/// Authoritative engine state learned from discovery.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub engine_id: Bytes,
    pub engine_boots: u32,
    pub engine_time: u32,
    /// Local instant at which `engine_time` was observed.
    pub synced_at: Instant,
    /// Highest time seen in this boot cycle (anti-replay).
    pub latest_received_engine_time: u32,
    pub msg_max_size: u32,
}

impl EngineState {
    pub fn new(engine_id: Bytes, engine_boots: u32, engine_time: u32) -> Self {
        Self {
            engine_id,
            engine_boots,
            engine_time,
            synced_at: Instant::now(),
            latest_received_engine_time: engine_time,
            msg_max_size: MSG_MAX_SIZE as u32,
        }
    }

    /// Engine time advanced by local elapsed time, capped at [`MAX_ENGINE_TIME`].
    pub fn estimated_time(&self) -> u32 {
        let elapsed = u32::try_from(self.synced_at.elapsed().as_secs()).unwrap_or(u32::MAX);
        self.engine_time.saturating_add(elapsed).min(MAX_ENGINE_TIME)
    }

    /// Accept newer boots/time from an authenticated response.
    pub fn update_time(&mut self, boots: u32, time: u32) -> bool {
        let newer = boots > self.engine_boots
            || (boots == self.engine_boots && time > self.latest_received_engine_time);
        if newer {
            self.engine_boots = boots;
            self.engine_time = time;
            self.latest_received_engine_time = time;
            self.synced_at = Instant::now();
        }
        newer
    }

    pub fn is_in_time_window(&self, boots: u32, time: u32) -> bool {
        self.engine_boots != MAX_ENGINE_TIME
            && boots == self.engine_boots
            && time.abs_diff(self.estimated_time()) <= TIME_WINDOW
    }
}

/// Pull engine ID/boots/time out of a discovery Report.
pub fn parse_discovery_response(response: &V3Message, target: SocketAddr) -> Result<EngineState> {
    let usm = UsmSecurityParams::decode(response.security_params.clone())?;
    if usm.engine_id.is_empty() {
        tracing::debug!(target: "snmp_monitor::v3", { snmp.target = %target, kind = %DecodeErrorKind::EmptyResponse }, "discovery returned empty engine ID");
        return Err(Error::malformed(target));
    }
    let mut state = EngineState::new(usm.engine_id, usm.engine_boots, usm.engine_time);
    state.msg_max_size = u32::try_from(response.global_data.msg_max_size)
        .unwrap_or(MSG_MAX_SIZE as u32)
        .min(MSG_MAX_SIZE as u32);
    Ok(state)
}

/// TTL'd engine state, keyed by device identity.
#[derive(Debug)]
pub struct EngineCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (EngineState, Instant)>>,
}

impl EngineCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, identity: &str) -> Option<EngineState> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(identity) {
            Some((state, stored)) if stored.elapsed() < self.ttl => Some(state.clone()),
            Some(_) => {
                tracing::debug!(target: "snmp_monitor::v3", { device = identity }, "engine state expired");
                entries.remove(identity);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, identity: impl Into<String>, state: EngineState) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(identity.into(), (state, Instant::now()));
        }
    }

    /// Fold boots/time from a response into the cached entry, if any.
    pub fn update_time(&self, identity: &str, boots: u32, time: u32) -> bool {
        self.entries
            .lock()
            .ok()
            .and_then(|mut entries| {
                entries
                    .get_mut(identity)
                    .map(|(state, _)| state.update_time(boots, time))
            })
            .unwrap_or(false)
    }

    pub fn remove(&self, identity: &str) -> Option<EngineState> {
        self.entries.lock().ok()?.remove(identity).map(|(state, _)| state)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel};
    use crate::value::Value;
    use crate::varbind::VarBind;

    fn report(oid: crate::oid::Oid) -> Pdu {
        let mut pdu = Pdu::get_request(1, &[]);
        pdu.pdu_type = PduType::Report;
        pdu.varbinds.push(VarBind::new(oid, Value::Counter32(1)));
        pdu
    }

    #[test]
    fn reports_are_classified() {
        assert_eq!(
            classify_report(&report(report_oids::unknown_engine_ids())),
            Some(ReportKind::UnknownEngineId)
        );
        assert_eq!(
            classify_report(&report(report_oids::wrong_digests())),
            Some(ReportKind::WrongDigest)
        );
        assert_eq!(
            classify_report(&report(report_oids::decryption_errors())),
            Some(ReportKind::DecryptionError)
        );
        assert_eq!(classify_report(&report(crate::oid!(1, 3, 6, 1, 2, 1, 1, 1, 0))), None);

        let mut response = report(report_oids::wrong_digests());
        response.pdu_type = PduType::Response;
        assert_eq!(classify_report(&response), None);
    }

    #[test]
    fn only_credential_reports_are_auth_failures() {
        assert_eq!(ReportKind::WrongDigest.auth_failure(), Some(AuthFailure::WrongDigest));
        assert_eq!(
            ReportKind::UnknownUserName.auth_failure(),
            Some(AuthFailure::UnknownUserName)
        );
        assert_eq!(ReportKind::NotInTimeWindow.auth_failure(), None);
        assert_eq!(ReportKind::UnknownEngineId.auth_failure(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn estimated_time_tracks_local_clock() {
        let state = EngineState::new(Bytes::from_static(b"engine"), 1, 1000);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(state.estimated_time(), 1030);
        assert!(state.is_in_time_window(1, 1100));
        assert!(!state.is_in_time_window(1, 1300));
        assert!(!state.is_in_time_window(2, 1030));
    }

    #[tokio::test]
    async fn update_time_only_moves_forward() {
        let mut state = EngineState::new(Bytes::from_static(b"engine"), 5, 500);
        assert!(!state.update_time(5, 400));
        assert!(!state.update_time(4, 9999));
        assert!(state.update_time(5, 501));
        assert!(state.update_time(6, 3));
        assert_eq!((state.engine_boots, state.engine_time), (6, 3));
    }

    #[tokio::test(start_paused = true)]
    async fn cache_entries_expire() {
        let cache = EngineCache::new(Duration::from_secs(60));
        cache.insert("sw1:161/udp4", EngineState::new(Bytes::from_static(b"e"), 1, 1));
        assert!(cache.get("sw1:161/udp4").is_some());
        assert!(cache.update_time("sw1:161/udp4", 2, 0));
        assert_eq!(cache.get("sw1:161/udp4").unwrap().engine_boots, 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("sw1:161/udp4").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn discovery_response_yields_engine_state() {
        let target: SocketAddr = "192.0.2.5:161".parse().unwrap();
        let usm = UsmSecurityParams::new(&b"\x80\x00\x1f\x88\x80abc"[..], 9, 4242, Bytes::new());
        let mut global = MsgGlobalData::new(7, MsgFlags::new(SecurityLevel::NoAuthNoPriv, false));
        global.msg_max_size = 1500;
        let report_pdu = report(report_oids::unknown_engine_ids());
        let msg = V3Message::new(global, usm.encode(), ScopedPdu::new(Bytes::new(), Bytes::new(), report_pdu));

        let state = parse_discovery_response(&msg, target).unwrap();
        assert_eq!(&state.engine_id[..], b"\x80\x00\x1f\x88\x80abc");
        assert_eq!((state.engine_boots, state.engine_time), (9, 4242));
        assert_eq!(state.msg_max_size, 1500);

        let empty = V3Message::discovery_request(8);
        let err = parse_discovery_response(&empty, target).unwrap_err();
        assert!(matches!(*err, Error::MalformedResponse { target: t } if t == target));
    }
}
