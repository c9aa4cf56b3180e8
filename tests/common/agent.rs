//! In-process UDP agent for testing.
//!
//! Serves a MIB view to v1/v2c requests carrying an accepted community and
//! to v3 noAuthNoPriv requests from known users. Requests with an unknown
//! community are dropped, as real agents do. The agent binds an ephemeral
//! localhost port and stops on drop.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use snmp_monitor::message::{CommunityMessage, Message, MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel, V3Message};
use snmp_monitor::transport::mib_reply;
use snmp_monitor::v3::{UsmSecurityParams, report_oids};
use snmp_monitor::{Oid, Pdu, PduType, Value, VarBind};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ENGINE_ID: &[u8] = b"\x80\x00\x1f\x88\x04test-agent";
pub const ENGINE_BOOTS: u32 = 3;
pub const ENGINE_TIME: u32 = 1200;

struct State {
    mib: Mutex<BTreeMap<Oid, Value>>,
    communities: HashSet<Vec<u8>>,
    users: HashSet<Vec<u8>>,
    requests: AtomicUsize,
    discoveries: AtomicUsize,
}

pub struct TestAgent {
    addr: SocketAddr,
    state: Arc<State>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

pub struct TestAgentBuilder {
    mib: BTreeMap<Oid, Value>,
    communities: HashSet<Vec<u8>>,
    users: HashSet<Vec<u8>>,
}

impl TestAgentBuilder {
    pub fn community(mut self, community: &str) -> Self {
        self.communities.insert(community.as_bytes().to_vec());
        self
    }

    pub fn user(mut self, username: &str) -> Self {
        self.users.insert(username.as_bytes().to_vec());
        self
    }

    pub async fn start(self) -> TestAgent {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind test agent");
        let addr = socket.local_addr().expect("test agent address");
        let state = Arc::new(State {
            mib: Mutex::new(self.mib),
            communities: self.communities,
            users: self.users,
            requests: AtomicUsize::new(0),
            discoveries: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();

        let task = tokio::spawn(serve(socket, Arc::clone(&state), cancel.clone()));
        TestAgent {
            addr,
            state,
            cancel,
            _task: task,
        }
    }
}

impl TestAgent {
    /// Agent answering community `public` and v3 user `monitor`.
    pub async fn new(mib: BTreeMap<Oid, Value>) -> Self {
        Self::builder(mib).community("public").user("monitor").start().await
    }

    pub fn builder(mib: BTreeMap<Oid, Value>) -> TestAgentBuilder {
        TestAgentBuilder {
            mib,
            communities: HashSet::new(),
            users: HashSet::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Datagrams received, including ones that were dropped.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// v3 engine discovery probes answered.
    pub fn discoveries(&self) -> usize {
        self.state.discoveries.load(Ordering::SeqCst)
    }

    pub fn set_value(&self, oid: Oid, value: Value) {
        self.state.mib.lock().unwrap().insert(oid, value);
    }

    pub fn value(&self, oid: &Oid) -> Option<Value> {
        self.state.mib.lock().unwrap().get(oid).cloned()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TestAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn serve(socket: UdpSocket, state: Arc<State>, cancel: CancellationToken) {
    let mut buf = vec![0u8; 65535];
    loop {
        let (len, peer) = tokio::select! {
            _ = cancel.cancelled() => return,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(_) => return,
            },
        };
        state.requests.fetch_add(1, Ordering::SeqCst);
        let data = Bytes::copy_from_slice(&buf[..len]);
        if let Some(reply) = respond(&state, data, peer) {
            let _ = socket.send_to(&reply, peer).await;
        }
    }
}

fn respond(state: &State, data: Bytes, peer: SocketAddr) -> Option<Bytes> {
    match Message::decode(data, peer).ok()? {
        Message::Community(request) => {
            if !state.communities.contains(request.community.as_ref()) {
                return None;
            }
            let mut mib = state.mib.lock().unwrap();
            Some(mib_reply(&mut mib, &request).encode())
        }
        Message::V3(request) => respond_v3(state, &request),
    }
}

fn respond_v3(state: &State, request: &V3Message) -> Option<Bytes> {
    let usm = UsmSecurityParams::decode(request.security_params.clone()).ok()?;

    if usm.engine_id.is_empty() {
        state.discoveries.fetch_add(1, Ordering::SeqCst);
        return Some(report(request, &usm, report_oids::unknown_engine_ids()));
    }
    if !state.users.contains(usm.username.as_ref()) {
        return Some(report(request, &usm, report_oids::unknown_user_names()));
    }
    if request.security_level() != SecurityLevel::NoAuthNoPriv {
        return Some(report(request, &usm, report_oids::unsupported_sec_levels()));
    }
    let scoped = request.scoped_pdu()?;

    // Reuse the community MIB logic with v2c exception semantics.
    let as_v2c = CommunityMessage::v2c(&b""[..], scoped.pdu.clone());
    let reply = {
        let mut mib = state.mib.lock().unwrap();
        mib_reply(&mut mib, &as_v2c)
    };
    Some(v3_reply(request, &usm, scoped, reply.pdu))
}

fn v3_reply(request: &V3Message, usm: &UsmSecurityParams, scoped: &ScopedPdu, pdu: Pdu) -> Bytes {
    let global = MsgGlobalData::new(request.msg_id(), MsgFlags::new(SecurityLevel::NoAuthNoPriv, false));
    let params = UsmSecurityParams::new(Bytes::from_static(ENGINE_ID), ENGINE_BOOTS, ENGINE_TIME, usm.username.clone());
    let scoped = ScopedPdu::new(Bytes::from_static(ENGINE_ID), scoped.context_name.clone(), pdu);
    V3Message::new(global, params.encode(), scoped).encode()
}

fn report(request: &V3Message, usm: &UsmSecurityParams, counter: Oid) -> Bytes {
    let request_id = request.scoped_pdu().map_or(request.msg_id(), |s| s.pdu.request_id);
    let pdu = Pdu {
        pdu_type: PduType::Report,
        request_id,
        error_status: 0,
        error_index: 0,
        varbinds: vec![VarBind::new(counter, Value::Counter32(1))],
    };
    let scoped = ScopedPdu::new(Bytes::from_static(ENGINE_ID), Bytes::new(), pdu);
    let global = MsgGlobalData::new(request.msg_id(), MsgFlags::new(SecurityLevel::NoAuthNoPriv, false));
    let params = UsmSecurityParams::new(Bytes::from_static(ENGINE_ID), ENGINE_BOOTS, ENGINE_TIME, usm.username.clone());
    V3Message::new(global, params.encode(), scoped).encode()
}
