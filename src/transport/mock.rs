//! Scripted in-memory transport.
//!
//! Answers come from a queue first, then from an optional responder
//! closure, and otherwise the exchange times out. v1/v2c answers are built
//! from the request, so they always echo its version, community and request
//! ID. v3 tests script raw bytes.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;

use super::{Connector, Transport};
use crate::device::SnmpDevice;
use crate::error::{Error, ErrorStatus, Result};
use crate::message::CommunityMessage;
use crate::oid::Oid;
use crate::pdu::{Pdu, PduType};
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

/// What the mock agent does with one request.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Response PDU carrying these varbinds.
    Varbinds(Vec<VarBind>),
    /// Response PDU with a non-zero error-status; `index` is 1-based.
    Error { status: ErrorStatus, index: u32 },
    /// These bytes, verbatim.
    Raw(Bytes),
    /// No answer; `recv` waits out its timeout.
    Timeout,
    IoError(io::ErrorKind),
}

type Responder = dyn Fn(&[u8]) -> MockResponse + Send + Sync;

struct Inner {
    queue: VecDeque<MockResponse>,
    responder: Option<Arc<Responder>>,
    pending: VecDeque<(Bytes, MockResponse)>,
    requests: Vec<Bytes>,
}

/// In-memory agent. Clones share state, so a test can keep a handle while
/// the client owns another.
#[derive(Clone)]
pub struct MockTransport {
    target: SocketAddr,
    inner: Arc<Mutex<Inner>>,
    exchanges: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                responder: None,
                pending: VecDeque::new(),
                requests: Vec::new(),
            })),
            exchanges: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an answer for the next unanswered request.
    pub fn queue(&self, response: MockResponse) -> &Self {
        self.lock().queue.push_back(response);
        self
    }

    pub fn queue_varbinds(&self, varbinds: Vec<VarBind>) -> &Self {
        self.queue(MockResponse::Varbinds(varbinds))
    }

    pub fn queue_timeout(&self) -> &Self {
        self.queue(MockResponse::Timeout)
    }

    /// Answer every request the queue does not cover from the raw bytes.
    pub fn set_responder(&self, responder: impl Fn(&[u8]) -> MockResponse + Send + Sync + 'static) {
        self.lock().responder = Some(Arc::new(responder));
    }

    /// Answer v1/v2c requests from their decoded PDU. Anything that is not
    /// a community message times out.
    pub fn set_pdu_responder(&self, responder: impl Fn(&Pdu) -> MockResponse + Send + Sync + 'static) {
        self.set_responder(move |data| match CommunityMessage::decode(Bytes::copy_from_slice(data)) {
            Ok(msg) => responder(&msg.pdu),
            Err(_) => MockResponse::Timeout,
        });
    }

    /// Answer v1/v2c requests from a MIB view, applying SETs to it.
    pub fn serve_mib(&self, mib: BTreeMap<Oid, Value>) {
        let mib = Mutex::new(mib);
        self.set_responder(move |data| match CommunityMessage::decode(Bytes::copy_from_slice(data)) {
            Ok(request) => {
                let mut mib = mib.lock().unwrap_or_else(PoisonError::into_inner);
                MockResponse::Raw(mib_reply(&mut mib, &request).encode())
            }
            Err(_) => MockResponse::Timeout,
        });
    }

    /// Number of messages sent through this transport and its clones.
    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    /// Every message sent so far, oldest first.
    pub fn requests(&self) -> Vec<Bytes> {
        self.lock().requests.clone()
    }

    /// Decoded PDUs of the v1/v2c requests sent so far.
    pub fn request_pdus(&self) -> Vec<Pdu> {
        self.requests()
            .into_iter()
            .filter_map(|data| CommunityMessage::decode(data).ok())
            .map(CommunityMessage::into_pdu)
            .collect()
    }

    fn build(&self, request: &[u8], response: MockResponse) -> Result<Bytes> {
        let community = |edit: &dyn Fn(&mut Pdu)| -> Result<Bytes> {
            let mut msg = CommunityMessage::decode(Bytes::copy_from_slice(request))?;
            msg.pdu.pdu_type = PduType::Response;
            msg.pdu.error_status = 0;
            msg.pdu.error_index = 0;
            edit(&mut msg.pdu);
            Ok(msg.encode())
        };
        match response {
            MockResponse::Varbinds(varbinds) => community(&|pdu| pdu.varbinds = varbinds.clone()),
            MockResponse::Error { status, index } => community(&|pdu| {
                pdu.error_status = status.as_i32();
                pdu.error_index = i32::try_from(index).unwrap_or(i32::MAX);
            }),
            MockResponse::Raw(data) => Ok(data),
            MockResponse::Timeout => Err(Error::Timeout {
                target: self.target,
                elapsed: Duration::ZERO,
                retries: 0,
            }
            .boxed()),
            MockResponse::IoError(kind) => Err(Error::Network {
                target: self.target,
                source: io::Error::new(kind, "mock transport failure"),
            }
            .boxed()),
        }
    }
}

impl Transport for MockTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        let request = Bytes::copy_from_slice(data);
        let mut inner = self.lock();
        inner.requests.push(request.clone());
        let response = match inner.queue.pop_front() {
            Some(response) => response,
            None => match &inner.responder {
                Some(responder) => responder(data),
                None => MockResponse::Timeout,
            },
        };
        inner.pending.push_back((request, response));
        Ok(())
    }

    async fn recv(&self, _request_id: i32, timeout: Duration) -> Result<Bytes> {
        let next = self.lock().pending.pop_front();
        let Some((request, response)) = next else {
            tokio::time::sleep(timeout).await;
            return Err(Error::Timeout { target: self.target, elapsed: timeout, retries: 0 }.boxed());
        };
        match self.build(&request, response) {
            Err(e) if matches!(*e, Error::Timeout { .. }) => {
                tokio::time::sleep(timeout).await;
                Err(Error::Timeout { target: self.target, elapsed: timeout, retries: 0 }.boxed())
            }
            other => other,
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.target
    }
}

impl Connector for MockTransport {
    type Transport = MockTransport;

    async fn connect(&self, _device: &SnmpDevice) -> Result<MockTransport> {
        Ok(self.clone())
    }
}

fn next_after(mib: &BTreeMap<Oid, Value>, oid: &Oid) -> Option<VarBind> {
    mib.range((Bound::Excluded(oid.clone()), Bound::Unbounded))
        .next()
        .map(|(oid, value)| VarBind::new(oid.clone(), value.clone()))
}

/// The response an agent exposing `mib` would send to `request`.
///
/// v1 requests get `noSuchName` errors where v2c gets exception values.
/// SETs succeed only on OIDs already present in the view.
pub fn mib_reply(mib: &mut BTreeMap<Oid, Value>, request: &CommunityMessage) -> CommunityMessage {
    let pdu = &request.pdu;
    let v1 = request.version == Version::V1;

    let mut failed: Option<(ErrorStatus, usize)> = None;
    let mut varbinds = Vec::with_capacity(pdu.varbinds.len());
    match pdu.pdu_type {
        PduType::GetRequest => {
            for (i, vb) in pdu.varbinds.iter().enumerate() {
                match mib.get(&vb.oid) {
                    Some(value) => varbinds.push(VarBind::new(vb.oid.clone(), value.clone())),
                    None if v1 => {
                        failed = Some((ErrorStatus::NoSuchName, i + 1));
                        break;
                    }
                    None => varbinds.push(VarBind::new(vb.oid.clone(), Value::NoSuchInstance)),
                }
            }
        }
        PduType::GetNextRequest => {
            for (i, vb) in pdu.varbinds.iter().enumerate() {
                match next_after(mib, &vb.oid) {
                    Some(next) => varbinds.push(next),
                    None if v1 => {
                        failed = Some((ErrorStatus::NoSuchName, i + 1));
                        break;
                    }
                    None => varbinds.push(VarBind::new(vb.oid.clone(), Value::EndOfMibView)),
                }
            }
        }
        PduType::GetBulkRequest => {
            let non_repeaters = usize::try_from(pdu.error_status).unwrap_or(0).min(pdu.varbinds.len());
            let max_repetitions = usize::try_from(pdu.error_index).unwrap_or(0);
            let (scalars, columns) = pdu.varbinds.split_at(non_repeaters);
            for vb in scalars {
                varbinds.push(next_after(mib, &vb.oid).unwrap_or_else(|| VarBind::new(vb.oid.clone(), Value::EndOfMibView)));
            }
            let mut cursors: Vec<Oid> = columns.iter().map(|vb| vb.oid.clone()).collect();
            for _ in 0..max_repetitions {
                let mut advanced = false;
                for cursor in cursors.iter_mut() {
                    match next_after(mib, cursor) {
                        Some(next) => {
                            *cursor = next.oid.clone();
                            varbinds.push(next);
                            advanced = true;
                        }
                        None => varbinds.push(VarBind::new(cursor.clone(), Value::EndOfMibView)),
                    }
                }
                if !advanced {
                    break;
                }
            }
        }
        PduType::SetRequest => {
            match pdu.varbinds.iter().position(|vb| !mib.contains_key(&vb.oid)) {
                Some(i) => failed = Some((ErrorStatus::NotWritable, i + 1)),
                None => {
                    for vb in &pdu.varbinds {
                        mib.insert(vb.oid.clone(), vb.value.clone());
                    }
                    varbinds = pdu.varbinds.clone();
                }
            }
        }
        PduType::Response | PduType::Report => failed = Some((ErrorStatus::GenErr, 0)),
    }

    let mut response = Pdu {
        pdu_type: PduType::Response,
        request_id: pdu.request_id,
        error_status: 0,
        error_index: 0,
        varbinds,
    };
    if let Some((status, index)) = failed {
        response.error_status = status.as_i32();
        response.error_index = i32::try_from(index).unwrap_or(0);
        response.varbinds = pdu.varbinds.clone();
    }
    CommunityMessage {
        version: request.version,
        community: request.community.clone(),
        pdu: response,
    }
}
