//! SNMP message wrappers.
//!
//! - [`CommunityMessage`]: v1/v2c, authenticated by a community string
//! - [`V3Message`]: v3 with USM security parameters

mod community;
mod v3;

pub use community::CommunityMessage;
pub use v3::{
    MSG_MAX_SIZE, MsgFlags, MsgGlobalData, ScopedPdu, SecurityLevel, SecurityModel, V3Message,
    V3MessageData,
};

use std::net::SocketAddr;

use bytes::Bytes;

use crate::ber::Decoder;
use crate::error::Result;
use crate::error::internal::DecodeErrorKind;
use crate::version::Version;

/// A decoded message of any version.
#[derive(Debug)]
pub enum Message {
    Community(CommunityMessage),
    V3(V3Message),
}

impl Message {
    pub fn version(&self) -> Version {
        match self {
            Message::Community(m) => m.version,
            Message::V3(_) => Version::V3,
        }
    }

    /// Decode a datagram received from `target`, dispatching on msgVersion.
    pub fn decode(data: Bytes, target: SocketAddr) -> Result<Self> {
        let mut decoder = Decoder::with_target(data, target);
        let mut seq = decoder.read_sequence()?;

        let raw = seq.read_integer()?;
        match Version::from_i32(raw) {
            Some(version @ (Version::V1 | Version::V2c)) => Ok(Message::Community(
                CommunityMessage::decode_from_sequence(&mut seq, version)?,
            )),
            Some(Version::V3) => Ok(Message::V3(V3Message::decode_from_sequence(&mut seq)?)),
            None => Err(seq.error(DecodeErrorKind::UnknownVersion(raw))),
        }
    }
}

impl From<CommunityMessage> for Message {
    fn from(msg: CommunityMessage) -> Self {
        Message::Community(msg)
    }
}

impl From<V3Message> for Message {
    fn from(msg: V3Message) -> Self {
        Message::V3(msg)
    }
}
