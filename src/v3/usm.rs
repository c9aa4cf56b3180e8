//! UsmSecurityParameters (RFC 3414 Section 2.4).
//!
//! ```text
//! SEQUENCE {
//!     msgAuthoritativeEngineID     OCTET STRING,
//!     msgAuthoritativeEngineBoots  INTEGER (0..2147483647),
//!     msgAuthoritativeEngineTime   INTEGER (0..2147483647),
//!     msgUserName                  OCTET STRING (SIZE(0..32)),
//!     msgAuthenticationParameters  OCTET STRING,
//!     msgPrivacyParameters         OCTET STRING
//! }
//! ```

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::Result;
use crate::error::internal::DecodeErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsmSecurityParams {
    pub engine_id: Bytes,
    pub engine_boots: u32,
    pub engine_time: u32,
    pub username: Bytes,
    pub auth_params: Bytes,
    pub priv_params: Bytes,
}

impl UsmSecurityParams {
    pub fn new(
        engine_id: impl Into<Bytes>,
        engine_boots: u32,
        engine_time: u32,
        username: impl Into<Bytes>,
    ) -> Self {
        Self {
            engine_id: engine_id.into(),
            engine_boots,
            engine_time,
            username: username.into(),
            auth_params: Bytes::new(),
            priv_params: Bytes::new(),
        }
    }

    /// All-empty parameters carried by a discovery request.
    pub fn empty() -> Self {
        Self::new(Bytes::new(), 0, 0, Bytes::new())
    }

    /// Zero-filled msgAuthenticationParameters, patched after the MAC is computed.
    pub fn with_auth_placeholder(mut self, mac_len: usize) -> Self {
        self.auth_params = Bytes::from(vec![0u8; mac_len]);
        self
    }

    pub fn with_priv_params(mut self, priv_params: impl Into<Bytes>) -> Self {
        self.priv_params = priv_params.into();
        self
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            buf.push_octet_string(&self.priv_params);
            buf.push_octet_string(&self.auth_params);
            buf.push_octet_string(&self.username);
            buf.push_unsigned32(tag::universal::INTEGER, self.engine_time);
            buf.push_unsigned32(tag::universal::INTEGER, self.engine_boots);
            buf.push_octet_string(&self.engine_id);
        });
        buf.finish()
    }

    pub fn decode(data: Bytes) -> Result<Self> {
        Self::decode_from(&mut Decoder::new(data))
    }

    pub fn decode_from(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let engine_id = seq.read_octet_string()?;

        let boots = seq.read_integer()?;
        let engine_boots = u32::try_from(boots)
            .map_err(|_| seq.error(DecodeErrorKind::InvalidEngineBoots { value: boots }))?;
        let time = seq.read_integer()?;
        let engine_time = u32::try_from(time)
            .map_err(|_| seq.error(DecodeErrorKind::InvalidEngineTime { value: time }))?;

        Ok(Self {
            engine_id,
            engine_boots,
            engine_time,
            username: seq.read_octet_string()?,
            auth_params: seq.read_octet_string()?,
            priv_params: seq.read_octet_string()?,
        })
    }

    /// Locate msgAuthenticationParameters inside a complete encoded v3
    /// message, returning `(offset, length)` of its content.
    pub fn find_auth_params_offset(message: &[u8]) -> Option<(usize, usize)> {
        let mut dec = Decoder::from_slice(message);
        dec.expect_tag(tag::universal::SEQUENCE).ok()?;
        // msgVersion, msgGlobalData
        dec.skip_tlv().ok()?;
        dec.skip_tlv().ok()?;
        dec.expect_tag(tag::universal::OCTET_STRING).ok()?;
        dec.expect_tag(tag::universal::SEQUENCE).ok()?;
        // engine ID, boots, time, user name
        for _ in 0..4 {
            dec.skip_tlv().ok()?;
        }
        let len = dec.expect_tag(tag::universal::OCTET_STRING).ok()?;
        let offset = dec.offset();
        (offset + len <= message.len()).then_some((offset, len))
    }
}
