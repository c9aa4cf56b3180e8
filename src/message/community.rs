//! v1/v2c message: `SEQUENCE { version, community, pdu }`.

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf};
use crate::error::Result;
use crate::error::internal::DecodeErrorKind;
use crate::pdu::Pdu;
use crate::version::Version;

/// Community-authenticated message.
#[derive(Clone)]
pub struct CommunityMessage {
    /// V1 or V2c.
    pub version: Version,
    pub community: Bytes,
    pub pdu: Pdu,
}

impl std::fmt::Debug for CommunityMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunityMessage")
            .field("version", &self.version)
            .field("community", &"<redacted>")
            .field("pdu", &self.pdu)
            .finish()
    }
}

impl CommunityMessage {
    pub fn v1(community: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            version: Version::V1,
            community: community.into(),
            pdu,
        }
    }

    pub fn v2c(community: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            version: Version::V2c,
            community: community.into(),
            pdu,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.community);
            buf.push_integer(self.version.as_i32());
        });
        buf.finish()
    }

    /// Decode a standalone message.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;
        let raw = seq.read_integer()?;
        let version = Version::from_i32(raw)
            .ok_or_else(|| seq.error(DecodeErrorKind::UnknownVersion(raw)))?;
        Self::decode_from_sequence(&mut seq, version)
    }

    /// Decode the fields following msgVersion.
    pub(crate) fn decode_from_sequence(seq: &mut Decoder, version: Version) -> Result<Self> {
        if version == Version::V3 {
            return Err(seq.error(DecodeErrorKind::UnknownVersion(version.as_i32())));
        }
        let community = seq.read_octet_string()?;
        let pdu = Pdu::decode(seq)?;
        Ok(Self {
            version,
            community,
            pdu,
        })
    }

    pub fn into_pdu(self) -> Pdu {
        self.pdu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn v1_wire_format() {
        let msg = CommunityMessage::v1("public", Pdu::get_request(1, &[oid!(1, 3, 6, 1)]));
        let bytes = msg.encode();
        assert_eq!(&bytes[..5], &[0x30, 0x21, 0x02, 0x01, 0x00]);
        assert_eq!(&bytes[5..13], &[0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c']);
        assert_eq!(bytes[13], 0xA0);
    }

    #[test]
    fn decode_keeps_version_and_community() {
        for version in [Version::V1, Version::V2c] {
            let msg = CommunityMessage {
                version,
                community: Bytes::from_static(b"s3cret"),
                pdu: Pdu::get_request(9, &[oid!(1, 3, 6, 1)]),
            };
            let decoded = CommunityMessage::decode(msg.encode()).unwrap();
            assert_eq!(decoded.version, version);
            assert_eq!(decoded.community.as_ref(), b"s3cret");
            assert_eq!(decoded.pdu.request_id, 9);
        }
    }

    #[test]
    fn debug_hides_community() {
        let msg = CommunityMessage::v2c("s3cret", Pdu::get_request(1, &[]));
        assert!(!format!("{msg:?}").contains("s3cret"));
    }
}
