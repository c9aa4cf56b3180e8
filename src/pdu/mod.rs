//! Protocol data units.
//!
//! Only the PDUs a manager sends or receives are modelled: the four request
//! kinds, Response, and the v3 Report.

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::internal::DecodeErrorKind;
use crate::error::{ErrorStatus, Result};
use crate::oid::Oid;
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};

/// PDU tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    GetRequest = tag::pdu::GET_REQUEST,
    GetNextRequest = tag::pdu::GET_NEXT_REQUEST,
    Response = tag::pdu::RESPONSE,
    SetRequest = tag::pdu::SET_REQUEST,
    GetBulkRequest = tag::pdu::GET_BULK_REQUEST,
    Report = tag::pdu::REPORT,
}

impl PduType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            tag::pdu::GET_REQUEST => Some(Self::GetRequest),
            tag::pdu::GET_NEXT_REQUEST => Some(Self::GetNextRequest),
            tag::pdu::RESPONSE => Some(Self::Response),
            tag::pdu::SET_REQUEST => Some(Self::SetRequest),
            tag::pdu::GET_BULK_REQUEST => Some(Self::GetBulkRequest),
            tag::pdu::REPORT => Some(Self::Report),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::GetRequest => "GetRequest",
            Self::GetNextRequest => "GetNextRequest",
            Self::Response => "Response",
            Self::SetRequest => "SetRequest",
            Self::GetBulkRequest => "GetBulkRequest",
            Self::Report => "Report",
        };
        f.write_str(name)
    }
}

/// Request/response PDU.
///
/// GETBULK reuses the two integer slots: `error_status` carries
/// non-repeaters and `error_index` carries max-repetitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: i32,
    /// 1-based index of the offending varbind, 0 when not applicable.
    pub error_index: i32,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    fn request(pdu_type: PduType, request_id: i32, oids: &[Oid]) -> Self {
        Self {
            pdu_type,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids.iter().cloned().map(VarBind::null).collect(),
        }
    }

    pub fn get_request(request_id: i32, oids: &[Oid]) -> Self {
        Self::request(PduType::GetRequest, request_id, oids)
    }

    pub fn get_next_request(request_id: i32, oids: &[Oid]) -> Self {
        Self::request(PduType::GetNextRequest, request_id, oids)
    }

    pub fn set_request(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::SetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    pub fn get_bulk(request_id: i32, non_repeaters: i32, max_repetitions: i32, oids: &[Oid]) -> Self {
        Self {
            error_status: non_repeaters,
            error_index: max_repetitions,
            ..Self::request(PduType::GetBulkRequest, request_id, oids)
        }
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.error_index);
            buf.push_integer(self.error_status);
            buf.push_integer(self.request_id);
        });
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let tag = decoder
            .peek_tag()
            .ok_or_else(|| decoder.error(DecodeErrorKind::MissingPdu))?;
        let pdu_type =
            PduType::from_tag(tag).ok_or_else(|| decoder.error(DecodeErrorKind::UnknownPduType(tag)))?;

        let mut body = decoder.read_constructed(tag)?;
        let request_id = body.read_integer()?;
        let error_status = body.read_integer()?;
        let error_index = body.read_integer()?;
        let varbinds = decode_varbind_list(&mut body)?;

        Ok(Pdu {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }

    pub fn is_error(&self) -> bool {
        self.error_status != 0
    }

    pub fn error_status_enum(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }

    /// OID named by `error_index`, if it points inside the varbind list.
    pub fn error_oid(&self) -> Option<&Oid> {
        let index = usize::try_from(self.error_index).ok()?.checked_sub(1)?;
        self.varbinds.get(index).map(|vb| &vb.oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use crate::value::Value;

    fn reencode(pdu: &Pdu) -> Pdu {
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        Pdu::decode(&mut Decoder::new(buf.finish())).unwrap()
    }

    #[test]
    fn get_request_wire_format() {
        let pdu = Pdu::get_request(1, &[oid!(1, 3, 6, 1)]);
        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        assert_eq!(
            &buf.finish()[..],
            &[
                0xA0, 0x14, 0x02, 0x01, 0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x09,
                0x30, 0x07, 0x06, 0x03, 0x2B, 0x06, 0x01, 0x05, 0x00
            ]
        );
    }

    #[test]
    fn getbulk_carries_repetition_fields() {
        let pdu = Pdu::get_bulk(9, 1, 25, &[oid!(1, 3, 6, 1, 2, 1, 2, 2)]);
        let decoded = reencode(&pdu);
        assert_eq!(decoded.pdu_type, PduType::GetBulkRequest);
        assert_eq!(decoded.error_status, 1);
        assert_eq!(decoded.error_index, 25);
    }

    #[test]
    fn error_oid_follows_one_based_index() {
        let mut pdu = Pdu::set_request(3, vec![
            VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 4, 0), Value::from("ops")),
            VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0), Value::from("sw1")),
        ]);
        pdu.pdu_type = PduType::Response;
        pdu.error_status = ErrorStatus::NotWritable.as_i32();
        pdu.error_index = 2;
        let decoded = reencode(&pdu);
        assert_eq!(decoded.error_status_enum(), ErrorStatus::NotWritable);
        assert_eq!(decoded.error_oid(), Some(&oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)));

        pdu.error_index = 0;
        assert_eq!(pdu.error_oid(), None);
        pdu.error_index = 7;
        assert_eq!(pdu.error_oid(), None);
    }

    #[test]
    fn trap_tags_are_rejected() {
        let mut dec = Decoder::from_slice(&[0xA7, 0x00]);
        assert!(Pdu::decode(&mut dec).is_err());
    }
}
