//! Back-to-front BER encoder.

use bytes::Bytes;

use super::length::encode_length;
use super::tag;
use crate::oid::Oid;

/// Encoding buffer that grows towards the front.
///
/// Fields are pushed in reverse order: the last element of a SEQUENCE is
/// pushed first, then the header is written once the content length is
/// known. [`EncodeBuf::finish`] returns the bytes in wire order.
///
/// ```
/// use snmp_monitor::ber::EncodeBuf;
///
/// let mut buf = EncodeBuf::new();
/// buf.push_sequence(|buf| {
///     buf.push_integer(2);
///     buf.push_integer(1);
/// });
/// assert_eq!(&buf.finish()[..], &[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02]);
/// ```
#[derive(Debug, Default)]
pub struct EncodeBuf {
    // Stored reversed; flipped once in `finish`.
    rev: Vec<u8>,
}

impl EncodeBuf {
    pub fn new() -> Self {
        Self {
            rev: Vec::with_capacity(256),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.rev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rev.is_empty()
    }

    pub fn push_byte(&mut self, byte: u8) {
        self.rev.push(byte);
    }

    /// Prepend raw bytes, keeping their order.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.rev.extend(data.iter().rev());
    }

    pub fn push_tag(&mut self, tag: u8) {
        self.push_byte(tag);
    }

    pub fn push_length(&mut self, len: usize) {
        let mut octets = [0u8; 5];
        let n = encode_length(len, &mut octets);
        self.push_bytes(&octets[..n]);
    }

    /// Prepend a complete TLV with primitive content.
    fn push_tlv(&mut self, tag: u8, content: &[u8]) {
        self.push_bytes(content);
        self.push_length(content.len());
        self.push_tag(tag);
    }

    /// Signed INTEGER in minimal two's complement form.
    pub fn push_integer(&mut self, value: i32) {
        let bytes = value.to_be_bytes();
        let mut start = 0;
        while start < 3 {
            let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
                || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.push_tlv(tag::universal::INTEGER, &bytes[start..]);
    }

    /// Unsigned 32-bit value under an arbitrary tag (Counter32, Gauge32,
    /// TimeTicks, or a non-negative INTEGER such as engine boots).
    pub fn push_unsigned32(&mut self, tag: u8, value: u32) {
        let mut content = [0u8; 5];
        content[1..].copy_from_slice(&value.to_be_bytes());
        let n = minimal_unsigned(&content);
        self.push_tlv(tag, &content[n..]);
    }

    /// Counter64.
    pub fn push_integer64(&mut self, value: u64) {
        let mut content = [0u8; 9];
        content[1..].copy_from_slice(&value.to_be_bytes());
        let n = minimal_unsigned(&content);
        self.push_tlv(tag::application::COUNTER64, &content[n..]);
    }

    pub fn push_octet_string(&mut self, data: &[u8]) {
        self.push_tlv(tag::universal::OCTET_STRING, data);
    }

    pub fn push_null(&mut self) {
        self.push_tlv(tag::universal::NULL, &[]);
    }

    pub fn push_oid(&mut self, oid: &Oid) {
        self.push_tlv(tag::universal::OBJECT_IDENTIFIER, &oid.to_ber_smallvec());
    }

    pub fn push_ip_address(&mut self, addr: [u8; 4]) {
        self.push_tlv(tag::application::IP_ADDRESS, &addr);
    }

    /// Encode a SEQUENCE whose content is produced by `f`.
    ///
    /// `f` must push the elements last-to-first.
    pub fn push_sequence(&mut self, f: impl FnOnce(&mut Self)) {
        self.push_constructed(tag::universal::SEQUENCE, f);
    }

    /// Encode a constructed TLV (PDUs use context tags 0xA0..0xA8).
    pub fn push_constructed(&mut self, tag: u8, f: impl FnOnce(&mut Self)) {
        let mark = self.len();
        f(self);
        let content_len = self.len() - mark;
        self.push_length(content_len);
        self.push_tag(tag);
    }

    /// Consume the buffer and return the encoded bytes in wire order.
    pub fn finish(mut self) -> Bytes {
        self.rev.reverse();
        Bytes::from(self.rev)
    }
}

/// Index of the first octet to keep for a big-endian unsigned value that
/// was widened with one leading zero octet.
fn minimal_unsigned(content: &[u8]) -> usize {
    let mut start = 0;
    while start < content.len() - 1 && content[start] == 0 && content[start + 1] & 0x80 == 0 {
        start += 1;
    }
    start
}
