//! Definite-form length octets (X.690 Section 8.1.3).
//!
//! Indefinite length (0x80) is rejected; SNMP never uses it.

use std::net::SocketAddr;

use crate::error::internal::DecodeErrorKind;
use crate::error::{Error, Result, UNKNOWN_TARGET};

/// Upper bound on any decoded length. Real SNMP messages are a few KB.
pub const MAX_LENGTH: usize = 0x20_0000;

/// Number of octets the length header for `len` occupies.
pub fn encoded_length_size(len: usize) -> usize {
    match len {
        0..=0x7F => 1,
        0x80..=0xFF => 2,
        0x100..=0xFFFF => 3,
        0x1_0000..=0xFF_FFFF => 4,
        _ => 5,
    }
}

/// Write the length octets for `len` into `out` in wire order, returning how
/// many were written.
pub fn encode_length(len: usize, out: &mut [u8; 5]) -> usize {
    let size = encoded_length_size(len);
    if size == 1 {
        out[0] = len as u8;
        return 1;
    }
    let value_octets = size - 1;
    out[0] = 0x80 | value_octets as u8;
    for i in 0..value_octets {
        out[1 + i] = (len >> (8 * (value_octets - 1 - i))) as u8;
    }
    size
}

/// Decode a length header, returning `(length, octets consumed)`.
///
/// `offset` is the position of `data[0]` in the enclosing buffer and is only
/// used for diagnostics.
pub fn decode_length(
    data: &[u8],
    offset: usize,
    target: Option<SocketAddr>,
) -> Result<(usize, usize)> {
    let fail = |kind: DecodeErrorKind| {
        tracing::debug!(target: "snmp_monitor::ber", { snmp.offset = offset, kind = %kind }, "bad length");
        Error::malformed(target.unwrap_or(UNKNOWN_TARGET))
    };

    let Some(&first) = data.first() else {
        return Err(fail(DecodeErrorKind::TruncatedData));
    };

    if first == 0x80 {
        return Err(fail(DecodeErrorKind::IndefiniteLength));
    }
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let octets = (first & 0x7F) as usize;
    if octets == 0 {
        return Err(fail(DecodeErrorKind::InvalidLength));
    }
    if octets > 4 {
        return Err(fail(DecodeErrorKind::LengthTooLong { octets }));
    }
    let Some(value_bytes) = data.get(1..=octets) else {
        return Err(fail(DecodeErrorKind::TruncatedData));
    };

    let len = value_bytes
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    if len > MAX_LENGTH {
        return Err(fail(DecodeErrorKind::LengthExceedsMax {
            length: len,
            max: MAX_LENGTH,
        }));
    }

    Ok((len, 1 + octets))
}
