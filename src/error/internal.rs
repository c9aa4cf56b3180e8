//! Detailed failure kinds used for debug logging.
//!
//! Callers only ever see the coarse public [`Error`](super::Error) variants.
//! These kinds carry the wire-level detail into `tracing` fields so that a
//! malformed packet can be diagnosed without widening the public API.

use std::fmt;

/// Why a BER/SNMP decode failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeErrorKind {
    TruncatedData,
    InsufficientData { needed: usize, available: usize },
    UnexpectedTag { expected: u8, actual: u8 },
    IndefiniteLength,
    InvalidLength,
    LengthTooLong { octets: usize },
    LengthExceedsMax { length: usize, max: usize },
    ZeroLengthInteger,
    Integer64TooLong { length: usize },
    IntegerOverflow,
    InvalidNull,
    InvalidIpAddressLength { length: usize },
    ConstructedOctetString,
    OidTooLong { count: usize, max: usize },
    TlvOverflow,
    UnknownVersion(i32),
    UnknownPduType(u8),
    InvalidMsgFlags,
    InvalidMsgId { value: i32 },
    MsgMaxSizeTooSmall { value: i32, minimum: i32 },
    UnknownSecurityModel(i32),
    InvalidEngineBoots { value: i32 },
    InvalidEngineTime { value: i32 },
    EmptyResponse,
    MissingPdu,
    ExpectedEncryption,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedData => write!(f, "truncated data"),
            Self::InsufficientData { needed, available } => {
                write!(f, "need {needed} bytes, {available} available")
            }
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{expected:02X}, got 0x{actual:02X}")
            }
            Self::IndefiniteLength => write!(f, "indefinite length not supported"),
            Self::InvalidLength => write!(f, "invalid length encoding"),
            Self::LengthTooLong { octets } => write!(f, "length uses {octets} octets"),
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {length} exceeds maximum {max}")
            }
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::Integer64TooLong { length } => write!(f, "64-bit integer of {length} bytes"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::InvalidNull => write!(f, "NULL with content"),
            Self::InvalidIpAddressLength { length } => {
                write!(f, "IpAddress of {length} bytes")
            }
            Self::ConstructedOctetString => write!(f, "constructed OCTET STRING"),
            Self::OidTooLong { count, max } => write!(f, "OID has {count} arcs, max {max}"),
            Self::TlvOverflow => write!(f, "TLV extends past end of data"),
            Self::UnknownVersion(v) => write!(f, "unknown SNMP version {v}"),
            Self::UnknownPduType(t) => write!(f, "unknown PDU tag 0x{t:02X}"),
            Self::InvalidMsgFlags => write!(f, "invalid msgFlags"),
            Self::InvalidMsgId { value } => write!(f, "invalid msgID {value}"),
            Self::MsgMaxSizeTooSmall { value, minimum } => {
                write!(f, "msgMaxSize {value} below {minimum}")
            }
            Self::UnknownSecurityModel(m) => write!(f, "unknown security model {m}"),
            Self::InvalidEngineBoots { value } => write!(f, "invalid engine boots {value}"),
            Self::InvalidEngineTime { value } => write!(f, "invalid engine time {value}"),
            Self::EmptyResponse => write!(f, "response carried no varbinds"),
            Self::MissingPdu => write!(f, "message carried no PDU"),
            Self::ExpectedEncryption => write!(f, "expected encrypted scoped PDU"),
        }
    }
}

/// Why an encryption or decryption step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CryptoErrorKind {
    InvalidKeyLength,
    InvalidPrivParamsLength { expected: usize, actual: usize },
    InvalidCiphertextLength { length: usize, block_size: usize },
    CipherError,
    NoPrivKey,
}

impl fmt::Display for CryptoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKeyLength => write!(f, "invalid key length"),
            Self::InvalidPrivParamsLength { expected, actual } => {
                write!(f, "privParameters of {actual} bytes, expected {expected}")
            }
            Self::InvalidCiphertextLength { length, block_size } => {
                write!(f, "ciphertext of {length} bytes is not a multiple of {block_size}")
            }
            Self::CipherError => write!(f, "cipher error"),
            Self::NoPrivKey => write!(f, "no privacy key derived"),
        }
    }
}
