//! Basic Encoding Rules (X.690) for the SNMP subset of ASN.1.
//!
//! Encoding writes back-to-front into [`EncodeBuf`] so that every length
//! is known before its header is emitted. Decoding slices a shared
//! [`bytes::Bytes`] buffer without copying.

mod decode;
mod encode;
pub mod length;

pub use decode::Decoder;
pub use encode::EncodeBuf;

/// Tag octets used by SNMP.
pub mod tag {
    pub const CONSTRUCTED: u8 = 0x20;

    pub mod universal {
        pub const INTEGER: u8 = 0x02;
        pub const OCTET_STRING: u8 = 0x04;
        pub const OCTET_STRING_CONSTRUCTED: u8 = 0x24;
        pub const NULL: u8 = 0x05;
        pub const OBJECT_IDENTIFIER: u8 = 0x06;
        pub const SEQUENCE: u8 = 0x30;
    }

    /// SMIv2 application types (RFC 2578).
    pub mod application {
        pub const IP_ADDRESS: u8 = 0x40;
        pub const COUNTER32: u8 = 0x41;
        pub const GAUGE32: u8 = 0x42;
        pub const TIMETICKS: u8 = 0x43;
        pub const OPAQUE: u8 = 0x44;
        pub const COUNTER64: u8 = 0x46;
    }

    /// Exception values carried in v2c/v3 response varbinds.
    pub mod context {
        pub const NO_SUCH_OBJECT: u8 = 0x80;
        pub const NO_SUCH_INSTANCE: u8 = 0x81;
        pub const END_OF_MIB_VIEW: u8 = 0x82;
    }

    pub mod pdu {
        pub const GET_REQUEST: u8 = 0xA0;
        pub const GET_NEXT_REQUEST: u8 = 0xA1;
        pub const RESPONSE: u8 = 0xA2;
        pub const SET_REQUEST: u8 = 0xA3;
        pub const GET_BULK_REQUEST: u8 = 0xA5;
        pub const REPORT: u8 = 0xA8;
    }
}
