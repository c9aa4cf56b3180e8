//! SNMP values.
//!
//! [`Value`] is a tagged union over every SMIv2 type plus the three v2
//! exception markers, so a decoded varbind is always one of a known set of
//! shapes.

use std::net::Ipv4Addr;

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::internal::DecodeErrorKind;
use crate::error::{Error, Result};
use crate::oid::Oid;

/// SNMP value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    Integer(i32),
    OctetString(Bytes),
    Null,
    ObjectIdentifier(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    /// Gauge32 / Unsigned32.
    Gauge32(u32),
    /// Hundredths of a second.
    TimeTicks(u32),
    Opaque(Bytes),
    /// v2c/v3 only.
    Counter64(u64),
    /// The object is not implemented by the agent.
    NoSuchObject,
    /// The object exists but this instance does not.
    NoSuchInstance,
    /// A GETNEXT/GETBULK ran off the end of the agent's MIB view.
    EndOfMibView,
    /// Application tag this crate does not model, kept verbatim.
    Unknown { tag: u8, data: Bytes },
}

impl Value {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Any unsigned 32-bit type, or a non-negative INTEGER.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(*v),
            Value::Integer(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Counter64 or anything [`Value::as_u32`] accepts, widened.
    ///
    /// ```
    /// use snmp_monitor::Value;
    ///
    /// assert_eq!(Value::Counter64(10_000_000_000).as_u64(), Some(10_000_000_000));
    /// assert_eq!(Value::Counter32(7).as_u64(), Some(7));
    /// assert_eq!(Value::Integer(-1).as_u64(), None);
    /// ```
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Counter64(v) => Some(*v),
            other => other.as_u32().map(u64::from),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::OctetString(v) | Value::Opaque(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Value::ObjectIdentifier(oid) => Some(oid),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<Ipv4Addr> {
        match self {
            Value::IpAddress(bytes) => Some(Ipv4Addr::from(*bytes)),
            _ => None,
        }
    }

    /// noSuchObject, noSuchInstance or endOfMibView.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    /// Protocol type tag as shown to HTTP callers.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::OctetString(_) => "OCTET STRING",
            Value::Null => "NULL",
            Value::ObjectIdentifier(_) => "OBJECT IDENTIFIER",
            Value::IpAddress(_) => "IpAddress",
            Value::Counter32(_) => "Counter32",
            Value::Gauge32(_) => "Gauge32",
            Value::TimeTicks(_) => "TimeTicks",
            Value::Opaque(_) => "Opaque",
            Value::Counter64(_) => "Counter64",
            Value::NoSuchObject => "noSuchObject",
            Value::NoSuchInstance => "noSuchInstance",
            Value::EndOfMibView => "endOfMibView",
            Value::Unknown { .. } => "Unknown",
        }
    }

    /// JSON rendering of the payload.
    ///
    /// Printable octet strings become JSON strings, binary ones become hex.
    /// Exceptions render as `null`; their [`type_name`](Self::type_name)
    /// says which one.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Integer(v) => Json::from(*v),
            Value::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) if !s.chars().any(|c| c.is_control() && !c.is_whitespace()) => {
                    Json::from(s)
                }
                _ => Json::from(hex::encode(data)),
            },
            Value::ObjectIdentifier(oid) => Json::from(oid.to_string()),
            Value::IpAddress(addr) => Json::from(Ipv4Addr::from(*addr).to_string()),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Json::from(*v),
            Value::Counter64(v) => Json::from(*v),
            Value::Opaque(data) | Value::Unknown { data, .. } => Json::from(hex::encode(data)),
            Value::Null | Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView => {
                Json::Null
            }
        }
    }

    /// Build a value from a type tag and a JSON payload, as submitted in a
    /// SET request.
    ///
    /// ```
    /// use snmp_monitor::Value;
    /// use serde_json::json;
    ///
    /// assert_eq!(Value::from_typed("Gauge32", &json!(42)).unwrap(), Value::Gauge32(42));
    /// assert_eq!(Value::from_typed("INTEGER", &json!("-5")).unwrap(), Value::Integer(-5));
    /// assert!(Value::from_typed("Counter32", &json!(-1)).is_err());
    /// ```
    pub fn from_typed(type_name: &str, value: &serde_json::Value) -> Result<Self> {
        let invalid = || {
            Error::validation(vec![format!(
                "value {value} is not a valid {type_name}"
            )])
        };
        // Numbers may arrive as JSON numbers or as numeric strings.
        let integer = || -> Option<i64> {
            value
                .as_i64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        };
        let unsigned = || -> Option<u64> {
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        };
        let text = || value.as_str().ok_or_else(invalid);

        let parsed = match type_name {
            "INTEGER" => Value::Integer(
                integer()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(invalid)?,
            ),
            "OCTET STRING" => Value::OctetString(Bytes::copy_from_slice(text()?.as_bytes())),
            "OBJECT IDENTIFIER" => {
                Value::ObjectIdentifier(Oid::parse(text()?).map_err(|_| invalid())?)
            }
            "IpAddress" => {
                let addr: Ipv4Addr = text()?.parse().map_err(|_| invalid())?;
                Value::IpAddress(addr.octets())
            }
            "Counter32" | "Gauge32" | "TimeTicks" => {
                let v = unsigned()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(invalid)?;
                match type_name {
                    "Counter32" => Value::Counter32(v),
                    "Gauge32" => Value::Gauge32(v),
                    _ => Value::TimeTicks(v),
                }
            }
            "Counter64" => Value::Counter64(unsigned().ok_or_else(invalid)?),
            "Opaque" => Value::Opaque(Bytes::from(
                hex::decode(text()?.trim_start_matches("0x")).map_err(|_| invalid())?,
            )),
            "NULL" => Value::Null,
            other => {
                return Err(Error::validation(vec![format!(
                    "unsupported value type {other:?}"
                )]));
            }
        };
        Ok(parsed)
    }

    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Value::Integer(v) => buf.push_integer(*v),
            Value::OctetString(data) => buf.push_octet_string(data),
            Value::Null => buf.push_null(),
            Value::ObjectIdentifier(oid) => buf.push_oid(oid),
            Value::IpAddress(addr) => buf.push_ip_address(*addr),
            Value::Counter32(v) => buf.push_unsigned32(tag::application::COUNTER32, *v),
            Value::Gauge32(v) => buf.push_unsigned32(tag::application::GAUGE32, *v),
            Value::TimeTicks(v) => buf.push_unsigned32(tag::application::TIMETICKS, *v),
            Value::Opaque(data) => push_raw(buf, tag::application::OPAQUE, data),
            Value::Counter64(v) => buf.push_integer64(*v),
            Value::NoSuchObject => push_raw(buf, tag::context::NO_SUCH_OBJECT, &[]),
            Value::NoSuchInstance => push_raw(buf, tag::context::NO_SUCH_INSTANCE, &[]),
            Value::EndOfMibView => push_raw(buf, tag::context::END_OF_MIB_VIEW, &[]),
            Value::Unknown { tag, data } => push_raw(buf, *tag, data),
        }
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let tag = decoder.read_tag()?;
        let len = decoder.read_length()?;

        let value = match tag {
            tag::universal::INTEGER => Value::Integer(decoder.read_integer_value(len)?),
            tag::universal::OCTET_STRING => Value::OctetString(decoder.read_bytes(len)?),
            tag::universal::NULL => {
                if len != 0 {
                    return Err(decoder.error(DecodeErrorKind::InvalidNull));
                }
                Value::Null
            }
            tag::universal::OBJECT_IDENTIFIER => {
                Value::ObjectIdentifier(decoder.read_oid_value(len)?)
            }
            tag::application::IP_ADDRESS => {
                if len != 4 {
                    return Err(
                        decoder.error(DecodeErrorKind::InvalidIpAddressLength { length: len })
                    );
                }
                let data = decoder.read_bytes(4)?;
                Value::IpAddress([data[0], data[1], data[2], data[3]])
            }
            tag::application::COUNTER32 => Value::Counter32(decoder.read_unsigned32_value(len)?),
            tag::application::GAUGE32 => Value::Gauge32(decoder.read_unsigned32_value(len)?),
            tag::application::TIMETICKS => Value::TimeTicks(decoder.read_unsigned32_value(len)?),
            tag::application::OPAQUE => Value::Opaque(decoder.read_bytes(len)?),
            tag::application::COUNTER64 => Value::Counter64(decoder.read_integer64_value(len)?),
            tag::context::NO_SUCH_OBJECT => {
                decoder.read_bytes(len)?;
                Value::NoSuchObject
            }
            tag::context::NO_SUCH_INSTANCE => {
                decoder.read_bytes(len)?;
                Value::NoSuchInstance
            }
            tag::context::END_OF_MIB_VIEW => {
                decoder.read_bytes(len)?;
                Value::EndOfMibView
            }
            tag::universal::OCTET_STRING_CONSTRUCTED => {
                return Err(decoder.error(DecodeErrorKind::ConstructedOctetString));
            }
            _ => Value::Unknown {
                tag,
                data: decoder.read_bytes(len)?,
            },
        };
        Ok(value)
    }
}

fn push_raw(buf: &mut EncodeBuf, tag: u8, data: &[u8]) {
    buf.push_bytes(data);
    buf.push_length(data.len());
    buf.push_tag(tag);
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) => f.write_str(s),
                Err(_) => write!(f, "0x{}", hex::encode(data)),
            },
            Value::Null => f.write_str("NULL"),
            Value::ObjectIdentifier(oid) => write!(f, "{oid}"),
            Value::IpAddress(addr) => write!(f, "{}", Ipv4Addr::from(*addr)),
            Value::Counter32(v) | Value::Gauge32(v) => write!(f, "{v}"),
            Value::TimeTicks(v) => {
                let secs = v / 100;
                write!(
                    f,
                    "{}d {}h {}m {}s",
                    secs / 86400,
                    (secs % 86400) / 3600,
                    (secs % 3600) / 60,
                    secs % 60
                )
            }
            Value::Opaque(data) => write!(f, "Opaque(0x{})", hex::encode(data)),
            Value::Counter64(v) => write!(f, "{v}"),
            Value::NoSuchObject => f.write_str("noSuchObject"),
            Value::NoSuchInstance => f.write_str("noSuchInstance"),
            Value::EndOfMibView => f.write_str("endOfMibView"),
            Value::Unknown { tag, data } => {
                write!(f, "Unknown(tag=0x{tag:02X}, data=0x{})", hex::encode(data))
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::OctetString(Bytes::from(s))
    }
}

impl From<Oid> for Value {
    fn from(oid: Oid) -> Self {
        Value::ObjectIdentifier(oid)
    }
}

impl From<Ipv4Addr> for Value {
    fn from(addr: Ipv4Addr) -> Self {
        Value::IpAddress(addr.octets())
    }
}
