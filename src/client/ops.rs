//! Result types of the high-level client operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ErrorStatus;
use crate::oid::Oid;
use crate::poller::InterfaceStatus;
use crate::value::Value;
use crate::varbind::VarBind;

/// Well-known OIDs.
pub mod oids {
    use crate::oid::Oid;

    /// system group (1.3.6.1.2.1.1)
    pub fn system() -> Oid {
        Oid::from_slice(&[1, 3, 6, 1, 2, 1, 1])
    }

    fn system_scalar(n: u32) -> Oid {
        system().child(n).child(0)
    }

    pub fn sys_descr() -> Oid {
        system_scalar(1)
    }

    pub fn sys_object_id() -> Oid {
        system_scalar(2)
    }

    pub fn sys_uptime() -> Oid {
        system_scalar(3)
    }

    pub fn sys_contact() -> Oid {
        system_scalar(4)
    }

    pub fn sys_name() -> Oid {
        system_scalar(5)
    }

    pub fn sys_location() -> Oid {
        system_scalar(6)
    }

    /// ifEntry (1.3.6.1.2.1.2.2.1)
    pub fn if_entry() -> Oid {
        Oid::from_slice(&[1, 3, 6, 1, 2, 1, 2, 2, 1])
    }

    /// ifXEntry (1.3.6.1.2.1.31.1.1.1)
    pub fn if_x_entry() -> Oid {
        Oid::from_slice(&[1, 3, 6, 1, 2, 1, 31, 1, 1, 1])
    }
}

/// Reference entry served by `GET /snmp/oids/common`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CommonOid {
    pub name: &'static str,
    pub oid: &'static str,
    pub description: &'static str,
}

pub const COMMON_OIDS: &[CommonOid] = &[
    CommonOid { name: "sysDescr", oid: "1.3.6.1.2.1.1.1.0", description: "System description" },
    CommonOid { name: "sysObjectID", oid: "1.3.6.1.2.1.1.2.0", description: "Vendor object identifier" },
    CommonOid { name: "sysUpTime", oid: "1.3.6.1.2.1.1.3.0", description: "Time since the agent started, in hundredths of a second" },
    CommonOid { name: "sysContact", oid: "1.3.6.1.2.1.1.4.0", description: "Contact person" },
    CommonOid { name: "sysName", oid: "1.3.6.1.2.1.1.5.0", description: "Administratively assigned name" },
    CommonOid { name: "sysLocation", oid: "1.3.6.1.2.1.1.6.0", description: "Physical location" },
    CommonOid { name: "ifNumber", oid: "1.3.6.1.2.1.2.1.0", description: "Number of interfaces" },
    CommonOid { name: "ifTable", oid: "1.3.6.1.2.1.2.2", description: "Interface table" },
    CommonOid { name: "ifDescr", oid: "1.3.6.1.2.1.2.2.1.2", description: "Interface description" },
    CommonOid { name: "ifType", oid: "1.3.6.1.2.1.2.2.1.3", description: "Interface type" },
    CommonOid { name: "ifSpeed", oid: "1.3.6.1.2.1.2.2.1.5", description: "Interface speed in bits per second" },
    CommonOid { name: "ifAdminStatus", oid: "1.3.6.1.2.1.2.2.1.7", description: "Desired interface state" },
    CommonOid { name: "ifOperStatus", oid: "1.3.6.1.2.1.2.2.1.8", description: "Current interface state" },
    CommonOid { name: "ifInOctets", oid: "1.3.6.1.2.1.2.2.1.10", description: "Octets received (32-bit)" },
    CommonOid { name: "ifOutOctets", oid: "1.3.6.1.2.1.2.2.1.16", description: "Octets sent (32-bit)" },
    CommonOid { name: "ifXTable", oid: "1.3.6.1.2.1.31.1.1", description: "Extended interface table" },
    CommonOid { name: "ifName", oid: "1.3.6.1.2.1.31.1.1.1.1", description: "Interface name" },
    CommonOid { name: "ifHCInOctets", oid: "1.3.6.1.2.1.31.1.1.1.6", description: "Octets received (64-bit)" },
    CommonOid { name: "ifHCOutOctets", oid: "1.3.6.1.2.1.31.1.1.1.10", description: "Octets sent (64-bit)" },
    CommonOid { name: "ifHighSpeed", oid: "1.3.6.1.2.1.31.1.1.1.15", description: "Interface speed in Mbit/s" },
    CommonOid { name: "ifAlias", oid: "1.3.6.1.2.1.31.1.1.1.18", description: "Interface alias" },
];

/// Outcome of a SET. A varbind rejected by the agent is reported in
/// `failure`, not as an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetResult {
    pub success: bool,
    pub varbinds: Vec<VarBind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<SetFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFailure {
    /// The rejected OID, when the agent's error-index names one.
    pub oid: Option<Oid>,
    /// 1-based position in the request, 0 when the whole PDU was rejected.
    pub index: u32,
    pub status: ErrorStatus,
}

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTest {
    /// A well-formed response arrived.
    pub success: bool,
    pub message: String,
    #[serde(rename = "responseTime")]
    pub response_time_ms: u64,
    /// Something came back from the device, even if it was unparseable.
    pub reachable: bool,
    /// The agent accepted the credentials. False when it answered with a
    /// USM report or did not answer at all.
    pub authenticated: bool,
}

/// The system group. Fields the agent did not return are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sys_descr: Option<String>,
    #[serde(rename = "sysObjectID", skip_serializing_if = "Option::is_none")]
    pub sys_object_id: Option<String>,
    /// Hundredths of a second.
    #[serde(rename = "sysUptime", skip_serializing_if = "Option::is_none")]
    pub sys_uptime: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sys_contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sys_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sys_location: Option<String>,
}

impl SystemInfo {
    pub(crate) fn request_oids() -> [Oid; 6] {
        [
            oids::sys_descr(),
            oids::sys_object_id(),
            oids::sys_uptime(),
            oids::sys_contact(),
            oids::sys_name(),
            oids::sys_location(),
        ]
    }

    pub(crate) fn from_varbinds(varbinds: &[VarBind]) -> Self {
        let mut info = Self::default();
        let text = |value: &Value| value.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned());
        let system = oids::system();
        for vb in varbinds.iter().filter(|vb| !vb.value.is_exception()) {
            match vb.oid.suffix_after(&system) {
                Some([1, 0]) => info.sys_descr = text(&vb.value),
                Some([2, 0]) => info.sys_object_id = vb.value.as_oid().map(Oid::to_string),
                Some([3, 0]) => info.sys_uptime = vb.value.as_u32(),
                Some([4, 0]) => info.sys_contact = text(&vb.value),
                Some([5, 0]) => info.sys_name = text(&vb.value),
                Some([6, 0]) => info.sys_location = text(&vb.value),
                _ => {}
            }
        }
        info
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One row of the interface table, joined with ifXTable by ifIndex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceRecord {
    pub if_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub if_type: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<i32>,
    /// Bits per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phys_address: Option<String>,
    pub admin_status: InterfaceStatus,
    pub oper_status: InterfaceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_octets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_octets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_errors: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_errors: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_discards: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_discards: Option<u64>,
    /// Octet counters came from ifHCInOctets/ifHCOutOctets.
    pub high_capacity: bool,
}

impl InterfaceRecord {
    pub fn new(if_index: u32) -> Self {
        Self {
            if_index,
            descr: None,
            name: None,
            alias: None,
            if_type: None,
            mtu: None,
            speed: None,
            phys_address: None,
            admin_status: InterfaceStatus::Unknown,
            oper_status: InterfaceStatus::Unknown,
            in_octets: None,
            out_octets: None,
            in_errors: None,
            out_errors: None,
            in_discards: None,
            out_discards: None,
            high_capacity: false,
        }
    }
}

#[derive(Default)]
struct RowParts {
    if_speed: Option<u64>,
    high_speed_mbps: Option<u64>,
    hc_in_octets: Option<u64>,
    hc_out_octets: Option<u64>,
}

fn colon_hex(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let parts: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    Some(parts.join(":"))
}

/// Join ifTable and ifXTable walks by ifIndex, preferring 64-bit counters
/// and ifHighSpeed where present.
pub(crate) fn join_interfaces(if_table: &[VarBind], if_x_table: &[VarBind]) -> Vec<InterfaceRecord> {
    let mut rows: BTreeMap<u32, (InterfaceRecord, RowParts)> = BTreeMap::new();
    let text = |value: &Value| value.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned());

    let if_entry = oids::if_entry();
    for vb in if_table.iter().filter(|vb| !vb.value.is_exception()) {
        let Some(&[column, if_index]) = vb.oid.suffix_after(&if_entry) else {
            continue;
        };
        let (row, parts) = rows
            .entry(if_index)
            .or_insert_with(|| (InterfaceRecord::new(if_index), RowParts::default()));
        match column {
            2 => row.descr = text(&vb.value),
            3 => row.if_type = vb.value.as_i32(),
            4 => row.mtu = vb.value.as_i32(),
            5 => parts.if_speed = vb.value.as_u64(),
            6 => row.phys_address = vb.value.as_bytes().and_then(colon_hex),
            7 => row.admin_status = InterfaceStatus::from_code(vb.value.as_i32().map_or(0, i64::from)),
            8 => row.oper_status = InterfaceStatus::from_code(vb.value.as_i32().map_or(0, i64::from)),
            10 => row.in_octets = vb.value.as_u64(),
            13 => row.in_discards = vb.value.as_u64(),
            14 => row.in_errors = vb.value.as_u64(),
            16 => row.out_octets = vb.value.as_u64(),
            19 => row.out_discards = vb.value.as_u64(),
            20 => row.out_errors = vb.value.as_u64(),
            _ => {}
        }
    }

    let if_x_entry = oids::if_x_entry();
    for vb in if_x_table.iter().filter(|vb| !vb.value.is_exception()) {
        let Some(&[column, if_index]) = vb.oid.suffix_after(&if_x_entry) else {
            continue;
        };
        // ifXTable rows without an ifTable row are ignored.
        let Some((row, parts)) = rows.get_mut(&if_index) else {
            continue;
        };
        match column {
            1 => row.name = text(&vb.value),
            6 => parts.hc_in_octets = vb.value.as_u64(),
            10 => parts.hc_out_octets = vb.value.as_u64(),
            15 => parts.high_speed_mbps = vb.value.as_u64(),
            18 => row.alias = text(&vb.value).filter(|alias| !alias.is_empty()),
            _ => {}
        }
    }

    rows.into_values()
        .map(|(mut row, parts)| {
            if parts.hc_in_octets.is_some() || parts.hc_out_octets.is_some() {
                row.high_capacity = true;
                row.in_octets = parts.hc_in_octets.or(row.in_octets);
                row.out_octets = parts.hc_out_octets.or(row.out_octets);
            }
            row.speed = match parts.high_speed_mbps {
                Some(mbps) if mbps > 0 => Some(mbps.saturating_mul(1_000_000)),
                _ => parts.if_speed,
            };
            row
        })
        .collect()
}

/// What the response cache holds.
#[derive(Debug, Clone)]
pub(crate) enum CachedResponse {
    VarBinds(Arc<Vec<VarBind>>),
    SystemInfo(Arc<SystemInfo>),
    Interfaces(Arc<Vec<InterfaceRecord>>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;
    use bytes::Bytes;

    fn if_vb(column: u32, index: u32, value: Value) -> VarBind {
        VarBind::new(oids::if_entry().child(column).child(index), value)
    }

    fn ifx_vb(column: u32, index: u32, value: Value) -> VarBind {
        VarBind::new(oids::if_x_entry().child(column).child(index), value)
    }

    #[test]
    fn system_info_omits_missing_fields() {
        let varbinds = vec![
            VarBind::new(oids::sys_descr(), Value::from("Linux edge 6.1")),
            VarBind::new(oids::sys_object_id(), Value::from(oid!(1, 3, 6, 1, 4, 1, 8072, 3, 2, 10))),
            VarBind::new(oids::sys_uptime(), Value::TimeTicks(123_456)),
            VarBind::new(oids::sys_contact(), Value::NoSuchObject),
            VarBind::new(oids::sys_name(), Value::from("edge")),
            VarBind::new(oids::sys_location(), Value::NoSuchInstance),
        ];
        let info = SystemInfo::from_varbinds(&varbinds);
        assert_eq!(info.sys_name.as_deref(), Some("edge"));
        assert_eq!(info.sys_object_id.as_deref(), Some("1.3.6.1.4.1.8072.3.2.10"));
        assert_eq!(info.sys_uptime, Some(123_456));
        assert!(info.sys_contact.is_none());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["sysObjectID"], "1.3.6.1.4.1.8072.3.2.10");
        assert_eq!(json["sysUptime"], 123_456);
        assert!(json.get("sysContact").is_none());
        assert!(json.get("sysLocation").is_none());
    }

    #[test]
    fn hc_counters_and_high_speed_win() {
        let if_table = vec![
            if_vb(1, 1, Value::Integer(1)),
            if_vb(2, 1, Value::from("eth0")),
            if_vb(5, 1, Value::Gauge32(u32::MAX)),
            if_vb(6, 1, Value::OctetString(Bytes::from_static(&[0x00, 0x1b, 0x21, 0xaa, 0xbb, 0x0c]))),
            if_vb(7, 1, Value::Integer(1)),
            if_vb(8, 1, Value::Integer(7)),
            if_vb(10, 1, Value::Counter32(1000)),
            if_vb(16, 1, Value::Counter32(2000)),
            if_vb(14, 1, Value::Counter32(3)),
            if_vb(2, 2, Value::from("lo")),
            if_vb(8, 2, Value::Integer(99)),
            if_vb(10, 2, Value::Counter32(5)),
        ];
        let if_x_table = vec![
            ifx_vb(1, 1, Value::from("eth0")),
            ifx_vb(6, 1, Value::Counter64(50_000_000_000)),
            ifx_vb(10, 1, Value::Counter64(60_000_000_000)),
            ifx_vb(15, 1, Value::Gauge32(10_000)),
            ifx_vb(18, 1, Value::from("")),
            ifx_vb(1, 9, Value::from("orphan")),
        ];

        let rows = join_interfaces(&if_table, &if_x_table);
        assert_eq!(rows.len(), 2);

        let eth0 = &rows[0];
        assert_eq!(eth0.if_index, 1);
        assert!(eth0.high_capacity);
        assert_eq!(eth0.in_octets, Some(50_000_000_000));
        assert_eq!(eth0.out_octets, Some(60_000_000_000));
        assert_eq!(eth0.in_errors, Some(3));
        assert_eq!(eth0.speed, Some(10_000_000_000));
        assert_eq!(eth0.phys_address.as_deref(), Some("00:1b:21:aa:bb:0c"));
        assert_eq!(eth0.oper_status, InterfaceStatus::LowerLayerDown);
        assert_eq!(eth0.alias, None);

        let lo = &rows[1];
        assert!(!lo.high_capacity);
        assert_eq!(lo.in_octets, Some(5));
        assert_eq!(lo.oper_status, InterfaceStatus::Unknown);
        assert_eq!(lo.admin_status, InterfaceStatus::Unknown);
    }

    #[test]
    fn set_result_serializes_failure() {
        let result = SetResult {
            success: false,
            varbinds: Vec::new(),
            failure: Some(SetFailure {
                oid: Some(oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)),
                index: 1,
                status: ErrorStatus::NotWritable,
            }),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["failure"]["status"], "notWritable");
        assert_eq!(json["failure"]["oid"], "1.3.6.1.2.1.1.5.0");
    }
}
