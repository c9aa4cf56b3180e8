//! MIB fixtures and device helpers.

use std::collections::BTreeMap;
use std::time::Duration;

use snmp_monitor::client::oids;
use snmp_monitor::device::{SnmpCredentials, SnmpDevice};
use snmp_monitor::{Oid, Value, oid};

use super::agent::TestAgent;

/// The system group.
pub fn system_mib() -> BTreeMap<Oid, Value> {
    BTreeMap::from([
        (oids::sys_descr(), Value::from("Test SNMP Agent")),
        (oids::sys_object_id(), Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 99999))),
        (oids::sys_uptime(), Value::TimeTicks(123456)),
        (oids::sys_contact(), Value::from("admin@test.local")),
        (oids::sys_name(), Value::from("test-agent")),
        (oids::sys_location(), Value::from("Test Lab")),
    ])
}

/// `count` interfaces with ifTable and ifXTable columns. Interface `n`
/// counts `n * 1000` octets in and 32-bit counters wrap at 10 000.
pub fn interface_table(count: u32) -> BTreeMap<Oid, Value> {
    let entry = oids::if_entry();
    let x_entry = oids::if_x_entry();
    let mut data = BTreeMap::new();
    data.insert(oid!(1, 3, 6, 1, 2, 1, 2, 1, 0), Value::Integer(count as i32));
    for n in 1..=count {
        data.insert(entry.child(1).child(n), Value::Integer(n as i32));
        data.insert(entry.child(2).child(n), Value::from(format!("eth{n}")));
        data.insert(entry.child(3).child(n), Value::Integer(6));
        data.insert(entry.child(4).child(n), Value::Integer(1500));
        data.insert(entry.child(5).child(n), Value::Gauge32(1_000_000_000));
        data.insert(entry.child(6).child(n), Value::OctetString(vec![0, 0x1b, 0x21, 0, 0, n as u8].into()));
        data.insert(entry.child(7).child(n), Value::Integer(1));
        data.insert(entry.child(8).child(n), Value::Integer(if n % 2 == 0 { 2 } else { 1 }));
        data.insert(entry.child(10).child(n), Value::Counter32(n * 1000 % 10_000));
        data.insert(entry.child(14).child(n), Value::Counter32(n));
        data.insert(x_entry.child(1).child(n), Value::from(format!("e{n}")));
        data.insert(x_entry.child(6).child(n), Value::Counter64(u64::from(n) * 1000));
        data.insert(x_entry.child(15).child(n), Value::Gauge32(10_000));
    }
    data
}

/// Merge several fixtures into one view.
pub fn combined(fixtures: impl IntoIterator<Item = BTreeMap<Oid, Value>>) -> BTreeMap<Oid, Value> {
    fixtures.into_iter().flatten().collect()
}

pub fn nonexistent_oid() -> Oid {
    oid!(1, 3, 6, 1, 4, 1, 99999, 1, 1, 0)
}

/// A v2c device pointing at `agent` with a one second timeout and no retries.
pub fn device(agent: &TestAgent) -> SnmpDevice {
    device_with(agent, SnmpCredentials::v2c("public"))
}

pub fn device_with(agent: &TestAgent, credentials: SnmpCredentials) -> SnmpDevice {
    SnmpDevice::new("127.0.0.1", credentials)
        .with_port(agent.port())
        .with_timeout(Duration::from_secs(1))
        .with_retries(0)
}
