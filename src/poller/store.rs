//! Device persistence seam.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::DeviceStatus;
use crate::client::{InterfaceRecord, SystemInfo};
use crate::device::SnmpDevice;
use crate::error::Result;

/// Last reconciled state of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: String,
    pub device: SnmpDevice,
    pub status: DeviceStatus,
    /// 100 while the device is up, 0 otherwise.
    pub availability: u8,
    /// Last known good system group.
    #[serde(flatten)]
    pub system: SystemInfo,
    pub last_polled: Option<DateTime<Utc>>,
    /// Whether the most recent connectivity probe got an answer, even when
    /// the status was later forced down.
    pub last_probe_ok: bool,
}

impl DeviceRecord {
    /// A device that has never been polled.
    pub fn new(id: impl Into<String>, device: SnmpDevice) -> Self {
        Self {
            id: id.into(),
            device,
            status: DeviceStatus::Unknown,
            availability: 0,
            system: SystemInfo::default(),
            last_polled: None,
            last_probe_ok: false,
        }
    }

    pub(crate) fn mark_down(&mut self) {
        self.status = DeviceStatus::Down;
        self.availability = 0;
    }

    pub(crate) fn mark_up(&mut self) {
        self.status = DeviceStatus::Up;
        self.availability = 100;
    }
}

/// Where the poller keeps device and interface records.
pub trait DeviceStore: Send + Sync {
    fn load(&self, device_id: &str) -> impl Future<Output = Result<Option<DeviceRecord>>> + Send;

    fn save(&self, record: DeviceRecord) -> impl Future<Output = Result<()>> + Send;

    /// Insert or replace interfaces by `(device_id, if_index)`. Interfaces
    /// not in `records` are left alone.
    fn upsert_interfaces(
        &self,
        device_id: &str,
        records: Vec<InterfaceRecord>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Stored interfaces of a device, ordered by ifIndex.
    fn interfaces(&self, device_id: &str) -> impl Future<Output = Result<Vec<InterfaceRecord>>> + Send;
}

/// Process-local [`DeviceStore`].
#[derive(Default)]
pub struct MemoryStore {
    devices: Mutex<HashMap<String, DeviceRecord>>,
    interfaces: Mutex<HashMap<String, BTreeMap<u32, InterfaceRecord>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored device record, ordered by id.
    pub fn records(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<_> = lock(&self.devices).values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

impl DeviceStore for MemoryStore {
    async fn load(&self, device_id: &str) -> Result<Option<DeviceRecord>> {
        Ok(lock(&self.devices).get(device_id).cloned())
    }

    async fn save(&self, record: DeviceRecord) -> Result<()> {
        lock(&self.devices).insert(record.id.clone(), record);
        Ok(())
    }

    async fn upsert_interfaces(&self, device_id: &str, records: Vec<InterfaceRecord>) -> Result<()> {
        let mut interfaces = lock(&self.interfaces);
        let rows = interfaces.entry(device_id.to_owned()).or_default();
        for record in records {
            rows.insert(record.if_index, record);
        }
        Ok(())
    }

    async fn interfaces(&self, device_id: &str) -> Result<Vec<InterfaceRecord>> {
        Ok(lock(&self.interfaces)
            .get(device_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}
