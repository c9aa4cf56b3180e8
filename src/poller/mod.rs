//! Device poller.
//!
//! One poll cycle per device: probe with a connectivity test, then read the
//! system group and interface table, reconcile them with the stored record
//! and persist the result. Devices are polled concurrently up to a fixed
//! bound; polls of the same device are serialized.

mod status;
mod store;

pub use status::{DeviceStatus, InterfaceStatus};
pub use store::{DeviceRecord, DeviceStore, MemoryStore};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::client::{InterfaceRecord, SnmpClient, SystemInfo};
use crate::device::SnmpDevice;
use crate::error::{Error, Result};
use crate::transport::{Connector, NetConnector};

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    /// The record as persisted.
    pub snapshot: DeviceRecord,
    /// Stored interfaces after the upsert.
    pub interfaces: Vec<InterfaceRecord>,
    pub probe_succeeded: bool,
    /// Discovery steps that failed without failing the poll.
    pub discovery_errors: Vec<String>,
}

/// A device to poll under a stable id.
#[derive(Debug, Clone, PartialEq)]
pub struct PollTarget {
    pub id: String,
    pub device: SnmpDevice,
}

impl PollTarget {
    pub fn new(id: impl Into<String>, device: SnmpDevice) -> Self {
        Self { id: id.into(), device }
    }
}

type Leases = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

pub struct Poller<S, C: Connector = NetConnector> {
    client: Arc<SnmpClient<C>>,
    store: Arc<S>,
    leases: Leases,
}

/// A claim on one device's poll lock. The map entry is removed when the
/// last claim drops.
struct Lease<'a> {
    leases: &'a Leases,
    device_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        // The map's reference plus ours.
        if Arc::strong_count(&self.lock) == 2 {
            leases.remove(&self.device_id);
        }
    }
}

impl<S: DeviceStore, C: Connector> Poller<S, C> {
    pub fn new(client: Arc<SnmpClient<C>>, store: Arc<S>) -> Self {
        Self {
            client,
            store,
            leases: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn lease(&self, device_id: &str) -> Lease<'_> {
        let mut leases = self.leases.lock().unwrap_or_else(PoisonError::into_inner);
        Lease {
            leases: &self.leases,
            device_id: device_id.to_owned(),
            lock: leases.entry(device_id.to_owned()).or_default().clone(),
        }
    }

    #[cfg(test)]
    fn lease_count(&self) -> usize {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Run one poll cycle for `device`.
    ///
    /// A failed probe marks the device down and keeps every previously
    /// stored field. Discovery failures are collected in the outcome; the
    /// device stays up while at least one discovery step succeeds and goes
    /// down when all of them fail. A failure while persisting marks the
    /// device down before the error is returned.
    #[instrument(skip(self, device), err, fields(snmp.target = %device.endpoint()))]
    pub async fn poll_device(&self, device_id: &str, device: &SnmpDevice) -> Result<PollOutcome> {
        let lease = self.lease(device_id);
        let _guard = lease.lock.lock().await;

        let mut record = match self.store.load(device_id).await? {
            Some(mut record) => {
                record.device = device.clone();
                record
            }
            None => DeviceRecord::new(device_id, device.clone()),
        };

        let probe = self.client.test_connection(device).await?;
        record.last_polled = Some(Utc::now());
        record.last_probe_ok = probe.success;

        if !probe.success {
            tracing::info!(target: "snmp_monitor::poller", { device.id = device_id, reachable = probe.reachable, reason = %probe.message }, "probe failed, marking device down");
            record.mark_down();
            self.store.save(record.clone()).await?;
            let interfaces = self.store.interfaces(device_id).await?;
            return Ok(PollOutcome {
                snapshot: record,
                interfaces,
                probe_succeeded: false,
                discovery_errors: Vec::new(),
            });
        }

        let mut discovery_errors = Vec::new();
        let system = match self.client.get_system_info(device).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(target: "snmp_monitor::poller", { device.id = device_id, error = %e }, "system info discovery failed");
                discovery_errors.push(format!("system info: {e}"));
                None
            }
        };
        let interfaces = match self.client.get_interface_info(device).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                tracing::warn!(target: "snmp_monitor::poller", { device.id = device_id, error = %e }, "interface discovery failed");
                discovery_errors.push(format!("interfaces: {e}"));
                None
            }
        };

        let answered_any = system.is_some() || interfaces.is_some();
        if let Some(fresh) = system {
            record.system = fill_from_prior(fresh, &record.system);
        }
        if answered_any {
            record.mark_up();
        } else {
            tracing::warn!(target: "snmp_monitor::poller", { device.id = device_id, authenticated = probe.authenticated }, "device answered the probe but every discovery step failed, marking device down");
            record.mark_down();
        }

        match self.persist(&record, interfaces).await {
            Ok(interfaces) => {
                tracing::debug!(target: "snmp_monitor::poller", { device.id = device_id, status = %record.status, interfaces = interfaces.len(), partial = !discovery_errors.is_empty() }, "poll complete");
                Ok(PollOutcome {
                    snapshot: record,
                    interfaces,
                    probe_succeeded: true,
                    discovery_errors,
                })
            }
            Err(e) => {
                tracing::warn!(target: "snmp_monitor::poller", { device.id = device_id, probe_ok = true, error = %e }, "reconcile failed after successful probe, forcing device down");
                record.mark_down();
                if let Err(save_error) = self.store.save(record).await {
                    tracing::error!(target: "snmp_monitor::poller", { device.id = device_id, error = %save_error }, "could not persist forced down status");
                }
                Err(e)
            }
        }
    }

    async fn persist(&self, record: &DeviceRecord, interfaces: Option<Vec<InterfaceRecord>>) -> Result<Vec<InterfaceRecord>> {
        if let Some(rows) = interfaces {
            self.store.upsert_interfaces(&record.id, rows).await?;
        }
        self.store.save(record.clone()).await?;
        self.store.interfaces(&record.id).await
    }
}

impl<S, C> Poller<S, C>
where
    S: DeviceStore + 'static,
    C: Connector + 'static,
{
    /// Poll every target with at most `concurrency` polls in flight.
    /// Results come back in input order.
    pub async fn poll_fleet(self: &Arc<Self>, targets: &[PollTarget], concurrency: usize) -> Vec<Result<PollOutcome>> {
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (position, target) in targets.iter().cloned().enumerate() {
            let poller = Arc::clone(self);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => poller.poll_device(&target.id, &target.device).await,
                    Err(_) => Err(Error::Store("poll semaphore closed".into()).boxed()),
                };
                (position, outcome)
            });
        }

        let mut results: Vec<Option<Result<PollOutcome>>> = (0..targets.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, outcome)) => results[position] = Some(outcome),
                Err(e) => tracing::error!(target: "snmp_monitor::poller", { error = %e }, "poll task failed"),
            }
        }

        results
            .into_iter()
            .zip(targets)
            .map(|(outcome, target)| {
                outcome.unwrap_or_else(|| Err(Error::Store(format!("poll of {} did not complete", target.id).into()).boxed()))
            })
            .collect()
    }
}

/// Fresh system fields, with fields the agent did not return taken from
/// `prior`.
fn fill_from_prior(fresh: SystemInfo, prior: &SystemInfo) -> SystemInfo {
    SystemInfo {
        sys_descr: fresh.sys_descr.or_else(|| prior.sys_descr.clone()),
        sys_object_id: fresh.sys_object_id.or_else(|| prior.sys_object_id.clone()),
        sys_uptime: fresh.sys_uptime.or(prior.sys_uptime),
        sys_contact: fresh.sys_contact.or_else(|| prior.sys_contact.clone()),
        sys_name: fresh.sys_name.or_else(|| prior.sys_name.clone()),
        sys_location: fresh.sys_location.or_else(|| prior.sys_location.clone()),
    }
}

/// Polls a fixed fleet on an interval until cancelled.
pub struct Scheduler<S, C: Connector = NetConnector> {
    poller: Arc<Poller<S, C>>,
    targets: Vec<PollTarget>,
    interval: Duration,
    concurrency: usize,
}

impl<S, C> Scheduler<S, C>
where
    S: DeviceStore + 'static,
    C: Connector + 'static,
{
    pub fn new(poller: Arc<Poller<S, C>>, targets: Vec<PollTarget>, interval: Duration, concurrency: usize) -> Self {
        Self {
            poller,
            targets,
            interval,
            concurrency,
        }
    }

    /// Poll immediately, then once per interval. Returns the number of
    /// completed cycles once `cancel` fires; a cycle in flight is dropped.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let results = tokio::select! {
                _ = cancel.cancelled() => break,
                results = self.poller.poll_fleet(&self.targets, self.concurrency) => results,
            };
            cycles += 1;

            let failed = results.iter().filter(|r| r.is_err()).count();
            let down = results
                .iter()
                .filter_map(|r| r.as_ref().ok())
                .filter(|o| o.snapshot.status == DeviceStatus::Down)
                .count();
            tracing::info!(target: "snmp_monitor::poller", { cycle = cycles, devices = self.targets.len(), down, failed }, "poll cycle complete");
        }

        tracing::info!(target: "snmp_monitor::poller", { cycles }, "scheduler stopped");
        cycles
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::net::SocketAddr;

    use super::*;
    use crate::client::{ClientConfig, oids};
    use crate::device::SnmpCredentials;
    use crate::error::ErrorStatus;
    use crate::message::CommunityMessage;
    use crate::oid::Oid;
    use crate::pdu::PduType;
    use crate::transport::{MockResponse, MockTransport, mib_reply};
    use crate::value::Value;
    use crate::varbind::VarBind;

    fn target() -> SocketAddr {
        "192.0.2.40:161".parse().unwrap()
    }

    fn device() -> SnmpDevice {
        SnmpDevice::new("192.0.2.40", SnmpCredentials::v2c("public"))
            .with_timeout(Duration::from_secs(1))
            .with_retries(1)
    }

    fn mib(in_octets: u64) -> BTreeMap<Oid, Value> {
        let mut mib = BTreeMap::from([
            (oids::sys_descr(), Value::from("Acme Router")),
            (oids::sys_name(), Value::from("edge-1")),
        ]);
        for index in [1u32, 2] {
            mib.insert(oids::if_entry().child(1).child(index), Value::Integer(index as i32));
            mib.insert(oids::if_entry().child(8).child(index), Value::Integer(1));
            mib.insert(oids::if_x_entry().child(6).child(index), Value::Counter64(in_octets * u64::from(index)));
        }
        mib
    }

    fn poller(mock: &MockTransport) -> Arc<Poller<MemoryStore, MockTransport>> {
        let client = Arc::new(SnmpClient::with_connector(mock.clone(), ClientConfig::default()));
        Arc::new(Poller::new(client, Arc::new(MemoryStore::new())))
    }

    fn prior_record() -> DeviceRecord {
        let mut record = DeviceRecord::new("edge-1", device());
        record.mark_up();
        record.system.sys_name = Some("edge-1-old".into());
        record.system.sys_location = Some("rack 4".into());
        record
    }

    #[tokio::test]
    async fn successful_poll_marks_up_and_stores_interfaces() {
        let mock = MockTransport::new(target());
        mock.serve_mib(mib(1000));
        let poller = poller(&mock);

        let outcome = poller.poll_device("edge-1", &device()).await.unwrap();
        assert!(outcome.probe_succeeded);
        assert!(outcome.discovery_errors.is_empty());
        assert_eq!(outcome.snapshot.status, DeviceStatus::Up);
        assert_eq!(outcome.snapshot.availability, 100);
        assert_eq!(outcome.snapshot.system.sys_name.as_deref(), Some("edge-1"));
        assert!(outcome.snapshot.last_polled.is_some());
        assert_eq!(outcome.interfaces.len(), 2);
        assert_eq!(outcome.interfaces[1].in_octets, Some(2000));
        assert_eq!(poller.store().load("edge-1").await.unwrap(), Some(outcome.snapshot));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_keeps_prior_fields() {
        let mock = MockTransport::new(target());
        let poller = poller(&mock);
        poller.store().save(prior_record()).await.unwrap();
        poller.store().upsert_interfaces("edge-1", vec![InterfaceRecord::new(7)]).await.unwrap();

        let outcome = poller.poll_device("edge-1", &device()).await.unwrap();
        assert!(!outcome.probe_succeeded);
        assert_eq!(outcome.snapshot.status, DeviceStatus::Down);
        assert_eq!(outcome.snapshot.availability, 0);
        assert_eq!(outcome.snapshot.system, prior_record().system);
        assert_eq!(outcome.interfaces, vec![InterfaceRecord::new(7)]);
        assert_eq!(mock.exchanges(), 2);
    }

    #[tokio::test]
    async fn interface_failure_is_partial() {
        let mock = MockTransport::new(target());
        let view = std::sync::Mutex::new(mib(1000));
        mock.set_responder(move |data| {
            let Ok(request) = CommunityMessage::decode(bytes::Bytes::copy_from_slice(data)) else {
                return MockResponse::Timeout;
            };
            if request.pdu.pdu_type == PduType::GetBulkRequest {
                return MockResponse::Error { status: ErrorStatus::GenErr, index: 1 };
            }
            let mut view = view.lock().unwrap();
            MockResponse::Raw(mib_reply(&mut view, &request).encode())
        });
        let poller = poller(&mock);
        poller.store().save(prior_record()).await.unwrap();
        poller.store().upsert_interfaces("edge-1", vec![InterfaceRecord::new(7)]).await.unwrap();

        let outcome = poller.poll_device("edge-1", &device()).await.unwrap();
        assert_eq!(outcome.snapshot.status, DeviceStatus::Up);
        assert_eq!(outcome.discovery_errors.len(), 1);
        assert!(outcome.discovery_errors[0].starts_with("interfaces"));
        assert_eq!(outcome.snapshot.system.sys_name.as_deref(), Some("edge-1"));
        assert_eq!(outcome.snapshot.system.sys_location.as_deref(), Some("rack 4"));
        assert_eq!(outcome.interfaces, vec![InterfaceRecord::new(7)]);
    }

    #[tokio::test]
    async fn answering_without_any_discovery_goes_down() {
        let mock = MockTransport::new(target());
        mock.set_pdu_responder(|pdu| {
            let probe = pdu.pdu_type == PduType::GetRequest
                && pdu.varbinds.len() == 1
                && pdu.varbinds[0].oid == oids::sys_descr();
            if probe {
                MockResponse::Varbinds(vec![VarBind::new(oids::sys_descr(), Value::from("Acme Router"))])
            } else {
                MockResponse::Error { status: ErrorStatus::GenErr, index: 1 }
            }
        });
        let poller = poller(&mock);
        poller.store().save(prior_record()).await.unwrap();

        let outcome = poller.poll_device("edge-1", &device()).await.unwrap();
        assert!(outcome.probe_succeeded);
        assert_eq!(outcome.discovery_errors.len(), 2);
        assert_eq!(outcome.snapshot.status, DeviceStatus::Down);
        assert_eq!(outcome.snapshot.availability, 0);
        assert!(outcome.snapshot.last_probe_ok);
        assert_eq!(outcome.snapshot.system, prior_record().system);

        let stored = poller.store().load("edge-1").await.unwrap().unwrap();
        assert_eq!(stored.status, DeviceStatus::Down);
        assert!(stored.last_probe_ok);
    }

    #[tokio::test]
    async fn leases_are_released_after_each_poll() {
        let mock = MockTransport::new(target());
        mock.serve_mib(mib(1000));
        let poller = poller(&mock);
        let targets: Vec<_> = ["a", "b", "c"].into_iter().map(|id| PollTarget::new(id, device())).collect();

        poller.poll_device("edge-1", &device()).await.unwrap();
        assert_eq!(poller.lease_count(), 0);

        for result in poller.poll_fleet(&targets, 3).await {
            result.unwrap();
        }
        assert_eq!(poller.lease_count(), 0);

        let held = poller.lease("edge-1");
        assert_eq!(poller.lease_count(), 1);
        drop(held);
        assert_eq!(poller.lease_count(), 0);
    }

    #[tokio::test]
    async fn repeated_polls_upsert_by_index() {
        let mock = MockTransport::new(target());
        mock.serve_mib(mib(1000));
        let client = Arc::new(SnmpClient::with_connector(mock.clone(), ClientConfig::default()));
        let poller = Arc::new(Poller::new(Arc::clone(&client), Arc::new(MemoryStore::new())));

        poller.poll_device("edge-1", &device()).await.unwrap();
        mock.serve_mib(mib(5000));
        client.clear_cache();
        let outcome = poller.poll_device("edge-1", &device()).await.unwrap();

        assert_eq!(outcome.interfaces.len(), 2);
        assert_eq!(outcome.interfaces[0].in_octets, Some(5000));
        assert_eq!(outcome.interfaces[1].in_octets, Some(10000));
    }

    struct BrokenInterfaces(MemoryStore);

    impl DeviceStore for BrokenInterfaces {
        async fn load(&self, device_id: &str) -> Result<Option<DeviceRecord>> {
            self.0.load(device_id).await
        }

        async fn save(&self, record: DeviceRecord) -> Result<()> {
            self.0.save(record).await
        }

        async fn upsert_interfaces(&self, _device_id: &str, _records: Vec<InterfaceRecord>) -> Result<()> {
            Err(Error::Store("interface table locked".into()).boxed())
        }

        async fn interfaces(&self, device_id: &str) -> Result<Vec<InterfaceRecord>> {
            self.0.interfaces(device_id).await
        }
    }

    #[tokio::test]
    async fn reconcile_failure_forces_down() {
        let mock = MockTransport::new(target());
        mock.serve_mib(mib(1000));
        let client = Arc::new(SnmpClient::with_connector(mock.clone(), ClientConfig::default()));
        let store = Arc::new(BrokenInterfaces(MemoryStore::new()));
        let poller = Poller::new(client, Arc::clone(&store));

        let err = poller.poll_device("edge-1", &device()).await.unwrap_err();
        assert!(matches!(*err, Error::Store(_)));
        let stored = store.load("edge-1").await.unwrap().unwrap();
        assert_eq!(stored.status, DeviceStatus::Down);
        assert_eq!(stored.availability, 0);
        assert!(stored.last_probe_ok);
    }

    #[tokio::test]
    async fn fleet_results_follow_input_order() {
        let mock = MockTransport::new(target());
        mock.serve_mib(mib(1000));
        let poller = poller(&mock);
        let targets: Vec<_> = ["a", "b", "c", "d"].into_iter().map(|id| PollTarget::new(id, device())).collect();

        let results = poller.poll_fleet(&targets, 2).await;
        let ids: Vec<_> = results.iter().map(|r| r.as_ref().unwrap().snapshot.id.clone()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        assert_eq!(poller.store().records().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_stops_on_cancel() {
        let mock = MockTransport::new(target());
        mock.serve_mib(mib(1000));
        let poller = poller(&mock);
        let scheduler = Scheduler::new(Arc::clone(&poller), vec![PollTarget::new("edge-1", device())], Duration::from_secs(60), 4);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), 3);
        assert_eq!(poller.store().load("edge-1").await.unwrap().unwrap().status, DeviceStatus::Up);
    }

    #[test]
    fn prior_fields_fill_gaps_only() {
        let prior = prior_record().system;
        let fresh = SystemInfo {
            sys_name: Some("edge-1".into()),
            ..SystemInfo::default()
        };
        let merged = fill_from_prior(fresh, &prior);
        assert_eq!(merged.sys_name.as_deref(), Some("edge-1"));
        assert_eq!(merged.sys_location.as_deref(), Some("rack 4"));
    }
}
