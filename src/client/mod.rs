//! SNMP client.
//!
//! [`SnmpClient`] runs the high-level operations against an [`SnmpDevice`].
//! Each call validates the device, consults the response cache, and on a
//! miss opens a fresh transport through its [`Connector`], so nothing but
//! the caches outlives a call. v3 engine state is kept in a shared
//! [`EngineCache`] keyed by the device endpoint.
//!
//! ```rust,no_run
//! use snmp_monitor::client::{ClientConfig, SnmpClient};
//! use snmp_monitor::device::{SnmpCredentials, SnmpDevice};
//! use snmp_monitor::oid;
//!
//! # async fn example() -> snmp_monitor::Result<()> {
//! let client = SnmpClient::new(ClientConfig::default());
//! let device = SnmpDevice::new("192.0.2.1", SnmpCredentials::v2c("public"));
//!
//! let varbinds = client.get(&device, &[oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)]).await?;
//! let table = client.walk(&device, &oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 2), None).await?;
//! # Ok(())
//! # }
//! ```

mod ops;
mod retry;
mod session;
mod v3;
mod walk;

pub use ops::{
    COMMON_OIDS, CommonOid, ConnectionTest, InterfaceRecord, SetFailure, SetResult, SystemInfo, oids,
};
pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::instrument;

use crate::cache::{self, CacheStats, ResponseCache, cache_key};
use crate::device::SnmpDevice;
use crate::error::{Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::transport::{Connector, NetConnector, Transport};
use crate::v3::EngineCache;
use crate::validate::{validate_bulk_parameters, validate_device};
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

use ops::{CachedResponse, join_interfaces};
use session::Session;
use walk::WalkMethod;

/// Client tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// GETs with more OIDs are split into batches (default: 10).
    pub max_oids_per_request: usize,
    /// Most varbinds a single walk may collect (default: 10 000).
    pub walk_ceiling: usize,
    /// GETBULK max-repetitions for walks that do not specify one (default: 20).
    pub max_repetitions: i32,
    /// Response cache size cap (default: 1000).
    pub cache_max_entries: usize,
    /// How long discovered v3 engine state is reused (default: 300 s).
    pub engine_ttl: Duration,
    pub system_info_ttl: Duration,
    pub interface_ttl: Duration,
    pub get_ttl: Duration,
    pub walk_ttl: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_oids_per_request: 10,
            walk_ceiling: 10_000,
            max_repetitions: 20,
            cache_max_entries: cache::DEFAULT_MAX_ENTRIES,
            engine_ttl: cache::SYSTEM_INFO_TTL,
            system_info_ttl: cache::SYSTEM_INFO_TTL,
            interface_ttl: cache::INTERFACE_TTL,
            get_ttl: cache::GET_TTL,
            walk_ttl: cache::WALK_TTL,
        }
    }
}

/// Cache-first SNMP client, shareable across tasks.
pub struct SnmpClient<C: Connector = NetConnector> {
    connector: C,
    config: ClientConfig,
    cache: ResponseCache<CachedResponse>,
    engines: Arc<EngineCache>,
}

impl SnmpClient<NetConnector> {
    /// Client that reaches devices over UDP or TCP.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(NetConnector, config)
    }
}

impl<C: Connector> SnmpClient<C> {
    pub fn with_connector(connector: C, config: ClientConfig) -> Self {
        Self {
            connector,
            cache: ResponseCache::new(config.cache_max_entries),
            engines: Arc::new(EngineCache::new(config.engine_ttl)),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Validate `device` and open a session to it.
    async fn open(&self, device: &SnmpDevice) -> Result<Session<C::Transport>> {
        validate_device(device).into_result()?;
        let transport = self.connector.connect(device).await?;
        Session::new(transport, device, self.engines.clone())
    }

    fn cached_varbinds(&self, key: &str) -> Option<Vec<VarBind>> {
        match self.cache.get(key)? {
            CachedResponse::VarBinds(varbinds) => Some(varbinds.as_ref().clone()),
            _ => None,
        }
    }

    /// GET `oids`, returning one varbind per OID in request order.
    ///
    /// OIDs the agent does not have come back as [`Value::NoSuchInstance`]
    /// (v2c/v3 agents may also answer `NoSuchObject`) instead of failing the
    /// call. More than `max_oids_per_request` OIDs are sent in batches.
    #[instrument(skip(self, device, oids), err, fields(snmp.target = %device.endpoint(), snmp.oid_count = oids.len()))]
    pub async fn get(&self, device: &SnmpDevice, oids: &[Oid]) -> Result<Vec<VarBind>> {
        if oids.is_empty() {
            return Err(Error::validation(vec!["at least one OID is required".into()]));
        }
        let params: Vec<String> = oids.iter().map(Oid::to_string).collect();
        let key = cache_key(device, "get", &params.join(","));
        if let Some(varbinds) = self.cached_varbinds(&key) {
            return Ok(varbinds);
        }

        let mut session = self.open(device).await?;
        let batch_size = self.config.max_oids_per_request.max(1);
        if oids.len() > batch_size {
            tracing::debug!(target: "snmp_monitor::client", { snmp.oid_count = oids.len(), snmp.max_per_request = batch_size, snmp.batch_count = oids.len().div_ceil(batch_size) }, "splitting GET request into batches");
        }
        let mut results = Vec::with_capacity(oids.len());
        for chunk in oids.chunks(batch_size) {
            results.extend(get_batch(&mut session, chunk).await?);
        }

        self.cache.set(key, CachedResponse::VarBinds(Arc::new(results.clone())), self.config.get_ttl);
        Ok(results)
    }

    /// Walk the subtree under `root`: GETBULK from v2c on, GETNEXT on v1.
    #[instrument(skip(self, device), err, fields(snmp.target = %device.endpoint(), snmp.oid = %root))]
    pub async fn walk(&self, device: &SnmpDevice, root: &Oid, max_repetitions: Option<i32>) -> Result<Vec<VarBind>> {
        let max_repetitions = max_repetitions.unwrap_or(self.config.max_repetitions);
        validate_bulk_parameters(0, i64::from(max_repetitions)).into_result()?;
        let key = cache_key(device, "walk", &format!("{root}|{max_repetitions}"));
        if let Some(varbinds) = self.cached_varbinds(&key) {
            return Ok(varbinds);
        }

        let mut session = self.open(device).await?;
        let method = WalkMethod::for_version(device.version(), max_repetitions);
        let results = walk::walk(&mut session, root, method, self.config.walk_ceiling).await?;

        self.cache.set(key, CachedResponse::VarBinds(Arc::new(results.clone())), self.config.walk_ttl);
        Ok(results)
    }

    /// Walk with an explicit GETBULK split. Fails with
    /// [`Error::Capability`] on v1 without touching the network.
    #[instrument(skip(self, device), err, fields(snmp.target = %device.endpoint(), snmp.oid = %root))]
    pub async fn bulk_walk(
        &self,
        device: &SnmpDevice,
        root: &Oid,
        non_repeaters: i32,
        max_repetitions: i32,
    ) -> Result<Vec<VarBind>> {
        let version = device.version();
        if !version.supports_bulk() {
            return Err(Error::Capability {
                operation: "bulk-walk",
                version,
            }
            .boxed());
        }
        validate_bulk_parameters(i64::from(non_repeaters), i64::from(max_repetitions)).into_result()?;
        let key = cache_key(device, "bulk-walk", &format!("{root}|{non_repeaters}|{max_repetitions}"));
        if let Some(varbinds) = self.cached_varbinds(&key) {
            return Ok(varbinds);
        }

        let mut session = self.open(device).await?;
        let method = WalkMethod::GetBulk {
            non_repeaters,
            max_repetitions,
        };
        let results = walk::walk(&mut session, root, method, self.config.walk_ceiling).await?;

        self.cache.set(key, CachedResponse::VarBinds(Arc::new(results.clone())), self.config.walk_ttl);
        Ok(results)
    }

    /// SET `varbinds` in one request.
    ///
    /// An agent error is returned as a [`SetResult`] naming the rejected
    /// OID. Any SET drops the device's cached responses.
    #[instrument(skip(self, device, varbinds), err, fields(snmp.target = %device.endpoint(), snmp.varbind_count = varbinds.len()))]
    pub async fn set(&self, device: &SnmpDevice, varbinds: Vec<VarBind>) -> Result<SetResult> {
        if varbinds.is_empty() {
            return Err(Error::validation(vec!["at least one varbind is required".into()]));
        }
        if !device.credentials.is_write_capable() {
            return Err(Error::Capability {
                operation: "set",
                version: device.version(),
            }
            .boxed());
        }

        let mut session = self.open(device).await?;
        let outcome = session.set(varbinds).await;
        let dropped = self.cache.invalidate_prefix(&format!("{}/", device.endpoint()));
        tracing::debug!(target: "snmp_monitor::cache", { snmp.target = %device.endpoint(), dropped }, "invalidated device entries after SET");

        match outcome {
            Ok(pdu) => Ok(SetResult {
                success: true,
                varbinds: pdu.varbinds,
                failure: None,
            }),
            Err(e) => match *e {
                Error::Snmp { status, index, oid, .. } => Ok(SetResult {
                    success: false,
                    varbinds: Vec::new(),
                    failure: Some(SetFailure { oid, index, status }),
                }),
                other => Err(other.boxed()),
            },
        }
    }

    /// GET sysDescr and report whether the device answered.
    ///
    /// Only invalid input is an `Err`. Any well-formed answer counts as
    /// success, including an agent error-status or a USM report rejecting
    /// the credentials; the latter clears `authenticated`.
    #[instrument(skip(self, device), err, fields(snmp.target = %device.endpoint()))]
    pub async fn test_connection(&self, device: &SnmpDevice) -> Result<ConnectionTest> {
        validate_device(device).into_result()?;
        let start = Instant::now();
        let outcome = self.probe(device).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let (success, reachable, authenticated, message) = match outcome {
            Ok(_) => (true, true, true, "SNMP connection successful".to_owned()),
            Err(e) => match &*e {
                Error::Snmp { status, .. } => (true, true, true, format!("device responded with {status}")),
                Error::Auth { reason, .. } => {
                    (true, true, false, format!("device responded but rejected the credentials: {reason}"))
                }
                other => (false, other.proves_reachability(), false, other.to_string()),
            },
        };
        tracing::debug!(target: "snmp_monitor::client", { snmp.target = %device.endpoint(), success, reachable, authenticated, response_time_ms }, "connection test finished");
        Ok(ConnectionTest {
            success,
            message,
            response_time_ms,
            reachable,
            authenticated,
        })
    }

    async fn probe(&self, device: &SnmpDevice) -> Result<crate::pdu::Pdu> {
        let mut session = self.open(device).await?;
        session.get(&[oids::sys_descr()]).await
    }

    /// The system group in one GET.
    #[instrument(skip(self, device), err, fields(snmp.target = %device.endpoint()))]
    pub async fn get_system_info(&self, device: &SnmpDevice) -> Result<SystemInfo> {
        let key = cache_key(device, "system-info", "");
        if let Some(CachedResponse::SystemInfo(info)) = self.cache.get(&key) {
            return Ok(info.as_ref().clone());
        }

        let mut session = self.open(device).await?;
        let varbinds = get_batch(&mut session, &SystemInfo::request_oids()).await?;
        let info = SystemInfo::from_varbinds(&varbinds);

        self.cache.set(key, CachedResponse::SystemInfo(Arc::new(info.clone())), self.config.system_info_ttl);
        Ok(info)
    }

    /// ifTable joined with ifXTable where the agent has it.
    #[instrument(skip(self, device), err, fields(snmp.target = %device.endpoint()))]
    pub async fn get_interface_info(&self, device: &SnmpDevice) -> Result<Vec<InterfaceRecord>> {
        let key = cache_key(device, "interfaces", "");
        if let Some(CachedResponse::Interfaces(rows)) = self.cache.get(&key) {
            return Ok(rows.as_ref().clone());
        }

        let mut session = self.open(device).await?;
        let method = WalkMethod::for_version(device.version(), self.config.max_repetitions);
        let ceiling = self.config.walk_ceiling;
        let if_table = walk::walk(&mut session, &oids::if_entry(), method, ceiling).await?;
        let if_x_table = match walk::walk(&mut session, &oids::if_x_entry(), method, ceiling).await {
            Ok(varbinds) => varbinds,
            Err(e) => {
                tracing::debug!(target: "snmp_monitor::client", { snmp.target = %device.endpoint(), error = %e }, "ifXTable unavailable, using 32-bit counters");
                Vec::new()
            }
        };
        let rows = join_interfaces(&if_table, &if_x_table);

        self.cache.set(key, CachedResponse::Interfaces(Arc::new(rows.clone())), self.config.interface_ttl);
        Ok(rows)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached response and discovered v3 engine.
    pub fn clear_cache(&self) {
        self.cache.clear();
        self.engines.clear();
    }
}

/// GET one batch, splitting on tooBig and substituting `NoSuchInstance`
/// for OIDs a v1 agent rejects with noSuchName.
async fn get_batch<T: Transport>(session: &mut Session<T>, oids: &[Oid]) -> Result<Vec<VarBind>> {
    let mut results: Vec<Option<VarBind>> = vec![None; oids.len()];
    let mut pending: Vec<Vec<usize>> = vec![(0..oids.len()).collect()];

    while let Some(indices) = pending.pop() {
        let request: Vec<Oid> = indices.iter().map(|&i| oids[i].clone()).collect();
        let error = match session.get(&request).await {
            Ok(pdu) if pdu.varbinds.len() == indices.len() => {
                for (&i, vb) in indices.iter().zip(pdu.varbinds) {
                    results[i] = Some(vb);
                }
                continue;
            }
            Ok(pdu) => {
                tracing::debug!(target: "snmp_monitor::client", { snmp.target = %session.target(), expected = indices.len(), actual = pdu.varbinds.len() }, "response varbind count mismatch");
                return Err(Error::malformed(session.target()));
            }
            Err(e) => e,
        };

        match &*error {
            Error::Snmp {
                status: ErrorStatus::TooBig,
                ..
            } if indices.len() > 1 => {
                tracing::debug!(target: "snmp_monitor::client", { snmp.oid_count = indices.len() }, "tooBig, splitting request");
                let (head, tail) = indices.split_at(indices.len() / 2);
                pending.push(tail.to_vec());
                pending.push(head.to_vec());
            }
            Error::Snmp {
                status: ErrorStatus::NoSuchName,
                index,
                ..
            } if session.version() == Version::V1 && (1..=indices.len()).contains(&(*index as usize)) => {
                let missing = indices[*index as usize - 1];
                results[missing] = Some(VarBind::new(oids[missing].clone(), Value::NoSuchInstance));
                let rest: Vec<usize> = indices.into_iter().filter(|&i| i != missing).collect();
                if !rest.is_empty() {
                    pending.push(rest);
                }
            }
            _ => return Err(error),
        }
    }

    Ok(results.into_iter().flatten().collect())
}
