//! Daemon configuration.
//!
//! Loaded from TOML. Every section is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//!
//! [cache]
//! max_entries = 5000
//! get_ttl_secs = 15
//!
//! [poller]
//! enabled = true
//! interval_secs = 60
//! concurrency = 32
//!
//! [[poller.devices]]
//! id = "core-1"
//! hostname = "10.0.0.1"
//! credentials = { version = "v2c", community = "public" }
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::client::ClientConfig;
use crate::device::SnmpDevice;
use crate::error::{Error, Result};
use crate::poller::PollTarget;
use crate::validate::validate_device;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: SocketAddr,
    pub cache: CacheSettings,
    pub client: ClientSettings,
    pub poller: PollerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            cache: CacheSettings::default(),
            client: ClientSettings::default(),
            poller: PollerSettings::default(),
        }
    }
}

/// Response cache size and per-class TTLs, in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub system_info_ttl_secs: u64,
    pub interface_ttl_secs: u64,
    pub get_ttl_secs: u64,
    pub walk_ttl_secs: u64,
    pub engine_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = ClientConfig::default();
        Self {
            max_entries: defaults.cache_max_entries,
            system_info_ttl_secs: defaults.system_info_ttl.as_secs(),
            interface_ttl_secs: defaults.interface_ttl.as_secs(),
            get_ttl_secs: defaults.get_ttl.as_secs(),
            walk_ttl_secs: defaults.walk_ttl.as_secs(),
            engine_ttl_secs: defaults.engine_ttl.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    pub max_oids_per_request: usize,
    pub walk_ceiling: usize,
    pub max_repetitions: i32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        let defaults = ClientConfig::default();
        Self {
            max_oids_per_request: defaults.max_oids_per_request,
            walk_ceiling: defaults.walk_ceiling,
            max_repetitions: defaults.max_repetitions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollerSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub concurrency: usize,
    pub devices: Vec<PolledDevice>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
            concurrency: 16,
            devices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PolledDevice {
    pub id: String,
    #[serde(flatten)]
    pub device: SnmpDevice,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string().into()).boxed())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display()).into()).boxed())?;
        Self::from_toml(&text)
    }

    /// Check tunables and every polled device, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.client.max_oids_per_request == 0 {
            errors.push("client.max_oids_per_request must be at least 1".to_owned());
        }
        if self.client.walk_ceiling == 0 {
            errors.push("client.walk_ceiling must be at least 1".to_owned());
        }
        if !(1..=100).contains(&self.client.max_repetitions) {
            errors.push(format!(
                "client.max_repetitions must be between 1 and 100, got {}",
                self.client.max_repetitions
            ));
        }
        if self.cache.max_entries == 0 {
            errors.push("cache.max_entries must be at least 1".to_owned());
        }
        if self.poller.interval_secs == 0 {
            errors.push("poller.interval_secs must be at least 1".to_owned());
        }
        if self.poller.concurrency == 0 {
            errors.push("poller.concurrency must be at least 1".to_owned());
        }
        let mut seen = std::collections::HashSet::new();
        for polled in &self.poller.devices {
            if !seen.insert(polled.id.as_str()) {
                errors.push(format!("poller device id '{}' is duplicated", polled.id));
            }
            let report = validate_device(&polled.device);
            errors.extend(report.errors.into_iter().map(|e| format!("device '{}': {e}", polled.id)));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors.join("; ").into()).boxed())
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            max_oids_per_request: self.client.max_oids_per_request,
            walk_ceiling: self.client.walk_ceiling,
            max_repetitions: self.client.max_repetitions,
            cache_max_entries: self.cache.max_entries,
            engine_ttl: Duration::from_secs(self.cache.engine_ttl_secs),
            system_info_ttl: Duration::from_secs(self.cache.system_info_ttl_secs),
            interface_ttl: Duration::from_secs(self.cache.interface_ttl_secs),
            get_ttl: Duration::from_secs(self.cache.get_ttl_secs),
            walk_ttl: Duration::from_secs(self.cache.walk_ttl_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poller.interval_secs)
    }

    pub fn poll_targets(&self) -> Vec<PollTarget> {
        self.poller
            .devices
            .iter()
            .map(|polled| PollTarget::new(polled.id.clone(), polled.device.clone()))
            .collect()
    }
}
