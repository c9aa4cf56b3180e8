//! Response cache.
//!
//! A bounded key/value store with a TTL per entry and least-recently-used
//! eviction once `max_entries` is reached. Keys are built by [`cache_key`]
//! from the device identity, the operation and its parameters; they never
//! contain a password or community string.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::device::SnmpDevice;
use crate::version::Version;

/// System group values change rarely.
pub const SYSTEM_INFO_TTL: Duration = Duration::from_secs(300);
pub const INTERFACE_TTL: Duration = Duration::from_secs(30);
pub const GET_TTL: Duration = Duration::from_secs(30);
pub const WALK_TTL: Duration = Duration::from_secs(60);
/// Connection tests always go to the wire.
pub const CONNECTION_TTL: Duration = Duration::ZERO;

pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Counters reported by [`ResponseCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 before the first lookup.
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    tick: u64,
}

struct State<V> {
    entries: HashMap<String, Entry<V>>,
    /// Recency order: lowest tick is least recently used.
    order: BTreeMap<u64, String>,
    next_tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> State<V> {
    fn touch(&mut self, key: &str) {
        self.next_tick += 1;
        let tick = self.next_tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.tick);
            entry.tick = tick;
            self.order.insert(tick, key.to_owned());
        }
    }

    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        Some(entry)
    }
}

/// Concurrent TTL + LRU cache shared by every device.
pub struct ResponseCache<V> {
    max_entries: usize,
    state: Mutex<State<V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            state: Mutex::new(State {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                tracing::trace!(target: "snmp_monitor::cache", { cache.key = key }, "miss");
                return None;
            }
            Some(entry) => entry.expires_at <= Instant::now(),
        };
        if expired {
            state.remove(key);
            state.expirations += 1;
            state.misses += 1;
            tracing::trace!(target: "snmp_monitor::cache", { cache.key = key }, "expired");
            return None;
        }
        state.hits += 1;
        state.touch(key);
        tracing::trace!(target: "snmp_monitor::cache", { cache.key = key }, "hit");
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store `value` for `ttl`. A zero TTL stores nothing.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let key = key.into();
        let mut state = self.lock();
        state.remove(&key);

        while state.entries.len() >= self.max_entries {
            let Some((_, oldest)) = state.order.pop_first() else {
                break;
            };
            state.entries.remove(&oldest);
            state.evictions += 1;
            tracing::debug!(target: "snmp_monitor::cache", { cache.key = %oldest }, "evicted least recently used entry");
        }

        state.next_tick += 1;
        let tick = state.next_tick;
        state.order.insert(tick, key.clone());
        state.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                tick,
            },
        );
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().remove(key).map(|entry| entry.value)
    }

    /// Drop every entry whose key starts with `prefix`, e.g. one device's
    /// [`device_scope`]. Returns how many were dropped.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.lock();
        let doomed: Vec<String> = state
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        doomed.len()
    }

    /// Empty the cache. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        tracing::debug!(target: "snmp_monitor::cache", "cleared");
    }

    /// Eagerly drop expired entries, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        state.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            size: state.entries.len(),
            max_size: self.max_entries,
            hits: state.hits,
            misses: state.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
            evictions: state.evictions,
            expirations: state.expirations,
        }
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

/// Non-reversible tag for a secret: the first 8 bytes of its SHA-256, in
/// hex.
fn secret_fingerprint(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hex::encode(&hasher.finalize()[..8])
}

/// `host:port/transport/version/identity`, the prefix shared by every key
/// of one device and credential set.
///
/// The v3 identity carries the user, security level, context and
/// protocols in clear and the passwords only as a fingerprint.
pub fn device_scope(device: &SnmpDevice) -> String {
    let creds = &device.credentials;
    let identity = match creds.version {
        Version::V1 | Version::V2c => format!("c:{}", secret_fingerprint(&[creds.community_bytes()])),
        Version::V3 => {
            let auth = creds.auth_protocol.map_or_else(|| "-".to_owned(), |p| p.to_string());
            let privacy = creds.priv_protocol.map_or_else(|| "-".to_owned(), |p| p.to_string());
            let secrets = secret_fingerprint(&[
                creds.auth_password.as_deref().unwrap_or_default().as_bytes(),
                creds.priv_password.as_deref().unwrap_or_default().as_bytes(),
            ]);
            format!(
                "u:{}:{}:{}:{auth}:{privacy}:{secrets}",
                creds.username.as_deref().unwrap_or_default(),
                creds.security_level().as_str(),
                creds.context_name.as_deref().unwrap_or_default(),
            )
        }
    };
    format!("{}/{}/{}", device.endpoint(), creds.version, identity)
}

/// Full key for one operation: `scope|operation|params`.
pub fn cache_key(device: &SnmpDevice, operation: &str, params: &str) -> String {
    format!("{}|{operation}|{params}", device_scope(device))
}
