//! Device and credential model.
//!
//! These are the JSON shapes the HTTP boundary accepts (camelCase, with
//! defaults for everything but `hostname` and `credentials`). Secrets are
//! never serialized back out and never appear in `Debug` output.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::SecurityLevel;
use crate::v3::{AuthProtocol, PrivProtocol};
use crate::version::Version;

/// USM security level requested for a v3 device.
pub type AuthLevel = SecurityLevel;

pub const DEFAULT_PORT: u32 = 161;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_RETRIES: u32 = 3;

/// How to reach the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Udp4,
    Udp6,
    Tcp,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp4 => "udp4",
            Self::Udp6 => "udp6",
            Self::Tcp => "tcp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version plus the version-specific secrets.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpCredentials {
    pub version: Version,
    #[serde(default, skip_serializing)]
    pub community: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_level: Option<AuthLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_protocol: Option<AuthProtocol>,
    #[serde(default, skip_serializing)]
    pub auth_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priv_protocol: Option<PrivProtocol>,
    #[serde(default, skip_serializing)]
    pub priv_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,
}

impl SnmpCredentials {
    pub fn v1(community: impl Into<String>) -> Self {
        Self {
            version: Version::V1,
            community: Some(community.into()),
            ..Self::default()
        }
    }

    pub fn v2c(community: impl Into<String>) -> Self {
        Self {
            version: Version::V2c,
            community: Some(community.into()),
            ..Self::default()
        }
    }

    /// v3 user at noAuthNoPriv; chain [`auth`](Self::auth) and
    /// [`privacy`](Self::privacy) to raise the level.
    pub fn v3(username: impl Into<String>) -> Self {
        Self {
            version: Version::V3,
            username: Some(username.into()),
            auth_level: Some(SecurityLevel::NoAuthNoPriv),
            ..Self::default()
        }
    }

    pub fn auth(mut self, protocol: AuthProtocol, password: impl Into<String>) -> Self {
        self.auth_protocol = Some(protocol);
        self.auth_password = Some(password.into());
        self.auth_level = Some(self.auth_level.unwrap_or(SecurityLevel::NoAuthNoPriv).max(SecurityLevel::AuthNoPriv));
        self
    }

    pub fn privacy(mut self, protocol: PrivProtocol, password: impl Into<String>) -> Self {
        self.priv_protocol = Some(protocol);
        self.priv_password = Some(password.into());
        self.auth_level = Some(SecurityLevel::AuthPriv);
        self
    }

    pub fn context(mut self, name: impl Into<String>) -> Self {
        self.context_name = Some(name.into());
        self
    }

    /// Declared level, or the strongest level the supplied secrets allow.
    pub fn security_level(&self) -> SecurityLevel {
        self.auth_level.unwrap_or(match (&self.auth_password, &self.priv_password) {
            (Some(_), Some(_)) => SecurityLevel::AuthPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            _ => SecurityLevel::NoAuthNoPriv,
        })
    }

    pub fn community_bytes(&self) -> &[u8] {
        self.community.as_deref().unwrap_or_default().as_bytes()
    }

    /// Whether these credentials could plausibly write (SET).
    ///
    /// v1/v2c write access is decided by the agent from the community, so
    /// any community counts; v3 requires an authenticated user.
    pub fn is_write_capable(&self) -> bool {
        match self.version {
            Version::V1 | Version::V2c => self.community.as_deref().is_some_and(|c| !c.is_empty()),
            Version::V3 => self.security_level().requires_auth(),
        }
    }
}

impl fmt::Debug for SnmpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &Option<String>| s.as_ref().map(|_| "<redacted>");
        f.debug_struct("SnmpCredentials")
            .field("version", &self.version)
            .field("community", &redact(&self.community))
            .field("username", &self.username)
            .field("auth_level", &self.auth_level)
            .field("auth_protocol", &self.auth_protocol)
            .field("auth_password", &redact(&self.auth_password))
            .field("priv_protocol", &self.priv_protocol)
            .field("priv_password", &redact(&self.priv_password))
            .field("context_name", &self.context_name)
            .finish()
    }
}

fn default_port() -> u32 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

/// Connection parameters for one agent.
///
/// Numeric fields are wide enough to carry out-of-range input so the
/// validator, not the deserializer, reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnmpDevice {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u32,
    /// Per-exchange timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default)]
    pub transport: TransportKind,
    pub credentials: SnmpCredentials,
}

impl SnmpDevice {
    pub fn new(hostname: impl Into<String>, credentials: SnmpCredentials) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            transport: TransportKind::default(),
            credentials,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn version(&self) -> Version {
        self.credentials.version
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Port as a `u16`; out-of-range values are rejected by validation
    /// before this is consulted.
    pub fn port_u16(&self) -> u16 {
        u16::try_from(self.port).unwrap_or(0)
    }

    /// `host:port/transport`. Contains no secret; used to key engine state.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.hostname, self.port, self.transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_defaults_apply() {
        let device: SnmpDevice = serde_json::from_value(json!({
            "hostname": "10.0.0.1",
            "credentials": {"version": "v2c", "community": "public"}
        }))
        .unwrap();
        assert_eq!(device.port, 161);
        assert_eq!(device.timeout(), Duration::from_secs(5));
        assert_eq!(device.retries, 3);
        assert_eq!(device.transport, TransportKind::Udp4);
        assert_eq!(device.credentials.community.as_deref(), Some("public"));
    }

    #[test]
    fn v3_json_shape() {
        let device: SnmpDevice = serde_json::from_value(json!({
            "hostname": "core1",
            "port": 1161,
            "transport": "udp6",
            "credentials": {
                "version": "v3",
                "username": "monitor",
                "authLevel": "authPriv",
                "authProtocol": "SHA-256",
                "authPassword": "authpass1",
                "privProtocol": "AES",
                "privPassword": "privpass1",
                "contextName": "vrf-mgmt"
            }
        }))
        .unwrap();
        assert_eq!(device.transport, TransportKind::Udp6);
        assert_eq!(device.credentials.security_level(), SecurityLevel::AuthPriv);
        assert_eq!(device.credentials.auth_protocol, Some(AuthProtocol::Sha256));
        assert_eq!(device.credentials.priv_protocol, Some(PrivProtocol::Aes128));
    }

    #[test]
    fn secrets_are_not_serialized_or_printed() {
        let creds = SnmpCredentials::v3("monitor")
            .auth(AuthProtocol::Sha1, "authsecret")
            .privacy(PrivProtocol::Aes128, "privsecret");
        let json = serde_json::to_string(&creds).unwrap();
        assert!(!json.contains("authsecret"));
        assert!(!json.contains("privsecret"));
        let debug = format!("{:?}", SnmpDevice::new("h", creds));
        assert!(!debug.contains("authsecret"));
        assert!(!debug.contains("privsecret"));

        let debug = format!("{:?}", SnmpCredentials::v2c("s3cret"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn security_level_is_inferred_when_absent() {
        let mut creds = SnmpCredentials {
            version: Version::V3,
            username: Some("u".into()),
            auth_password: Some("authpass1".into()),
            ..SnmpCredentials::default()
        };
        assert_eq!(creds.security_level(), SecurityLevel::AuthNoPriv);
        creds.auth_level = Some(SecurityLevel::NoAuthNoPriv);
        assert_eq!(creds.security_level(), SecurityLevel::NoAuthNoPriv);
    }

    #[test]
    fn builder_levels() {
        let creds = SnmpCredentials::v3("u").auth(AuthProtocol::Md5, "authpass1");
        assert_eq!(creds.auth_level, Some(SecurityLevel::AuthNoPriv));
        assert!(creds.is_write_capable());
        assert!(!SnmpCredentials::v3("u").is_write_capable());
        assert!(SnmpCredentials::v1("private").is_write_capable());
    }

    #[test]
    fn endpoint_has_no_secret() {
        let device = SnmpDevice::new("sw1", SnmpCredentials::v2c("private"))
            .with_port(1161)
            .with_transport(TransportKind::Tcp);
        assert_eq!(device.endpoint(), "sw1:1161/tcp");
    }
}
