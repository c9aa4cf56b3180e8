//! Input validation.
//!
//! Every check runs before any socket is opened and collects all problems
//! instead of stopping at the first. Messages never echo secret values.

use serde::Serialize;

use crate::device::SnmpDevice;
use crate::error::{Error, Result};
use crate::version::Version;

pub const PORT_RANGE: std::ops::RangeInclusive<u32> = 1..=65535;
pub const TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 1000..=30000;
pub const RETRIES_RANGE: std::ops::RangeInclusive<u32> = 0..=10;
pub const NON_REPEATERS_RANGE: std::ops::RangeInclusive<i64> = 0..=100;
pub const MAX_REPETITIONS_RANGE: std::ops::RangeInclusive<i64> = 1..=100;

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Merge another report into this one.
    pub fn merge(mut self, other: ValidationReport) -> Self {
        self.errors.extend(other.errors);
        self.is_valid = self.errors.is_empty();
        self
    }

    /// `Err(Error::Validation)` carrying every collected message.
    pub fn into_result(self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(Error::validation(self.errors))
        }
    }
}

/// Dotted-decimal OID with at least two arcs: `^\d+(\.\d+)+$`.
///
/// ```
/// use snmp_monitor::validate::validate_oid;
///
/// assert!(validate_oid("1.3.6.1.2.1.1.1.0"));
/// assert!(!validate_oid(".1.3.6"));
/// assert!(!validate_oid("1"));
/// ```
pub fn validate_oid(oid: &str) -> bool {
    let mut arcs = 0;
    for arc in oid.split('.') {
        if arc.is_empty() || !arc.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        arcs += 1;
    }
    arcs >= 2
}

pub fn validate_oid_list<S: AsRef<str>>(oids: &[S]) -> ValidationReport {
    if oids.is_empty() {
        return ValidationReport::from_errors(vec!["at least one OID is required".into()]);
    }
    let errors = oids
        .iter()
        .enumerate()
        .filter(|(_, oid)| !validate_oid(oid.as_ref()))
        .map(|(i, oid)| format!("invalid OID at position {i}: '{}'", oid.as_ref()))
        .collect();
    ValidationReport::from_errors(errors)
}

fn missing(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(str::is_empty)
}

pub fn validate_device(device: &SnmpDevice) -> ValidationReport {
    let mut errors = Vec::new();

    if device.hostname.trim().is_empty() {
        errors.push("hostname is required".to_owned());
    }
    if !PORT_RANGE.contains(&device.port) {
        errors.push(format!("port must be between 1 and 65535, got {}", device.port));
    }
    if !TIMEOUT_RANGE_MS.contains(&device.timeout) {
        errors.push(format!(
            "timeout must be between 1000 and 30000 ms, got {}",
            device.timeout
        ));
    }
    if !RETRIES_RANGE.contains(&device.retries) {
        errors.push(format!("retries must be between 0 and 10, got {}", device.retries));
    }

    let creds = &device.credentials;
    match creds.version {
        Version::V1 | Version::V2c => {
            if missing(&creds.community) {
                errors.push(format!("community string is required for SNMP {}", creds.version));
            }
        }
        Version::V3 => {
            if missing(&creds.username) {
                errors.push("username is required for SNMP v3".to_owned());
            }
            let level = creds.security_level();
            if level.requires_auth() {
                if creds.auth_protocol.is_none() {
                    errors.push(format!("authentication protocol is required for {}", level.as_str()));
                }
                if missing(&creds.auth_password) {
                    errors.push(format!("authentication password is required for {}", level.as_str()));
                }
            }
            if level.requires_priv() {
                if creds.priv_protocol.is_none() {
                    errors.push("privacy protocol is required for authPriv".to_owned());
                }
                if missing(&creds.priv_password) {
                    errors.push("privacy password is required for authPriv".to_owned());
                }
            }
        }
    }

    ValidationReport::from_errors(errors)
}

/// Signed inputs so that negative values from JSON are reported rather
/// than rejected by the deserializer.
pub fn validate_bulk_parameters(non_repeaters: i64, max_repetitions: i64) -> ValidationReport {
    let mut errors = Vec::new();
    if !NON_REPEATERS_RANGE.contains(&non_repeaters) {
        errors.push(format!("nonRepeaters must be between 0 and 100, got {non_repeaters}"));
    }
    if !MAX_REPETITIONS_RANGE.contains(&max_repetitions) {
        errors.push(format!("maxRepetitions must be between 1 and 100, got {max_repetitions}"));
    }
    ValidationReport::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SnmpCredentials;
    use crate::message::SecurityLevel;
    use crate::v3::{AuthProtocol, PrivProtocol};

    #[test]
    fn oid_grammar() {
        for ok in ["1.3", "1.3.6.1.2.1.1.1.0", "0.0", "1.3.6.1.4.1.4294967295"] {
            assert!(validate_oid(ok), "{ok}");
        }
        for bad in ["", "1", "1.", ".1.3", "1..3", "1.3.a", "iso.3.6", "1.3 ", "-1.3"] {
            assert!(!validate_oid(bad), "{bad}");
        }
    }

    #[test]
    fn oid_list_collects_every_error() {
        let report = validate_oid_list(&["1.3.6", "bad", "1.3", ""]);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].contains("position 1"));
        assert!(report.errors[1].contains("position 3"));

        let empty: [&str; 0] = [];
        assert!(!validate_oid_list(&empty).is_valid);
        assert!(validate_oid_list(&["1.3.6.1"]).is_valid);
    }

    #[test]
    fn device_ranges_aggregate() {
        let mut device = SnmpDevice::new("", SnmpCredentials::v2c(""));
        device.port = 0;
        device.timeout = 999;
        device.retries = 11;
        let report = validate_device(&device);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 5, "{:?}", report.errors);
    }

    #[test]
    fn defaults_are_valid() {
        let device = SnmpDevice::new("10.0.0.1", SnmpCredentials::v2c("public"));
        assert_eq!(validate_device(&device), ValidationReport { is_valid: true, errors: vec![] });

        let mut edge = device.clone();
        edge.port = 65535;
        edge.timeout = 30000;
        edge.retries = 0;
        assert!(validate_device(&edge).is_valid);
        edge.port = 65536;
        assert!(!validate_device(&edge).is_valid);
    }

    #[test]
    fn auth_priv_requires_privacy_password() {
        let mut creds = SnmpCredentials::v3("monitor")
            .auth(AuthProtocol::Sha1, "authpass1")
            .privacy(PrivProtocol::Aes128, "privpass1");
        creds.priv_password = None;
        let report = validate_device(&SnmpDevice::new("r1", creds));
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("privacy password")));
    }

    #[test]
    fn auth_no_priv_needs_only_auth() {
        let creds = SnmpCredentials::v3("monitor").auth(AuthProtocol::Md5, "authpass1");
        assert!(validate_device(&SnmpDevice::new("r1", creds)).is_valid);

        let mut creds = SnmpCredentials::v3("monitor").auth(AuthProtocol::Md5, "authpass1");
        creds.auth_password = Some(String::new());
        let report = validate_device(&SnmpDevice::new("r1", creds));
        assert!(report.errors.iter().any(|e| e.contains("authentication password")));
    }

    #[test]
    fn messages_never_contain_secrets() {
        let mut creds = SnmpCredentials::v3("").auth(AuthProtocol::Md5, "hunter22");
        creds.priv_password = Some("topsecret".into());
        creds.auth_level = Some(SecurityLevel::AuthPriv);
        let report = validate_device(&SnmpDevice::new("r1", creds));
        let all = report.errors.join(" ");
        assert!(!all.contains("hunter22"));
        assert!(!all.contains("topsecret"));
    }

    #[test]
    fn bulk_parameter_bounds() {
        assert!(validate_bulk_parameters(0, 20).is_valid);
        assert!(validate_bulk_parameters(100, 100).is_valid);
        assert!(!validate_bulk_parameters(-1, 20).is_valid);
        assert!(!validate_bulk_parameters(0, 101).is_valid);
        assert!(!validate_bulk_parameters(0, 0).is_valid);
        assert_eq!(validate_bulk_parameters(-1, 0).errors.len(), 2);
    }

    #[test]
    fn into_result_maps_to_validation_error() {
        let err = validate_bulk_parameters(-1, 20).into_result().unwrap_err();
        assert!(matches!(*err, Error::Validation { ref errors } if errors.len() == 1));
    }
}
