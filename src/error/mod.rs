//! Error types for the SNMP monitoring core.
//!
//! - [`Error`] is the single failure type for every operation, boxed through
//!   [`Result`] so that `Result<T>` stays pointer-sized.
//! - [`ErrorStatus`] carries the RFC 3416 error-status codes an agent returns.
//! - [`WalkAbortReason`] and [`AuthFailure`] refine the walk and security cases.
//!
//! Partial failures (a SET rejected on one varbind, discovery where only
//! some sections succeeded) are not errors. They are returned as data so
//! callers can see exactly which OIDs or sections failed.
//!
//! ```
//! use snmp_monitor::{Error, Result};
//!
//! fn describe(result: Result<()>) -> String {
//!     match result {
//!         Ok(()) => "ok".into(),
//!         Err(e) => match &*e {
//!             Error::Timeout { retries, .. } => format!("no answer after {retries} retries"),
//!             Error::Auth { .. } => "reachable but credentials rejected".into(),
//!             other => other.to_string(),
//!         },
//!     }
//! }
//! ```

pub(crate) mod internal;

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::oid::Oid;
use crate::version::Version;

/// Address used when an error is raised before the peer is known,
/// e.g. while decoding a buffer detached from any socket.
pub(crate) const UNKNOWN_TARGET: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 0);

/// Result alias using the boxed [`Error`].
pub type Result<T> = std::result::Result<T, Box<Error>>;

/// Why a walk stopped before reaching the end of its subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAbortReason {
    /// The agent returned an OID that does not sort after the previous one.
    NonIncreasing,
    /// The walk collected more varbinds than the configured ceiling allows.
    IterationCeiling { limit: usize },
}

impl fmt::Display for WalkAbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonIncreasing => write!(f, "agent returned a non-increasing OID"),
            Self::IterationCeiling { limit } => {
                write!(f, "iteration ceiling of {limit} exceeded")
            }
        }
    }
}

/// Why a reachable agent refused our credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// usmStatsWrongDigests: the auth password or protocol does not match.
    WrongDigest,
    /// usmStatsUnknownUserNames
    UnknownUserName,
    /// usmStatsUnsupportedSecLevels
    UnsupportedSecurityLevel,
    /// usmStatsDecryptionErrors: the privacy password or protocol does not match.
    DecryptionError,
    /// usmStatsUnknownEngineIDs persisted after rediscovery.
    UnknownEngineId,
    /// The response HMAC did not verify with our localized key.
    ResponseDigestMismatch,
    /// usmStatsNotInTimeWindows persisted after resynchronizing.
    NotInTimeWindow,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::WrongDigest => "wrong digest",
            Self::UnknownUserName => "unknown user name",
            Self::UnsupportedSecurityLevel => "unsupported security level",
            Self::DecryptionError => "decryption error",
            Self::UnknownEngineId => "unknown engine ID",
            Self::ResponseDigestMismatch => "response digest mismatch",
            Self::NotInTimeWindow => "not in time window",
        };
        f.write_str(text)
    }
}

/// Every failure the crate can report.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Input rejected before any network resource was acquired.
    #[error("validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// The operation is not available for the negotiated protocol version.
    #[error("{operation} is not supported by SNMP {version}")]
    Capability {
        operation: &'static str,
        version: Version,
    },

    /// No response after every retry was spent.
    #[error("timeout after {elapsed:?} waiting for {target} ({retries} retries)")]
    Timeout {
        target: SocketAddr,
        elapsed: Duration,
        retries: u32,
    },

    /// The agent answered at the security layer but rejected our credentials.
    #[error("authentication failed for {target}: {reason}")]
    Auth {
        target: SocketAddr,
        reason: AuthFailure,
    },

    /// Socket-level failure.
    #[error("network error communicating with {target}: {source}")]
    Network {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The hostname did not resolve to an address of the requested family.
    #[error("could not resolve {host}")]
    Resolve { host: String },

    /// The agent sent something we could not decode.
    #[error("malformed response from {target}")]
    MalformedResponse { target: SocketAddr },

    /// The agent returned a non-zero error-status.
    #[error("SNMP error from {target}: {status} at index {index}")]
    Snmp {
        target: SocketAddr,
        status: ErrorStatus,
        index: u32,
        oid: Option<Oid>,
    },

    /// A walk was stopped to protect against a misbehaving agent.
    #[error("walk aborted for {target}: {reason}")]
    WalkAborted {
        target: SocketAddr,
        reason: WalkAbortReason,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(Box<str>),

    /// A dotted-decimal OID could not be parsed.
    #[error("invalid OID: {0}")]
    InvalidOid(Box<str>),

    /// The device store failed to load or persist a record.
    #[error("device store error: {0}")]
    Store(Box<str>),
}

impl Error {
    /// Box this error.
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    pub(crate) fn malformed(target: SocketAddr) -> Box<Self> {
        Self::MalformedResponse { target }.boxed()
    }

    pub(crate) fn validation(errors: Vec<String>) -> Box<Self> {
        Self::Validation { errors }.boxed()
    }

    /// Whether retrying the same request could change the outcome.
    ///
    /// Only timeouts are retried; credential and validation failures are final.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the error proves the device answered at all.
    pub fn proves_reachability(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::Snmp { .. } | Self::MalformedResponse { .. }
        )
    }
}

/// SNMP error-status codes (RFC 3416 Section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorStatus {
    NoError,
    TooBig,
    /// v1 only; v2c and v3 report missing objects as exception values.
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    AuthorizationError,
    NotWritable,
    InconsistentName,
    Unknown(i32),
}

const KNOWN_STATUSES: [(ErrorStatus, &str); 19] = [
    (ErrorStatus::NoError, "noError"),
    (ErrorStatus::TooBig, "tooBig"),
    (ErrorStatus::NoSuchName, "noSuchName"),
    (ErrorStatus::BadValue, "badValue"),
    (ErrorStatus::ReadOnly, "readOnly"),
    (ErrorStatus::GenErr, "genErr"),
    (ErrorStatus::NoAccess, "noAccess"),
    (ErrorStatus::WrongType, "wrongType"),
    (ErrorStatus::WrongLength, "wrongLength"),
    (ErrorStatus::WrongEncoding, "wrongEncoding"),
    (ErrorStatus::WrongValue, "wrongValue"),
    (ErrorStatus::NoCreation, "noCreation"),
    (ErrorStatus::InconsistentValue, "inconsistentValue"),
    (ErrorStatus::ResourceUnavailable, "resourceUnavailable"),
    (ErrorStatus::CommitFailed, "commitFailed"),
    (ErrorStatus::UndoFailed, "undoFailed"),
    (ErrorStatus::AuthorizationError, "authorizationError"),
    (ErrorStatus::NotWritable, "notWritable"),
    (ErrorStatus::InconsistentName, "inconsistentName"),
];

impl ErrorStatus {
    /// Map a raw status code. Codes outside 0..=18 become [`ErrorStatus::Unknown`].
    pub fn from_i32(value: i32) -> Self {
        match usize::try_from(value)
            .ok()
            .and_then(|i| KNOWN_STATUSES.get(i))
        {
            Some((status, _)) => *status,
            None => {
                tracing::warn!(target: "snmp_monitor::error", { snmp.error_status = value }, "unknown SNMP error status");
                Self::Unknown(value)
            }
        }
    }

    /// The raw status code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Unknown(code) => *code,
            known => KNOWN_STATUSES
                .iter()
                .position(|(s, _)| s == known)
                .map(|i| i as i32)
                .unwrap_or(-1),
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({code})"),
            known => {
                let name = KNOWN_STATUSES
                    .iter()
                    .find(|(s, _)| s == known)
                    .map(|(_, n)| *n)
                    .unwrap_or("unknown");
                f.write_str(name)
            }
        }
    }
}

impl serde::Serialize for ErrorStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_stays_pointer_sized() {
        assert_eq!(
            std::mem::size_of::<Result<()>>(),
            std::mem::size_of::<*const ()>()
        );
    }

    #[test]
    fn error_status_codes_map_both_ways() {
        for code in 0..=18 {
            assert_eq!(ErrorStatus::from_i32(code).as_i32(), code);
        }
        assert_eq!(ErrorStatus::from_i32(2), ErrorStatus::NoSuchName);
        assert_eq!(ErrorStatus::from_i32(42), ErrorStatus::Unknown(42));
        assert_eq!(ErrorStatus::from_i32(-3).as_i32(), -3);
    }

    #[test]
    fn error_status_display_uses_rfc_names() {
        assert_eq!(ErrorStatus::NotWritable.to_string(), "notWritable");
        assert_eq!(ErrorStatus::Unknown(99).to_string(), "unknown(99)");
    }

    #[test]
    fn validation_message_lists_every_error() {
        let err = Error::Validation {
            errors: vec!["port out of range".into(), "missing community".into()],
        };
        assert_eq!(
            err.to_string(),
            "validation failed: port out of range; missing community"
        );
    }

    #[test]
    fn only_timeouts_are_retriable() {
        let timeout = Error::Timeout {
            target: UNKNOWN_TARGET,
            elapsed: Duration::from_secs(1),
            retries: 0,
        };
        let auth = Error::Auth {
            target: UNKNOWN_TARGET,
            reason: AuthFailure::WrongDigest,
        };
        assert!(timeout.is_retriable());
        assert!(!auth.is_retriable());
        assert!(auth.proves_reachability());
        assert!(!timeout.proves_reachability());
    }
}
