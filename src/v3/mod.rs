//! User-based Security Model (RFC 3414, RFC 3826, RFC 7860).
//!
//! - [`UsmSecurityParams`]: the msgSecurityParameters payload
//! - [`LocalizedKey`]: password-derived HMAC key bound to one engine ID
//! - [`PrivKey`]: DES-CBC and AES-CFB privacy keys
//! - [`EngineCache`]: discovered engine ID/boots/time, kept per device identity
//!   with a TTL

pub mod auth;
mod engine;
mod privacy;
mod usm;

pub use auth::LocalizedKey;
pub use engine::{
    EngineCache, EngineState, MAX_ENGINE_TIME, ReportKind, TIME_WINDOW, classify_report,
    parse_discovery_response, report_oids,
};
pub use privacy::{PrivKey, SaltCounter};
pub use usm::UsmSecurityParams;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A protocol name that is not one we implement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} protocol '{input}'")]
pub struct ParseProtocolError {
    input: String,
    kind: &'static str,
}

/// Authentication protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthProtocol {
    /// HMAC-MD5-96
    Md5,
    /// HMAC-SHA-96
    Sha1,
    /// HMAC-SHA-224 (RFC 7860)
    Sha224,
    /// HMAC-SHA-256 (RFC 7860)
    Sha256,
    /// HMAC-SHA-384 (RFC 7860)
    Sha384,
    /// HMAC-SHA-512 (RFC 7860)
    Sha512,
}

impl AuthProtocol {
    /// Digest output length, which is also the localized key length.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Truncated MAC length carried in msgAuthenticationParameters.
    pub fn mac_len(self) -> usize {
        match self {
            Self::Md5 | Self::Sha1 => 12,
            Self::Sha224 => 16,
            Self::Sha256 => 24,
            Self::Sha384 => 32,
            Self::Sha512 => 48,
        }
    }

    /// Whether the localized key is long enough for `priv_protocol` without
    /// key extension.
    pub fn covers(self, priv_protocol: PrivProtocol) -> bool {
        self.digest_len() >= priv_protocol.key_len()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA",
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }
}

impl fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA" | "SHA1" | "SHA-1" => Ok(Self::Sha1),
            "SHA224" | "SHA-224" => Ok(Self::Sha224),
            "SHA256" | "SHA-256" => Ok(Self::Sha256),
            "SHA384" | "SHA-384" => Ok(Self::Sha384),
            "SHA512" | "SHA-512" => Ok(Self::Sha512),
            _ => Err(ParseProtocolError {
                input: s.to_owned(),
                kind: "authentication",
            }),
        }
    }
}

/// Privacy protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivProtocol {
    /// DES-CBC
    Des,
    /// AES-128-CFB (RFC 3826)
    Aes128,
    /// AES-192-CFB
    Aes192,
    /// AES-256-CFB
    Aes256,
}

impl PrivProtocol {
    /// Key material needed. DES uses 8 key bytes plus an 8 byte pre-IV.
    pub fn key_len(self) -> usize {
        match self {
            Self::Des | Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// Length of msgPrivacyParameters.
    pub fn salt_len(self) -> usize {
        8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Des => "DES",
            Self::Aes128 => "AES",
            Self::Aes192 => "AES-192",
            Self::Aes256 => "AES-256",
        }
    }
}

impl fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DES" => Ok(Self::Des),
            "AES" | "AES128" | "AES-128" => Ok(Self::Aes128),
            "AES192" | "AES-192" => Ok(Self::Aes192),
            "AES256" | "AES-256" => Ok(Self::Aes256),
            _ => Err(ParseProtocolError {
                input: s.to_owned(),
                kind: "privacy",
            }),
        }
    }
}

// Both protocols travel as their conventional names ("SHA-256", "AES") in JSON.
macro_rules! serde_by_name {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                name.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_by_name!(AuthProtocol);
serde_by_name!(PrivProtocol);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_names_accept_aliases() {
        assert_eq!("md5".parse::<AuthProtocol>().unwrap(), AuthProtocol::Md5);
        assert_eq!("SHA".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha1);
        assert_eq!("sha-1".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha1);
        assert_eq!("SHA256".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha256);
        assert_eq!("sha-512".parse::<AuthProtocol>().unwrap(), AuthProtocol::Sha512);
        let err = "blake3".parse::<AuthProtocol>().unwrap_err();
        assert_eq!(err.to_string(), "unknown authentication protocol 'blake3'");
    }

    #[test]
    fn priv_names_accept_aliases() {
        assert_eq!("des".parse::<PrivProtocol>().unwrap(), PrivProtocol::Des);
        assert_eq!("AES".parse::<PrivProtocol>().unwrap(), PrivProtocol::Aes128);
        assert_eq!("aes-192".parse::<PrivProtocol>().unwrap(), PrivProtocol::Aes192);
        assert_eq!("AES256".parse::<PrivProtocol>().unwrap(), PrivProtocol::Aes256);
        assert!("3des".parse::<PrivProtocol>().is_err());
    }

    #[test]
    fn mac_lengths_follow_rfc7860() {
        let lens: Vec<_> = [
            AuthProtocol::Md5,
            AuthProtocol::Sha1,
            AuthProtocol::Sha224,
            AuthProtocol::Sha256,
            AuthProtocol::Sha384,
            AuthProtocol::Sha512,
        ]
        .iter()
        .map(|p| p.mac_len())
        .collect();
        assert_eq!(lens, [12, 12, 16, 24, 32, 48]);
    }

    #[test]
    fn short_digests_do_not_cover_long_aes_keys() {
        assert!(AuthProtocol::Md5.covers(PrivProtocol::Aes128));
        assert!(!AuthProtocol::Sha1.covers(PrivProtocol::Aes192));
        assert!(AuthProtocol::Sha224.covers(PrivProtocol::Aes192));
        assert!(!AuthProtocol::Sha224.covers(PrivProtocol::Aes256));
        assert!(AuthProtocol::Sha256.covers(PrivProtocol::Aes256));
    }

    #[test]
    fn serde_uses_conventional_names() {
        assert_eq!(serde_json::to_string(&AuthProtocol::Sha256).unwrap(), "\"SHA-256\"");
        assert_eq!(serde_json::to_string(&PrivProtocol::Aes128).unwrap(), "\"AES\"");
        let p: PrivProtocol = serde_json::from_str("\"aes-256\"").unwrap();
        assert_eq!(p, PrivProtocol::Aes256);
        assert!(serde_json::from_str::<AuthProtocol>("\"none\"").is_err());
    }
}
