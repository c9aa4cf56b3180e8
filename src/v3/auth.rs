//! Key derivation and HMAC authentication (RFC 3414 Section 6 and A.2).

use digest::{Digest, KeyInit, Mac};
use hmac::Hmac;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::AuthProtocol;

const EXPANSION_SIZE: usize = 1_048_576;

/// Run `$body` with `$d` bound to the hash type for `$protocol`.
macro_rules! with_digest {
    ($protocol:expr, $d:ident => $body:expr) => {
        match $protocol {
            AuthProtocol::Md5 => {
                type $d = md5::Md5;
                $body
            }
            AuthProtocol::Sha1 => {
                type $d = sha1::Sha1;
                $body
            }
            AuthProtocol::Sha224 => {
                type $d = sha2::Sha224;
                $body
            }
            AuthProtocol::Sha256 => {
                type $d = sha2::Sha256;
                $body
            }
            AuthProtocol::Sha384 => {
                type $d = sha2::Sha384;
                $body
            }
            AuthProtocol::Sha512 => {
                type $d = sha2::Sha512;
                $body
            }
        }
    };
}

/// Authentication key localized to one engine ID.
///
/// The key bytes are zeroed on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl LocalizedKey {
    /// Ku = H(password repeated to 1 MiB), Kul = H(Ku || engineID || Ku).
    pub fn from_password(protocol: AuthProtocol, password: &[u8], engine_id: &[u8]) -> Self {
        let mut master = password_to_key(protocol, password);
        let key = localize(protocol, &master, engine_id);
        master.zeroize();
        Self { key, protocol }
    }

    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn mac_len(&self) -> usize {
        self.protocol.mac_len()
    }

    /// HMAC over `data`, truncated to the protocol's MAC length.
    pub fn compute_hmac(&self, data: &[u8]) -> Vec<u8> {
        let len = self.mac_len();
        with_digest!(self.protocol, D => {
            let mut mac = <Hmac<D> as KeyInit>::new_from_slice(&self.key)
                .expect("HMAC accepts keys of any length");
            Mac::update(&mut mac, data);
            mac.finalize().into_bytes()[..len].to_vec()
        })
    }

    /// Constant-time comparison of the computed MAC against `expected`.
    pub fn verify_hmac(&self, data: &[u8], expected: &[u8]) -> bool {
        let computed = self.compute_hmac(data);
        computed.len() == expected.len()
            && computed
                .iter()
                .zip(expected)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Password to master key. An empty password yields an all-zero key.
pub(crate) fn password_to_key(protocol: AuthProtocol, password: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return vec![0u8; protocol.digest_len()];
    }
    with_digest!(protocol, D => {
        let mut hasher = D::new();
        let mut chunk = [0u8; 64];
        let mut index = 0;
        for _ in 0..EXPANSION_SIZE / chunk.len() {
            for byte in &mut chunk {
                *byte = password[index];
                index = (index + 1) % password.len();
            }
            hasher.update(chunk);
        }
        chunk.zeroize();
        hasher.finalize().to_vec()
    })
}

pub(crate) fn localize(protocol: AuthProtocol, master: &[u8], engine_id: &[u8]) -> Vec<u8> {
    with_digest!(protocol, D => {
        let mut hasher = D::new();
        hasher.update(master);
        hasher.update(engine_id);
        hasher.update(master);
        hasher.finalize().to_vec()
    })
}

/// Stretch a localized key to `len` bytes: K || H(K) || H(K || H(K)) ...
///
/// Needed when AES-192/256 is paired with a digest shorter than the cipher key.
pub(crate) fn extend_key(protocol: AuthProtocol, key: &[u8], len: usize) -> Vec<u8> {
    let mut out = key.to_vec();
    while out.len() < len {
        let next = with_digest!(protocol, D => D::digest(&out).to_vec());
        out.extend_from_slice(&next);
    }
    out.truncate(len);
    out
}

/// Replace the zeroed msgAuthenticationParameters at `offset` with the MAC
/// of the whole message.
pub fn authenticate_message(key: &LocalizedKey, message: &mut [u8], offset: usize, len: usize) {
    let mac = key.compute_hmac(message);
    message[offset..offset + len].copy_from_slice(&mac);
}

/// Check the MAC of a received message.
pub fn verify_message(key: &LocalizedKey, message: &[u8], offset: usize, len: usize) -> bool {
    let Some(received) = message.get(offset..offset + len) else {
        return false;
    };
    let mut zeroed = message.to_vec();
    zeroed[offset..offset + len].fill(0);
    key.verify_hmac(&zeroed, received)
}
