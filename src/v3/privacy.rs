//! Privacy: DES-CBC (RFC 3414 Section 8) and AES-CFB-128/192/256 (RFC 3826).
//!
//! DES: salt = engineBoots || counter, IV = pre-IV XOR salt.
//! AES: salt = 64-bit counter, IV = engineBoots || engineTime || salt.

use std::sync::atomic::{AtomicU64, Ordering};

use aes::{Aes128, Aes192, Aes256};
use bytes::Bytes;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::auth::{LocalizedKey, extend_key};
use super::{AuthProtocol, PrivProtocol};
use crate::error::internal::CryptoErrorKind;

type CryptoResult<T> = std::result::Result<T, CryptoErrorKind>;

/// Salt source shared by every encryption under one session.
///
/// Never yields zero; the counter skips it on wraparound.
#[derive(Debug)]
pub struct SaltCounter(AtomicU64);

impl SaltCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(crate::util::random_nonzero_u64()))
    }

    pub fn from_value(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    pub fn next(&self) -> u64 {
        let value = self.0.fetch_add(1, Ordering::Relaxed);
        if value == 0 {
            self.0.fetch_add(1, Ordering::Relaxed)
        } else {
            value
        }
    }
}

impl Default for SaltCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Localized privacy key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: PrivProtocol,
}

impl PrivKey {
    /// Derive from the privacy password the same way as an auth key, then
    /// extend it when the auth digest is shorter than the cipher key.
    pub fn from_password(
        auth_protocol: AuthProtocol,
        priv_protocol: PrivProtocol,
        password: &[u8],
        engine_id: &[u8],
    ) -> Self {
        let localized = LocalizedKey::from_password(auth_protocol, password, engine_id);
        let key = if auth_protocol.covers(priv_protocol) {
            localized.as_bytes().to_vec()
        } else {
            tracing::debug!(target: "snmp_monitor::v3", { auth = %auth_protocol, privacy = %priv_protocol }, "extending privacy key");
            extend_key(auth_protocol, localized.as_bytes(), priv_protocol.key_len())
        };
        Self {
            key,
            protocol: priv_protocol,
        }
    }

    pub fn from_bytes(protocol: PrivProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    fn material(&self) -> CryptoResult<&[u8]> {
        self.key
            .get(..self.protocol.key_len())
            .ok_or(CryptoErrorKind::InvalidKeyLength)
    }

    /// Encrypt a serialized ScopedPDU, returning `(ciphertext, privParameters)`.
    pub(crate) fn encrypt(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        salt: &SaltCounter,
    ) -> CryptoResult<(Bytes, Bytes)> {
        let material = self.material()?;
        let counter = salt.next();
        match self.protocol {
            PrivProtocol::Des => {
                use cbc::cipher::block_padding::NoPadding;
                use cbc::cipher::{BlockEncryptMut, KeyIvInit};

                let mut salt = [0u8; 8];
                salt[..4].copy_from_slice(&engine_boots.to_be_bytes());
                salt[4..].copy_from_slice(&(counter as u32).to_be_bytes());
                let iv = des_iv(&material[8..16], &salt);

                let padded = plaintext.len().div_ceil(8) * 8;
                let mut buffer = vec![0u8; padded];
                buffer[..plaintext.len()].copy_from_slice(plaintext);
                let cipher = cbc::Encryptor::<des::Des>::new_from_slices(&material[..8], &iv)
                    .map_err(|_| CryptoErrorKind::InvalidKeyLength)?;
                cipher
                    .encrypt_padded_mut::<NoPadding>(&mut buffer, padded)
                    .map_err(|_| CryptoErrorKind::CipherError)?;
                Ok((Bytes::from(buffer), Bytes::copy_from_slice(&salt)))
            }
            _ => {
                let salt = counter.to_be_bytes();
                let iv = aes_iv(engine_boots, engine_time, &salt);
                let mut buffer = plaintext.to_vec();
                aes_cfb(self.protocol, material, &iv, &mut buffer, true)?;
                Ok((Bytes::from(buffer), Bytes::copy_from_slice(&salt)))
            }
        }
    }

    /// Decrypt an encryptedPDU using the sender's privParameters.
    pub(crate) fn decrypt(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8],
    ) -> CryptoResult<Bytes> {
        if priv_params.len() != self.protocol.salt_len() {
            return Err(CryptoErrorKind::InvalidPrivParamsLength {
                expected: self.protocol.salt_len(),
                actual: priv_params.len(),
            });
        }
        let material = self.material()?;
        match self.protocol {
            PrivProtocol::Des => {
                use cbc::cipher::block_padding::NoPadding;
                use cbc::cipher::{BlockDecryptMut, KeyIvInit};

                if ciphertext.len() % 8 != 0 {
                    return Err(CryptoErrorKind::InvalidCiphertextLength {
                        length: ciphertext.len(),
                        block_size: 8,
                    });
                }
                let iv = des_iv(&material[8..16], priv_params);
                let mut buffer = ciphertext.to_vec();
                let cipher = cbc::Decryptor::<des::Des>::new_from_slices(&material[..8], &iv)
                    .map_err(|_| CryptoErrorKind::InvalidKeyLength)?;
                cipher
                    .decrypt_padded_mut::<NoPadding>(&mut buffer)
                    .map_err(|_| CryptoErrorKind::CipherError)?;
                Ok(Bytes::from(buffer))
            }
            _ => {
                let iv = aes_iv(engine_boots, engine_time, priv_params);
                let mut buffer = ciphertext.to_vec();
                aes_cfb(self.protocol, material, &iv, &mut buffer, false)?;
                Ok(Bytes::from(buffer))
            }
        }
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn des_iv(pre_iv: &[u8], salt: &[u8]) -> [u8; 8] {
    let mut iv = [0u8; 8];
    for (out, (p, s)) in iv.iter_mut().zip(pre_iv.iter().zip(salt)) {
        *out = p ^ s;
    }
    iv
}

fn aes_iv(engine_boots: u32, engine_time: u32, salt: &[u8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
    iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
    iv[8..].copy_from_slice(salt);
    iv
}

fn aes_cfb(
    protocol: PrivProtocol,
    key: &[u8],
    iv: &[u8; 16],
    buffer: &mut [u8],
    encrypt: bool,
) -> CryptoResult<()> {
    use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

    macro_rules! run {
        ($cipher:ty) => {
            if encrypt {
                cfb_mode::Encryptor::<$cipher>::new_from_slices(key, iv)
                    .map_err(|_| CryptoErrorKind::InvalidKeyLength)?
                    .encrypt(buffer)
            } else {
                cfb_mode::Decryptor::<$cipher>::new_from_slices(key, iv)
                    .map_err(|_| CryptoErrorKind::InvalidKeyLength)?
                    .decrypt(buffer)
            }
        };
    }

    match protocol {
        PrivProtocol::Aes128 => run!(Aes128),
        PrivProtocol::Aes192 => run!(Aes192),
        PrivProtocol::Aes256 => run!(Aes256),
        PrivProtocol::Des => return Err(CryptoErrorKind::CipherError),
    }
    Ok(())
}
