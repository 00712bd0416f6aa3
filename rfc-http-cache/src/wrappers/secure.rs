//! Wraps a [`Cache`] backend so keys are always hashed before reaching it
//! and, when a passphrase is configured, values are encrypted at rest, per
//! §4.9.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::storage::Cache;

const NONCE_LEN: usize = 12;
const SCRYPT_SALT: &[u8] = b"rfc-http-cache-secure-wrapper-v1";

/// A [`Cache`] adapter that hashes every key and, if constructed with a
/// passphrase, encrypts every value with AES-256-GCM.
pub struct SecureCache<C> {
    inner: C,
    cipher: Option<Aes256Gcm>,
}

impl<C: Cache> SecureCache<C> {
    /// Wraps `inner` with key-hashing only; values pass through
    /// unencrypted.
    pub fn new(inner: C) -> Self {
        Self { inner, cipher: None }
    }

    /// Wraps `inner`, deriving an AES-256 key from `passphrase` via scrypt
    /// (N=32768, r=8, p=1) and encrypting every stored value with it.
    /// Rotating the passphrase invalidates every prior entry: the derived
    /// key differs, so decryption of old ciphertext fails and surfaces as
    /// a miss.
    pub fn with_passphrase(inner: C, passphrase: &str) -> Self {
        let params = scrypt::Params::new(15, 8, 1, 32).expect("fixed valid scrypt params");
        let mut key_bytes = [0u8; 32];
        scrypt::scrypt(passphrase.as_bytes(), SCRYPT_SALT, &params, &mut key_bytes)
            .expect("scrypt key derivation does not fail for fixed-size output");
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self { inner, cipher: Some(Aes256Gcm::new(key)) }
    }

    fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl<C: Cache> Cache for SecureCache<C> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let hashed = Self::hash_key(key);
        let Some(stored) = self.inner.get(&hashed).await? else {
            return Ok(None);
        };
        let Some(cipher) = &self.cipher else {
            return Ok(Some(stored));
        };
        if stored.len() < NONCE_LEN {
            log::warn!("stored entry for key {key} is shorter than a nonce; treating as miss");
            return Ok(None);
        }
        let (nonce_bytes, ciphertext) = stored.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        match cipher.decrypt(nonce, ciphertext) {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(_) => {
                log::warn!("failed to decrypt stored entry for key {key}; treating as miss");
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let hashed = Self::hash_key(key);
        let Some(cipher) = &self.cipher else {
            return self.inner.set(&hashed, bytes).await;
        };
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher.encrypt(nonce, bytes.as_slice()).map_err(|_| {
            crate::error::CacheError::Malformed(format!(
                "encryption failed for key {key}"
            ))
        })?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        self.inner.set(&hashed, out).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(&Self::hash_key(key)).await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
