//! Key provider abstraction and the bundled AES-128-GCM implementation
//!
//! Entries are encrypted with AES-128 in GCM mode using the full 16-byte IV
//! drawn for each entry. GCM authenticates the ciphertext, so decrypting with
//! the wrong key or a corrupted entry fails instead of returning garbage.

use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit},
    aes::Aes128,
    AesGcm, Nonce,
};
use async_trait::async_trait;
use zeroize::Zeroizing;

use super::random::Iv;
use super::secure_memory::CacheKey;
use crate::error::{CacheError, Result};

/// AES-128-GCM with a 128-bit nonce
type Aes128Gcm16 = AesGcm<Aes128, U16>;

/// Algorithms a key provider can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// AES-128 in Galois/Counter mode with 16-byte IVs
    Aes128Gcm,
}

impl KeyAlgorithm {
    pub fn key_bits(&self) -> u32 {
        match self {
            KeyAlgorithm::Aes128Gcm => 128,
        }
    }
}

/// Capability that owns the cipher.
///
/// Keys are opaque: the cache only ever holds a `Self::Key` and hands it back
/// to the provider. Implementations must not offer a way to read the raw key
/// bytes through that type.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Opaque key handle
    type Key: Send + Sync + 'static;

    /// Generate a new non-extractable key usable for encrypt and decrypt
    async fn generate_key(&self, algorithm: KeyAlgorithm) -> Result<Self::Key>;

    /// Encrypt `plaintext` under `key` and `iv`
    async fn encrypt(&self, key: &Self::Key, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext` under `key` and `iv`.
    ///
    /// Fails with [`CacheError::DecryptionError`] on integrity or format mismatch.
    async fn decrypt(
        &self,
        key: &Self::Key,
        iv: &Iv,
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>>;
}

/// In-process key provider backed by the `aes-gcm` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareKeyProvider;

impl SoftwareKeyProvider {
    pub fn new() -> Self {
        Self
    }

    fn cipher(key: &CacheKey) -> Result<Aes128Gcm16> {
        Aes128Gcm16::new_from_slice(key.as_bytes())
            .map_err(|e| CacheError::EncryptionError(e.to_string()))
    }
}

#[async_trait]
impl KeyProvider for SoftwareKeyProvider {
    type Key = CacheKey;

    async fn generate_key(&self, algorithm: KeyAlgorithm) -> Result<CacheKey> {
        match algorithm {
            KeyAlgorithm::Aes128Gcm => CacheKey::generate(),
        }
    }

    async fn encrypt(&self, key: &CacheKey, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Self::cipher(key)?;
        cipher
            .encrypt(Nonce::<U16>::from_slice(iv), plaintext)
            .map_err(|e| CacheError::EncryptionError(e.to_string()))
    }

    async fn decrypt(
        &self,
        key: &CacheKey,
        iv: &Iv,
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let cipher = Self::cipher(key).map_err(|e| CacheError::DecryptionError(e.to_string()))?;
        cipher
            .decrypt(Nonce::<U16>::from_slice(iv), ciphertext)
            .map(Zeroizing::new)
            .map_err(|e| CacheError::DecryptionError(e.to_string()))
    }
}
