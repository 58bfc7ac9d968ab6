//! Key material with automatic zeroization

use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CacheError, Result};

/// Key length for the cache cipher (128 bits)
pub const KEY_LEN: usize = 16;

/// Symmetric key for one cache epoch - automatically zeroed when dropped.
///
/// The raw bytes are only reachable from inside the `crypto` module, so code
/// holding a `CacheKey` can use it through a [`KeyProvider`](super::KeyProvider)
/// but cannot export it. This keeps honest callers from leaking the key; it is
/// not protection against anything that can read process memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CacheKey {
    key: [u8; KEY_LEN],
}

impl CacheKey {
    /// Generate a fresh key from the OS random number generator
    pub(super) fn generate() -> Result<Self> {
        let mut key = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| CacheError::InitializationError(e.to_string()))?;
        Ok(Self { key })
    }

    pub(super) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    #[cfg(test)]
    pub(super) fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }
}

impl std::fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_differ() {
        let a = CacheKey::generate().unwrap();
        let b = CacheKey::generate().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_debug_redacted() {
        let key = CacheKey::from_bytes([7u8; KEY_LEN]);
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains('7'));
    }
}
