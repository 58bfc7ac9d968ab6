//! Random source for initialization vectors

use rand::{rngs::OsRng, RngCore};

use crate::error::{CacheError, Result};

/// IV length for cache entries (128 bits)
pub const IV_LEN: usize = 16;

/// Initialization vector for a single encryption
pub type Iv = [u8; IV_LEN];

/// Source of cryptographically secure random bytes
pub trait RandomSource: Send + Sync {
    /// Fill `dest` entirely with random bytes
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()>;
}

/// Operating system RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| CacheError::RandomSourceError(e.to_string()))
    }
}

/// Draw a fresh IV. Must be called once per encryption, never reused.
pub fn generate_iv<R: RandomSource + ?Sized>(source: &R) -> Result<Iv> {
    let mut iv = [0u8; IV_LEN];
    source.fill_bytes(&mut iv)?;
    Ok(iv)
}
