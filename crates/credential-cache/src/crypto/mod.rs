//! Cryptographic capabilities used by the cache
//!
//! This module provides:
//! - The `KeyProvider` trait and an AES-128-GCM software implementation
//! - The `RandomSource` trait for IV generation
//! - Zeroize-on-drop key material

mod key_provider;
mod random;
mod secure_memory;

pub use key_provider::{KeyAlgorithm, KeyProvider, SoftwareKeyProvider};
pub use random::{generate_iv, Iv, OsRandom, RandomSource, IV_LEN};
pub use secure_memory::{CacheKey, KEY_LEN};
