//! # credential-cache
//!
//! Short-lived, in-process cache for passwords, smart-card PINs and other
//! credentials used during an interactive session:
//! - AES-128-GCM encryption of every entry under a per-epoch key, with a fresh
//!   random IV per store
//! - Consume-on-read retrieval and zeroing of caller buffers
//! - One-time user opt-in per epoch
//! - Epoch invalidation when the host session locks or idles
//!
//! Keys are only as non-extractable as the [`KeyProvider`] makes them. The
//! bundled [`SoftwareKeyProvider`] stops calling code from reading key bytes
//! but offers no protection against anything that can read process memory.

pub mod cache;
pub mod crypto;
pub mod enablement;
pub mod error;
pub mod lock;
pub mod session;
pub mod settings;

pub use cache::{CredentialCache, CACHE_KEY_ALGORITHM};
pub use crypto::{KeyAlgorithm, KeyProvider, OsRandom, RandomSource, SoftwareKeyProvider};
pub use enablement::Enablement;
pub use error::{CacheError, Result};
pub use lock::{HostState, LockPolicy, LockWatcher};
pub use session::CredentialSession;
pub use settings::{CacheSettings, SettingsManager};
