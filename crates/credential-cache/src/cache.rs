//! Credential cache orchestration
//!
//! The cache lives in epochs. An epoch starts when the first `store` or
//! `retrieve` generates a key and ends when [`CredentialCache::clear`] runs.
//! Every entry is encrypted under its epoch's key, and clearing swaps in a
//! brand new epoch slot rather than emptying the old one in place, so an
//! operation still running against the old epoch can never leak into the new
//! one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::{
    generate_iv, Iv, KeyAlgorithm, KeyProvider, OsRandom, RandomSource, SoftwareKeyProvider,
};
use crate::enablement::Enablement;
use crate::error::{CacheError, Result};

/// Algorithm used for every epoch key
pub const CACHE_KEY_ALGORITHM: KeyAlgorithm = KeyAlgorithm::Aes128Gcm;

/// One encrypted secret
struct CacheEntry {
    ciphertext: Vec<u8>,
    iv: Iv,
}

/// Key and entries of an initialized epoch
struct Epoch<K> {
    key: K,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl<K> Epoch<K> {
    fn new(key: K) -> Self {
        Self {
            key,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holder for one epoch. Initialization happens at most once per slot.
struct EpochSlot<K> {
    id: u64,
    cell: OnceCell<Epoch<K>>,
    retired: AtomicBool,
}

impl<K> EpochSlot<K> {
    fn new(id: u64) -> Self {
        Self {
            id,
            cell: OnceCell::new(),
            retired: AtomicBool::new(false),
        }
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Mark the slot defunct and drop whatever entries it holds
    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        if let Some(epoch) = self.cell.get() {
            epoch.entries().clear();
        }
    }
}

struct State<K> {
    slot: Arc<EpochSlot<K>>,
    enabled: Enablement,
    next_epoch: u64,
}

/// Encrypted, consume-on-read cache for short-lived credentials.
///
/// Intended to be owned by a single session (see
/// [`CredentialSession`](crate::CredentialSession)) and cleared when the host
/// locks. Callers are expected to serialize operations on the same name.
pub struct CredentialCache<P: KeyProvider = SoftwareKeyProvider, R: RandomSource = OsRandom> {
    provider: P,
    random: R,
    state: Mutex<State<P::Key>>,
}

impl CredentialCache<SoftwareKeyProvider, OsRandom> {
    /// Create a cache backed by the in-process AES key provider and the OS RNG
    pub fn new() -> Self {
        Self::with_providers(SoftwareKeyProvider::new(), OsRandom)
    }
}

impl Default for CredentialCache<SoftwareKeyProvider, OsRandom> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: KeyProvider, R: RandomSource> CredentialCache<P, R> {
    /// Create a cache with custom key and randomness providers
    pub fn with_providers(provider: P, random: R) -> Self {
        Self {
            provider,
            random,
            state: Mutex::new(State {
                slot: Arc::new(EpochSlot::new(1)),
                enabled: Enablement::Undecided,
                next_epoch: 2,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<P::Key>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_slot(&self) -> Arc<EpochSlot<P::Key>> {
        Arc::clone(&self.state().slot)
    }

    /// Lazily generate the epoch key. Concurrent first callers share a single
    /// key generation; a failed generation leaves the slot empty for retry.
    async fn initialize<'a>(&self, slot: &'a EpochSlot<P::Key>) -> Result<&'a Epoch<P::Key>> {
        slot.cell
            .get_or_try_init(|| async {
                let key = self
                    .provider
                    .generate_key(CACHE_KEY_ALGORITHM)
                    .await
                    .map_err(|e| match e {
                        CacheError::InitializationError(_) => e,
                        other => CacheError::InitializationError(other.to_string()),
                    })?;
                debug!("Generated key for cache epoch {}", slot.id);
                Ok::<_, CacheError>(Epoch::new(key))
            })
            .await
    }

    /// Retrieve and remove the secret stored under `name`.
    ///
    /// The entry is removed before decryption, so it is gone whether or not
    /// decryption succeeds; store it again once the secret has been validated.
    /// The returned bytes are zeroed when dropped.
    pub async fn retrieve(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let slot = self.current_slot();
        let epoch = self.initialize(&slot).await?;

        let Some(entry) = epoch.entries().remove(name) else {
            return Ok(None);
        };

        let plaintext = self
            .provider
            .decrypt(&epoch.key, &entry.iv, &entry.ciphertext)
            .await
            .map_err(|e| {
                warn!("Discarding cache entry {} after failed decryption", name);
                match e {
                    CacheError::DecryptionError(_) => e,
                    other => CacheError::DecryptionError(other.to_string()),
                }
            })?;

        if slot.is_retired() {
            debug!("Cache epoch {} cleared during retrieve of {}", slot.id, name);
            return Ok(None);
        }

        Ok(Some(plaintext))
    }

    /// Encrypt `data` and store it under `name`, replacing any previous entry.
    ///
    /// Once encryption has completed `data` is overwritten with zeros.
    pub async fn store(&self, name: &str, data: &mut [u8]) -> Result<()> {
        let slot = self.current_slot();
        let epoch = self.initialize(&slot).await?;

        let iv = generate_iv(&self.random)?;
        let ciphertext = self.provider.encrypt(&epoch.key, &iv, data).await?;
        data.zeroize();

        if slot.is_retired() {
            debug!(
                "Cache epoch {} cleared during store of {}, dropping entry",
                slot.id, name
            );
            return Ok(());
        }

        epoch
            .entries()
            .insert(name.to_string(), CacheEntry { ciphertext, iv });
        Ok(())
    }

    /// Current opt-in state
    pub fn is_enabled(&self) -> Enablement {
        self.state().enabled
    }

    /// Record the user's caching decision. Only the first call per epoch has
    /// an effect.
    pub fn set_enabled(&self, enable: bool) {
        let mut state = self.state();
        if state.enabled.decide(enable) {
            info!("Credential caching {}", state.enabled);
        } else {
            debug!("Ignoring caching decision, already {}", state.enabled);
        }
    }

    /// End the current epoch: drop every entry and the key, and reset the
    /// opt-in state to undecided.
    pub fn clear(&self) {
        let retired = {
            let mut state = self.state();
            let fresh = Arc::new(EpochSlot::new(state.next_epoch));
            state.next_epoch += 1;
            state.enabled = Enablement::Undecided;
            std::mem::replace(&mut state.slot, fresh)
        };

        let was_active = retired.cell.initialized();
        retired.retire();
        if was_active {
            info!("Credential cache cleared (epoch {})", retired.id);
        } else {
            debug!("Credential cache cleared before first use (epoch {})", retired.id);
        }
    }

    /// Whether the current epoch has generated its key
    pub fn is_initialized(&self) -> bool {
        self.current_slot().cell.initialized()
    }

    /// Identifier of the current epoch, incremented by every clear
    pub fn epoch(&self) -> u64 {
        self.current_slot().id
    }

    /// Number of entries in the current epoch
    pub fn len(&self) -> usize {
        let slot = self.current_slot();
        slot.cell.get().map_or(0, |epoch| epoch.entries().len())
    }

    /// Whether the current epoch holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entry exists under `name` without consuming it
    pub fn contains(&self, name: &str) -> bool {
        let slot = self.current_slot();
        slot.cell
            .get()
            .is_some_and(|epoch| epoch.entries().contains_key(name))
    }
}

impl<P: KeyProvider, R: RandomSource> std::fmt::Debug for CredentialCache<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("epoch", &self.epoch())
            .field("initialized", &self.is_initialized())
            .field("entries", &self.len())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CacheKey;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Wraps the software provider with call counting, optional key
    /// generation failures and gates to pause encrypt/decrypt mid-flight.
    #[derive(Default)]
    struct TestProvider {
        inner: SoftwareKeyProvider,
        generated: AtomicUsize,
        fail_generations: AtomicUsize,
        generate_delay: Option<Duration>,
        gate_crypto: bool,
        crypto_started: Notify,
        crypto_release: Notify,
    }

    impl TestProvider {
        fn generated(&self) -> usize {
            self.generated.load(Ordering::SeqCst)
        }

        async fn wait_gate(&self) {
            if self.gate_crypto {
                self.crypto_started.notify_one();
                self.crypto_release.notified().await;
            }
        }
    }

    #[async_trait::async_trait]
    impl KeyProvider for TestProvider {
        type Key = CacheKey;

        async fn generate_key(&self, algorithm: KeyAlgorithm) -> Result<CacheKey> {
            if let Some(delay) = self.generate_delay {
                tokio::time::sleep(delay).await;
            }
            let remaining = self.fail_generations.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_generations.store(remaining - 1, Ordering::SeqCst);
                return Err(CacheError::InitializationError("no key for you".to_string()));
            }
            self.generated.fetch_add(1, Ordering::SeqCst);
            self.inner.generate_key(algorithm).await
        }

        async fn encrypt(&self, key: &CacheKey, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
            self.wait_gate().await;
            self.inner.encrypt(key, iv, plaintext).await
        }

        async fn decrypt(
            &self,
            key: &CacheKey,
            iv: &Iv,
            ciphertext: &[u8],
        ) -> Result<Zeroizing<Vec<u8>>> {
            self.wait_gate().await;
            self.inner.decrypt(key, iv, ciphertext).await
        }
    }

    fn test_cache(provider: TestProvider) -> CredentialCache<TestProvider, OsRandom> {
        CredentialCache::with_providers(provider, OsRandom)
    }

    fn stored_entry<P: KeyProvider, R: RandomSource>(
        cache: &CredentialCache<P, R>,
        name: &str,
    ) -> Option<(Vec<u8>, Iv)> {
        let slot = cache.current_slot();
        let epoch = slot.cell.get()?;
        let entries = epoch.entries();
        entries
            .get(name)
            .map(|entry| (entry.ciphertext.clone(), entry.iv))
    }

    #[tokio::test]
    async fn test_store_retrieve_roundtrip() {
        let cache = CredentialCache::new();
        let mut data = b"correct horse battery staple".to_vec();

        cache.store("ssh://user@host", &mut data).await.unwrap();
        let retrieved = cache.retrieve("ssh://user@host").await.unwrap().unwrap();

        assert_eq!(retrieved.as_slice(), b"correct horse battery staple");
    }

    #[tokio::test]
    async fn test_store_zeroes_caller_buffer() {
        let cache = CredentialCache::new();
        let mut data = vec![1u8, 2, 3, 4, 5, 6];

        cache.store("pin", &mut data).await.unwrap();

        assert_eq!(data.len(), 6);
        assert!(data.iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn test_retrieve_consumes_entry() {
        let cache = CredentialCache::new();
        let mut data = vec![1u8, 2, 3];

        cache.store("k", &mut data).await.unwrap();
        assert!(cache.contains("k"));

        let first = cache.retrieve("k").await.unwrap();
        assert_eq!(first.as_deref().map(Vec::as_slice), Some(&[1u8, 2, 3][..]));
        assert!(cache.retrieve("k").await.unwrap().is_none());
        assert!(!cache.contains("k"));
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let cache = CredentialCache::new();

        cache.store("k", &mut b"first".to_vec()).await.unwrap();
        cache.store("k", &mut b"second".to_vec()).await.unwrap();

        assert_eq!(cache.len(), 1);
        let retrieved = cache.retrieve("k").await.unwrap().unwrap();
        assert_eq!(retrieved.as_slice(), b"second");
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let cache = CredentialCache::new();

        assert!(cache.retrieve("missing").await.unwrap().is_none());
        assert!(cache.is_initialized());
    }

    #[test]
    fn test_enablement_first_call_wins() {
        let cache = CredentialCache::new();

        assert_eq!(cache.is_enabled(), Enablement::Undecided);
        cache.set_enabled(true);
        cache.set_enabled(false);
        assert_eq!(cache.is_enabled(), Enablement::Enabled);
    }

    #[tokio::test]
    async fn test_clear_discards_entries_and_decision() {
        let cache = CredentialCache::new();
        cache.set_enabled(false);
        cache.store("k", &mut b"secret".to_vec()).await.unwrap();
        let epoch = cache.epoch();

        cache.clear();

        assert!(!cache.is_initialized());
        assert_eq!(cache.epoch(), epoch + 1);
        assert_eq!(cache.is_enabled(), Enablement::Undecided);
        assert!(cache.retrieve("k").await.unwrap().is_none());

        // A new decision is possible in the new epoch
        cache.set_enabled(true);
        assert_eq!(cache.is_enabled(), Enablement::Enabled);
    }

    #[tokio::test]
    async fn test_clear_generates_new_key() {
        let cache = test_cache(TestProvider::default());

        cache.store("a", &mut b"x".to_vec()).await.unwrap();
        cache.clear();
        cache.store("b", &mut b"y".to_vec()).await.unwrap();

        assert_eq!(cache.provider.generated(), 2);
    }

    #[tokio::test]
    async fn test_identical_plaintexts_get_distinct_ivs() {
        let cache = CredentialCache::new();

        cache.store("a", &mut b"hunter2".to_vec()).await.unwrap();
        cache.store("b", &mut b"hunter2".to_vec()).await.unwrap();
        let (c1, iv1) = stored_entry(&cache, "a").unwrap();
        let (c2, iv2) = stored_entry(&cache, "b").unwrap();
        assert_ne!(iv1, iv2);
        assert_ne!(c1, c2);

        cache.store("a", &mut b"hunter2".to_vec()).await.unwrap();
        let (c3, iv3) = stored_entry(&cache, "a").unwrap();
        assert_ne!(iv1, iv3);
        assert_ne!(c1, c3);
    }

    #[tokio::test]
    async fn test_ciphertext_does_not_contain_plaintext() {
        let cache = CredentialCache::new();

        cache.store("k", &mut b"plaintext-pin".to_vec()).await.unwrap();
        let (ciphertext, _) = stored_entry(&cache, "k").unwrap();

        assert!(!ciphertext
            .windows(b"plaintext-pin".len())
            .any(|w| w == b"plaintext-pin"));
    }

    #[tokio::test]
    async fn test_lazy_initialization() {
        let cache = test_cache(TestProvider::default());

        cache.set_enabled(true);
        assert!(!cache.is_initialized());
        assert_eq!(cache.provider.generated(), 0);
        assert_eq!(cache.len(), 0);

        cache.retrieve("anything").await.unwrap();
        cache.store("k", &mut b"v".to_vec()).await.unwrap();
        assert_eq!(cache.provider.generated(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_share_one_key() {
        let cache = test_cache(TestProvider {
            generate_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });

        let names: Vec<String> = (0..8).map(|i| format!("host-{}", i)).collect();
        let mut buffers: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 4]).collect();

        let stores = names
            .iter()
            .zip(buffers.iter_mut())
            .map(|(name, buf)| cache.store(name, buf));
        for result in futures::future::join_all(stores).await {
            result.unwrap();
        }

        assert_eq!(cache.provider.generated(), 1);
        for (i, name) in names.iter().enumerate() {
            let value = cache.retrieve(name).await.unwrap().unwrap();
            assert_eq!(value.as_slice(), vec![i as u8; 4].as_slice());
        }
    }

    #[tokio::test]
    async fn test_failed_key_generation_is_retried() {
        let cache = test_cache(TestProvider {
            fail_generations: AtomicUsize::new(1),
            ..Default::default()
        });
        let mut data = b"pin".to_vec();

        let result = cache.store("k", &mut data).await;
        assert!(matches!(result, Err(CacheError::InitializationError(_))));
        assert!(!cache.is_initialized());
        // Nothing was encrypted, so the caller still has the secret
        assert_eq!(data, b"pin");

        cache.store("k", &mut data).await.unwrap();
        assert!(cache.is_initialized());
        assert_eq!(cache.retrieve("k").await.unwrap().unwrap().as_slice(), b"pin");
    }

    #[tokio::test]
    async fn test_failed_decryption_discards_entry() {
        let cache = CredentialCache::new();
        cache.store("k", &mut b"secret".to_vec()).await.unwrap();

        {
            let slot = cache.current_slot();
            let epoch = slot.cell.get().unwrap();
            let mut entries = epoch.entries();
            entries.get_mut("k").unwrap().ciphertext[0] ^= 0xFF;
        }

        let result = cache.retrieve("k").await;
        assert!(matches!(result, Err(CacheError::DecryptionError(_))));
        assert!(result.unwrap_err().is_recoverable());
        assert!(cache.retrieve("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_interrupted_by_clear_is_dropped() {
        let cache = Arc::new(test_cache(TestProvider {
            gate_crypto: true,
            ..Default::default()
        }));

        let task = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let mut data = b"old epoch secret".to_vec();
                let result = cache.store("k", &mut data).await;
                (result, data)
            })
        };

        cache.provider.crypto_started.notified().await;
        cache.clear();
        cache.provider.crypto_release.notify_one();

        let (result, data) = task.await.unwrap();
        result.unwrap();
        assert!(data.iter().all(|b| *b == 0));

        assert!(!cache.is_initialized());
        assert!(!cache.contains("k"));
        assert!(cache.retrieve("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retrieve_interrupted_by_clear_returns_none() {
        let cache = Arc::new(test_cache(TestProvider {
            gate_crypto: true,
            ..Default::default()
        }));

        let store = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.store("k", &mut b"secret".to_vec()).await })
        };
        cache.provider.crypto_started.notified().await;
        cache.provider.crypto_release.notify_one();
        store.await.unwrap().unwrap();

        let retrieve = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.retrieve("k").await })
        };
        cache.provider.crypto_started.notified().await;
        cache.clear();
        cache.provider.crypto_release.notify_one();

        assert!(retrieve.await.unwrap().unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_store_after_clear_starts_new_epoch() {
        let cache = CredentialCache::new();
        cache.store("k", &mut b"one".to_vec()).await.unwrap();
        cache.clear();
        cache.store("k", &mut b"two".to_vec()).await.unwrap();

        assert_eq!(cache.retrieve("k").await.unwrap().unwrap().as_slice(), b"two");
    }

    struct BrokenRandom;

    impl RandomSource for BrokenRandom {
        fn fill_bytes(&self, _dest: &mut [u8]) -> Result<()> {
            Err(CacheError::RandomSourceError("entropy unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_random_source_failure_leaves_buffer() {
        let cache = CredentialCache::with_providers(SoftwareKeyProvider, BrokenRandom);
        cache.set_enabled(true);
        let mut data = b"pin".to_vec();

        let result = cache.store("k", &mut data).await;
        assert!(matches!(result, Err(CacheError::RandomSourceError(_))));
        assert_eq!(data, b"pin");
        assert!(!cache.contains("k"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_debug_hides_contents() {
        let cache = CredentialCache::new();
        let debug = format!("{:?}", cache);
        assert!(debug.contains("CredentialCache"));
        assert!(debug.contains("Undecided"));
    }
}
