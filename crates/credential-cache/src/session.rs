//! Credential sessions
//!
//! A session owns one [`CredentialCache`] for the lifetime of an interactive
//! connection, together with the [`LockWatcher`] that clears it when the host
//! locks. Closing or dropping the session clears the cache.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::CredentialCache;
use crate::crypto::{KeyProvider, OsRandom, RandomSource, SoftwareKeyProvider};
use crate::error::Result;
use crate::lock::{HostState, LockPolicy, LockWatcher};
use crate::settings::CacheSettings;

/// Owner of a credential cache for one interactive session
pub struct CredentialSession<P: KeyProvider = SoftwareKeyProvider, R: RandomSource = OsRandom> {
    /// Session ID for logging
    session_id: Uuid,
    cache: Arc<CredentialCache<P, R>>,
    policy: LockPolicy,
    host: mpsc::UnboundedSender<HostState>,
    watcher: Option<LockWatcher>,
}

impl CredentialSession<SoftwareKeyProvider, OsRandom> {
    /// Open a session with the default providers. Must be called from within
    /// a tokio runtime.
    pub fn open(settings: &CacheSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::with_cache(CredentialCache::new(), LockPolicy::from(settings)))
    }
}

impl<P, R> CredentialSession<P, R>
where
    P: KeyProvider + 'static,
    R: RandomSource + 'static,
{
    /// Open a session around an existing cache
    pub fn with_cache(cache: CredentialCache<P, R>, policy: LockPolicy) -> Self {
        let session_id = Uuid::new_v4();
        let cache = Arc::new(cache);
        let (host, states) = mpsc::unbounded_channel();
        let watcher = LockWatcher::spawn(Arc::clone(&cache), states, policy);

        info!("Opened credential session {}", session_id);

        Self {
            session_id,
            cache,
            policy,
            host,
            watcher: Some(watcher),
        }
    }

    pub fn id(&self) -> Uuid {
        self.session_id
    }

    /// The session's cache
    pub fn cache(&self) -> &Arc<CredentialCache<P, R>> {
        &self.cache
    }

    /// Report a host state change. A state the policy clears on clears the
    /// cache before this returns; anything else goes to the lock watcher.
    pub fn report_host_state(&self, state: HostState) {
        debug!("Session {} host state: {:?}", self.session_id, state);
        if self.policy.clears_on(state) {
            info!("Session {} host {:?}, clearing credential cache", self.session_id, state);
            self.cache.clear();
            return;
        }
        let _ = self.host.send(state);
    }

    /// Stop watching the host and clear the cache
    pub async fn close(mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop().await;
        }
        self.cache.clear();
        info!("Closed credential session {}", self.session_id);
    }
}

impl<P: KeyProvider, R: RandomSource> Drop for CredentialSession<P, R> {
    fn drop(&mut self) {
        if self.watcher.take().is_some() {
            self.cache.clear();
            debug!("Dropped credential session {} without close", self.session_id);
        }
    }
}
