//! Host lock signal handling
//!
//! The host reports its session state through an unbounded `mpsc` channel,
//! so every report is delivered in order and a `Locked` can never be
//! overwritten by a later `Active`. A [`LockWatcher`] task turns those
//! reports into [`CredentialCache::clear`] calls according to a
//! [`LockPolicy`]; the signal source itself never touches the cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::CredentialCache;
use crate::crypto::{KeyProvider, RandomSource};
use crate::settings::CacheSettings;

/// Session state as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostState {
    /// User is interacting with the host
    #[default]
    Active,
    /// No input for the host's idle detection interval
    Idle,
    /// Screen or session locked
    Locked,
}

/// When host state changes should clear the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockPolicy {
    /// Clear on `Idle` as well as `Locked`
    pub clear_on_idle: bool,
    /// Clear when no `Active` report arrived within this window
    pub auto_clear_timeout: Option<Duration>,
}

impl LockPolicy {
    /// Whether a report of `state` must clear the cache
    pub fn clears_on(&self, state: HostState) -> bool {
        match state {
            HostState::Locked => true,
            HostState::Idle => self.clear_on_idle,
            HostState::Active => false,
        }
    }
}

impl From<&CacheSettings> for LockPolicy {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            clear_on_idle: settings.clear_on_idle,
            auto_clear_timeout: settings.auto_clear_timeout(),
        }
    }
}

/// Background task clearing a cache on host lock
pub struct LockWatcher {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl LockWatcher {
    /// Spawn a watcher for `cache` on the current tokio runtime
    pub fn spawn<P, R>(
        cache: Arc<CredentialCache<P, R>>,
        states: mpsc::UnboundedReceiver<HostState>,
        policy: LockPolicy,
    ) -> Self
    where
        P: KeyProvider + 'static,
        R: RandomSource + 'static,
    {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(watch_host(cache, states, policy, shutdown_rx));
        Self {
            handle,
            shutdown: Some(shutdown),
        }
    }

    /// Whether the watcher has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the watcher and wait for it to exit
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

impl Drop for LockWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn watch_host<P, R>(
    cache: Arc<CredentialCache<P, R>>,
    mut states: mpsc::UnboundedReceiver<HostState>,
    policy: LockPolicy,
    mut shutdown: oneshot::Receiver<()>,
) where
    P: KeyProvider,
    R: RandomSource,
{
    let mut deadline = policy.auto_clear_timeout.map(|t| Instant::now() + t);

    loop {
        let auto_clear = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = &mut shutdown => {
                debug!("Lock watcher shutting down");
                break;
            }
            report = states.recv() => {
                let Some(state) = report else {
                    debug!("Host state source closed, lock watcher exiting");
                    break;
                };
                if policy.clears_on(state) {
                    info!("Host {:?}, clearing credential cache", state);
                    cache.clear();
                    deadline = None;
                } else if state == HostState::Active {
                    deadline = policy.auto_clear_timeout.map(|t| Instant::now() + t);
                } else {
                    debug!("Host {:?}", state);
                }
            }
            _ = auto_clear => {
                info!("No host activity within auto-clear timeout, clearing credential cache");
                cache.clear();
                deadline = None;
            }
        }
    }
}
