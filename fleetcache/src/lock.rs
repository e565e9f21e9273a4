//! Cluster-wide mutual exclusion on top of the shared store's atomic
//! set-if-absent.
//!
//! A lock is a store key holding a random token, written with a TTL. The
//! TTL is the safety net for crashed holders: the lock expires instead of
//! wedging the fleet. Release deletes the key only while it still holds
//! the holder's token, so a holder whose lock expired and was re-acquired
//! elsewhere cannot release the new owner's lock.

use std::sync::Arc;
use std::time::Duration;

use fleetcache_backend::{BackendError, LockStatus, SharedStore};
use fleetcache_core::{LockToken, Raw};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

#[cfg(feature = "metrics")]
use crate::metrics::{LOCK_ACQUIRED, LOCK_BUSY};

use crate::error::LockError;
use crate::policy::{BackoffConfig, deadline};

/// Outcome of [`LockGuard::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    /// The lock was ours and is gone.
    Released,
    /// The lock had expired, and possibly been taken by someone else.
    NotOwned,
}

/// Acquires locks in a shared store.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn SharedStore>,
    backoff: BackoffConfig,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("store", &self.store.name())
            .field("backoff", &self.backoff)
            .finish()
    }
}

impl LockManager {
    /// Creates a lock manager retrying with the default backoff.
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            store,
            backoff: BackoffConfig::default(),
        }
    }

    /// Sets the retry schedule used by [`acquire`](Self::acquire).
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Makes a single acquisition attempt.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<LockGuard, LockError> {
        let token = LockToken::generate();
        let status = self
            .store
            .set_if_absent(key, Raw::copy_from_slice(token.as_bytes()), ttl)
            .await?;
        match status {
            LockStatus::Acquired => {
                debug!(key, %token, ?ttl, "lock acquired");
                #[cfg(feature = "metrics")]
                metrics::counter!(*LOCK_ACQUIRED).increment(1);
                Ok(LockGuard {
                    store: Arc::clone(&self.store),
                    key: key.to_owned(),
                    token,
                    released: false,
                })
            }
            LockStatus::Locked => {
                trace!(key, "lock busy");
                #[cfg(feature = "metrics")]
                metrics::counter!(*LOCK_BUSY).increment(1);
                Err(LockError::Busy {
                    key: key.to_owned(),
                })
            }
        }
    }

    /// Acquires `key` for `ttl`, retrying with backoff for up to `wait`.
    ///
    /// A zero `wait` makes exactly one attempt.
    pub async fn acquire(
        &self,
        key: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<LockGuard, LockError> {
        let deadline = deadline(Instant::now(), wait);
        let mut delays = self.backoff.schedule();
        loop {
            match self.try_acquire(key, ttl).await {
                Err(LockError::Busy { key }) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LockError::Busy { key });
                    }
                    let delay = delays.next().unwrap_or(self.backoff.max);
                    tokio::time::sleep(delay.min(deadline - now)).await;
                }
                result => return result,
            }
        }
    }
}

/// Proof of holding a lock.
///
/// Release it with [`release`](Self::release). A guard dropped without
/// releasing (an early return, a panic, a cancelled task) spawns the release
/// on the current tokio runtime; outside a runtime the lock is left to
/// expire.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    store: Arc<dyn SharedStore>,
    key: String,
    token: LockToken,
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}

impl LockGuard {
    /// Store key of the lock.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Token identifying this acquisition.
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Releases the lock if this guard still owns it.
    pub async fn release(mut self) -> Result<ReleaseStatus, BackendError> {
        let status = self
            .store
            .delete_if_equals(&self.key, self.token.as_bytes())
            .await?;
        self.released = true;
        let status = if status.is_deleted() {
            ReleaseStatus::Released
        } else {
            ReleaseStatus::NotOwned
        };
        debug!(key = %self.key, token = %self.token, ?status, "lock released");
        Ok(status)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "lock guard dropped outside a runtime, leaving lock to expire");
            return;
        };
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let token = self.token.clone();
        runtime.spawn(async move {
            match store.delete_if_equals(&key, token.as_bytes()).await {
                Ok(status) => debug!(key, %token, released = status.is_deleted(), "dropped lock guard released"),
                Err(err) => warn!(key, error = %err, "failed to release dropped lock guard, it will expire"),
            }
        });
    }
}
