//! Store-backed mutual exclusion
//!
//! A lock is a key written with set-if-absent and an expiry. The value is a
//! random token; only the holder of that token can release the key.

use crate::error::{Error, Result};
use crate::store::SharedStore;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Interval between acquisition attempts
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Distributed lock over a [`CoordinationStore`](crate::store::CoordinationStore)
#[derive(Clone)]
pub struct DistributedLock {
    store: SharedStore,
    poll_interval: Duration,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("backend", &self.store.backend())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl DistributedLock {
    /// Create a lock manager on `store`
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            poll_interval: LOCK_POLL_INTERVAL,
        }
    }

    /// Set the polling interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn key(name: &str) -> String {
        format!("lock:{}", name)
    }

    /// Try to take `name` for `ttl`, polling until `timeout` elapses
    ///
    /// Returns the holder token, or `None` when the lock stayed taken.
    /// A store failure ends the attempt as not acquired.
    pub async fn acquire(&self, name: &str, ttl: Duration, timeout: Duration) -> Option<String> {
        let key = Self::key(name);
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = Instant::now() + timeout;

        loop {
            match self.store.set_nx_ex(&key, &token, ttl).await {
                Ok(true) => {
                    debug!(lock = %name, "Lock acquired");
                    return Some(token);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(lock = %name, error = %e, "Lock acquisition failed");
                    return None;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(lock = %name, "Lock not acquired before timeout");
                return None;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Like [`acquire`](Self::acquire) but reports a timeout as an error
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockNotAcquired`] when the lock stayed taken
    pub async fn acquire_or_err(&self, name: &str, ttl: Duration, timeout: Duration) -> Result<String> {
        self.acquire(name, ttl, timeout)
            .await
            .ok_or_else(|| Error::LockNotAcquired {
                name: name.to_string(),
            })
    }

    /// Release `name` if it is still held with `token`
    ///
    /// A mismatched or missing token leaves the key alone and returns `false`.
    pub async fn release(&self, name: &str, token: &str) -> bool {
        match self.store.compare_and_delete(&Self::key(name), token).await {
            Ok(released) => {
                debug!(lock = %name, released = released, "Lock release");
                released
            }
            Err(e) => {
                warn!(lock = %name, error = %e, "Lock release failed");
                false
            }
        }
    }
}
