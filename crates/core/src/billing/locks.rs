//! Keyed async locks with acquisition timeout.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::error::BillingError;

type LockMap = Arc<DashMap<Uuid, Arc<Mutex<()>>>>;

/// One mutex per key, created on first use and dropped with its last guard.
///
/// Acquisition gives up after `timeout` with a retryable `LockTimeout`
/// instead of waiting forever.
#[derive(Debug, Clone)]
pub struct LockRegistry {
    resource: &'static str,
    locks: LockMap,
    timeout: Duration,
}

/// Holds the lock on one key. Dropping it releases the lock and forgets the
/// key once nobody else holds or waits for it.
#[derive(Debug)]
pub struct KeyGuard {
    key: Uuid,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so our own reference is not counted below.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl LockRegistry {
    /// Creates a registry for one lock family, e.g. `"invoice"`.
    #[must_use]
    pub fn new(resource: &'static str, timeout: Duration) -> Self {
        Self {
            resource,
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Waits for the lock on `key`.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` when the lock is still held after the timeout.
    pub async fn acquire(&self, key: Uuid) -> Result<KeyGuard, BillingError> {
        // Clone the mutex out so the shard guard is released before awaiting.
        let lock = {
            let entry = self.locks.entry(key).or_default();
            Arc::clone(entry.value())
        };

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(KeyGuard {
                key,
                locks: Arc::clone(&self.locks),
                guard: Some(guard),
            }),
            Err(_) => {
                // The future owned the only clone we had; forget the key if
                // the holder is already gone.
                self.locks
                    .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
                tracing::warn!(resource = self.resource, key = %key, "Lock acquisition timed out");
                Err(BillingError::LockTimeout {
                    resource: self.resource,
                    key,
                })
            }
        }
    }

    /// Number of keys currently held or waited for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no key is held or waited for.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
