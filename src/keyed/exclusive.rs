/*!
 * Keyed Exclusive Lock
 * One async mutex per key, recycled through a pool
 */

use super::{log_timeout, waited_ms, KeyedCore, LockKey};
use crate::config::KeyedLockConfig;
use crate::errors::{ConfigurationError, LockError, Result};
use crate::locks::{ExclusiveGuard, ExclusiveLock};
use crate::pool::PoolStats;
use ahash::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::time::Duration;

/// Per-key async mutual exclusion
///
/// Operations on different keys never contend with each other. A key's lock
/// exists only while some caller holds or waits for it.
///
/// # Example
///
/// ```ignore
/// let locks = KeyedExclusiveLock::new();
///
/// let guard = locks.acquire("account:42".to_string()).await?;
/// // "account:42" is held; other keys are unaffected
/// drop(guard);
/// ```
pub struct KeyedExclusiveLock<K, S = RandomState> {
    core: KeyedCore<K, ExclusiveLock, S>,
}

impl<K: LockKey> KeyedExclusiveLock<K, RandomState> {
    pub fn new() -> Self {
        Self {
            core: KeyedCore::build(KeyedLockConfig::default(), RandomState::new()),
        }
    }

    pub fn with_config(config: KeyedLockConfig) -> std::result::Result<Self, ConfigurationError> {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<K: LockKey> Default for KeyedExclusiveLock<K, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> KeyedExclusiveLock<K, S>
where
    K: LockKey,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    /// Key equality is `K: Eq`; `hasher` controls key hashing
    pub fn with_config_and_hasher(
        config: KeyedLockConfig,
        hasher: S,
    ) -> std::result::Result<Self, ConfigurationError> {
        Ok(Self {
            core: KeyedCore::new(config, hasher)?,
        })
    }

    /// Wait until `key` is free, then hold it
    ///
    /// Dropping the returned future before completion holds nothing and
    /// leaves no registry reference behind.
    pub async fn acquire(&self, key: K) -> Result<ExclusiveGuard> {
        let (lock, lease) = self.core.lease(&key);
        let guard = lock.acquire().await?;
        lease.disarm();
        Ok(guard)
    }

    /// Hold `key` only if it is free right now
    pub fn try_acquire(&self, key: K) -> Option<ExclusiveGuard> {
        let (lock, lease) = self.core.lease(&key);
        let guard = lock.try_acquire()?;
        lease.disarm();
        Some(guard)
    }

    /// [`acquire`](Self::acquire) bounded by `timeout`
    pub async fn acquire_timeout(&self, key: K, timeout: Duration) -> Result<ExclusiveGuard> {
        match tokio::time::timeout(timeout, self.acquire(key.clone())).await {
            Ok(acquired) => acquired,
            Err(_) => {
                log_timeout(&key, timeout);
                Err(LockError::Timeout {
                    waited_ms: waited_ms(timeout),
                })
            }
        }
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.core.peek(key).is_some_and(|lock| lock.is_held())
    }

    /// Outstanding guards plus waiters for `key`
    pub fn ref_count(&self, key: &K) -> usize {
        self.core.ref_count(key)
    }

    /// Keys with a live lock
    pub fn active_keys(&self) -> usize {
        self.core.active_keys()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.core.pool_stats()
    }
}

impl<K, S> fmt::Debug for KeyedExclusiveLock<K, S>
where
    K: LockKey,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedExclusiveLock")
            .field("active_keys", &self.active_keys())
            .field("pool", &self.pool_stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_same_key_serializes() {
        let locks = KeyedExclusiveLock::new();

        let a = locks.try_acquire("x").unwrap();
        assert!(locks.is_locked(&"x"));

        let mut b = task::spawn(locks.acquire("x"));
        assert_pending!(b.poll());
        assert_eq!(locks.ref_count(&"x"), 2);

        drop(a);
        let b = assert_ready!(b.poll()).unwrap();
        assert_eq!(locks.ref_count(&"x"), 1);

        drop(b);
        assert_eq!(locks.active_keys(), 0);
        assert!(!locks.is_locked(&"x"));
    }

    #[test]
    fn test_independent_keys() {
        let locks = KeyedExclusiveLock::new();

        let _x = locks.try_acquire(1u64).unwrap();
        let mut y = task::spawn(locks.acquire(2u64));
        let _y = assert_ready!(y.poll()).unwrap();
        assert_eq!(locks.active_keys(), 2);
    }

    #[test]
    fn test_failed_try_returns_reference() {
        let locks = KeyedExclusiveLock::new();

        let held = locks.try_acquire("k").unwrap();
        assert!(locks.try_acquire("k").is_none());
        assert_eq!(locks.ref_count(&"k"), 1);

        drop(held);
        assert_eq!(locks.active_keys(), 0);
    }

    #[test]
    fn test_instances_recycled() {
        let locks = KeyedExclusiveLock::new();

        locks.try_acquire("a").unwrap().release();
        locks.try_acquire("b").unwrap().release();

        let stats = locks.pool_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.idle, 1);
    }
}
