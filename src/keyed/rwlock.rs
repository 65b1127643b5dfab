/*!
 * Keyed Reader/Writer Lock
 * One writer-preferring reader/writer lock per key, recycled through a pool
 */

use super::{log_timeout, waited_ms, KeyedCore, LockKey};
use crate::config::KeyedLockConfig;
use crate::errors::{ConfigurationError, LockError, Result};
use crate::locks::{LockStatus, ReaderWriterLock, RwLockGuard};
use crate::pool::PoolStats;
use ahash::RandomState;
use std::fmt;
use std::future::Future;
use std::hash::BuildHasher;
use std::time::Duration;

/// Per-key async reader/writer lock
///
/// Each key behaves as an independent [`ReaderWriterLock`]: writer
/// preference, FIFO writers, batched reader admission.
///
/// # Example
///
/// ```ignore
/// let locks = KeyedReaderWriterLock::new();
///
/// let r = locks.reader_lock("config").await;
/// let r2 = locks.reader_lock("config").await; // shared
/// drop((r, r2));
/// let w = locks.writer_lock("config").await;  // exclusive
/// ```
pub struct KeyedReaderWriterLock<K, S = RandomState> {
    core: KeyedCore<K, ReaderWriterLock, S>,
}

impl<K: LockKey> KeyedReaderWriterLock<K, RandomState> {
    pub fn new() -> Self {
        Self {
            core: KeyedCore::build(KeyedLockConfig::default(), RandomState::new()),
        }
    }

    pub fn with_config(config: KeyedLockConfig) -> std::result::Result<Self, ConfigurationError> {
        Self::with_config_and_hasher(config, RandomState::new())
    }
}

impl<K: LockKey> Default for KeyedReaderWriterLock<K, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> KeyedReaderWriterLock<K, S>
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

    /// Shared hold on `key`
    pub async fn reader_lock(&self, key: K) -> RwLockGuard {
        let (lock, lease) = self.core.lease(&key);
        let guard = lock.reader_lock().await;
        lease.disarm();
        guard
    }

    /// Exclusive hold on `key`
    pub async fn writer_lock(&self, key: K) -> RwLockGuard {
        let (lock, lease) = self.core.lease(&key);
        let guard = lock.writer_lock().await;
        lease.disarm();
        guard
    }

    pub fn try_reader_lock(&self, key: K) -> Option<RwLockGuard> {
        let (lock, lease) = self.core.lease(&key);
        let guard = lock.try_reader_lock()?;
        lease.disarm();
        Some(guard)
    }

    pub fn try_writer_lock(&self, key: K) -> Option<RwLockGuard> {
        let (lock, lease) = self.core.lease(&key);
        let guard = lock.try_writer_lock()?;
        lease.disarm();
        Some(guard)
    }

    /// [`reader_lock`](Self::reader_lock) bounded by `timeout`
    pub async fn reader_lock_timeout(&self, key: K, timeout: Duration) -> Result<RwLockGuard> {
        Self::bounded(&key, timeout, self.reader_lock(key.clone())).await
    }

    /// [`writer_lock`](Self::writer_lock) bounded by `timeout`
    pub async fn writer_lock_timeout(&self, key: K, timeout: Duration) -> Result<RwLockGuard> {
        Self::bounded(&key, timeout, self.writer_lock(key.clone())).await
    }

    async fn bounded<F>(key: &K, timeout: Duration, acquire: F) -> Result<RwLockGuard>
    where
        F: Future<Output = RwLockGuard>,
    {
        tokio::time::timeout(timeout, acquire).await.map_err(|_| {
            log_timeout(key, timeout);
            LockError::Timeout {
                waited_ms: waited_ms(timeout),
            }
        })
    }

    /// State of `key`'s lock; `Unheld` when the key has no live lock
    pub fn status(&self, key: &K) -> LockStatus {
        self.core
            .peek(key)
            .map_or(LockStatus::Unheld, |lock| lock.status())
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

impl<K, S> fmt::Debug for KeyedReaderWriterLock<K, S>
where
    K: LockKey,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedReaderWriterLock")
            .field("active_keys", &self.active_keys())
            .field("pool", &self.pool_stats())
            .finish()
    }
}
