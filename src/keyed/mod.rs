/*!
 * Keyed Locks
 *
 * One logical lock per caller key, multiplexed over pooled lock instances.
 *
 * # Architecture
 *
 * ```text
 * acquire(key) ──> RefCountedRegistry::get(key) ──miss──> factory:
 *                        │                                 pool.lease()
 *                        │                                 bind hook -> registry.release(key)
 *                        ▼
 *                  live lock for key ──> lock.acquire() ──> guard
 *
 * drop(guard) ──> lock release ──> hook ──> registry.release(key)
 *                                              │ refcount 0
 *                                              ▼
 *                                  clear hook, pool.recycle(lock)
 * ```
 *
 * Each outstanding guard owns exactly one registry reference. An acquisition
 * abandoned mid-wait returns its reference through [`Lease`].
 */

mod exclusive;
mod rwlock;

pub use exclusive::KeyedExclusiveLock;
pub use rwlock::KeyedReaderWriterLock;

use crate::config::KeyedLockConfig;
use crate::errors::ConfigurationError;
use crate::locks::{Recyclable, ReleaseHook};
use crate::pool::{LockPool, PoolStats};
use crate::registry::RefCountedRegistry;
use std::fmt::Debug;
use std::hash::{BuildHasher, Hash};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error};

/// Bounds shared by every keyed lock key
pub trait LockKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> LockKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Registry + pool wiring shared by both keyed facades
pub(crate) struct KeyedCore<K, L, S> {
    registry: Arc<RefCountedRegistry<K, L, S>>,
    pool: Arc<LockPool<L>>,
}

impl<K, L, S> KeyedCore<K, L, S>
where
    K: LockKey,
    L: Recyclable,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(config: KeyedLockConfig, hasher: S) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self::build(config, hasher))
    }

    /// Wire registry and pool from an already validated configuration
    pub(crate) fn build(config: KeyedLockConfig, hasher: S) -> Self {
        let pool: Arc<LockPool<L>> = Arc::new(LockPool::new(config.max_pool_size));
        let lease_pool = Arc::clone(&pool);
        let return_pool = Arc::clone(&pool);

        let registry = Arc::new_cyclic(|this: &Weak<RefCountedRegistry<K, L, S>>| {
            let this = this.clone();
            RefCountedRegistry::build(
                &config.registry,
                hasher,
                move |key: &K| {
                    let lock = lease_pool.lease();
                    // Always upgradable: the factory only runs inside get()
                    match this.upgrade() {
                        Some(registry) => {
                            let key = key.clone();
                            lock.set_release_hook(ReleaseHook::new(move || {
                                registry.release_detached(&key)
                            }));
                        }
                        None => {
                            error!(?key, "Registry gone while leasing a lock; release hook unbound");
                            debug_assert!(false, "keyed lock factory ran without a live registry");
                        }
                    }
                    lock
                },
                move |lock: L| {
                    lock.clear_release_hook();
                    return_pool.recycle(lock);
                },
            )
        });

        Self { registry, pool }
    }

    /// Take a registry reference for `key` and return its live lock
    pub(crate) fn lease<'a>(&'a self, key: &'a K) -> (L, Lease<'a, K, L, S>) {
        let lock = self.registry.get(key);
        (
            lock,
            Lease {
                registry: &self.registry,
                key,
                armed: true,
            },
        )
    }

    pub(crate) fn peek(&self, key: &K) -> Option<L> {
        self.registry.peek(key)
    }

    pub(crate) fn active_keys(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn ref_count(&self, key: &K) -> usize {
        self.registry.ref_count(key).unwrap_or(0)
    }

    pub(crate) fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

/// Registry reference not yet owned by a guard
///
/// Released on drop unless [`disarm`](Self::disarm)ed once a guard exists;
/// from then on the lock's release hook owns it.
pub(crate) struct Lease<'a, K, L, S>
where
    K: LockKey,
    L: Recyclable,
    S: BuildHasher + Clone,
{
    registry: &'a RefCountedRegistry<K, L, S>,
    key: &'a K,
    armed: bool,
}

impl<K, L, S> Lease<'_, K, L, S>
where
    K: LockKey,
    L: Recyclable,
    S: BuildHasher + Clone,
{
    #[inline]
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl<K, L, S> Drop for Lease<'_, K, L, S>
where
    K: LockKey,
    L: Recyclable,
    S: BuildHasher + Clone,
{
    fn drop(&mut self) {
        if self.armed {
            self.registry.release_detached(self.key);
        }
    }
}

#[inline]
pub(crate) fn waited_ms(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[inline]
pub(crate) fn log_timeout<K: Debug>(key: &K, timeout: Duration) {
    debug!(?key, timeout_ms = waited_ms(timeout), "Keyed lock acquisition timed out");
}
