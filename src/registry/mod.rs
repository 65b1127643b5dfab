/*!
 * Reference-Counted Registry
 *
 * Concurrent key -> value map where every value carries a reference count.
 * Values are created on first reference and disposed when the last
 * reference is released.
 *
 * # Concurrency
 *
 * Entries are immutable `Arc<RegistryEntry>` snapshots. Every update is an
 * optimistic compare-and-replace against the snapshot the caller observed
 * (pointer identity), retried from a fresh read on conflict. The registry
 * adds no lock of its own; contention windows are a single slot swap.
 *
 * Factories and disposal callbacks always run outside the map's shard locks,
 * so they may freely call back into the registry.
 */

mod entry;

use entry::RegistryEntry;

use crate::config::RegistryConfig;
use crate::errors::{ConfigurationError, RegistryError};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::{self, Debug};
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

type Factory<K, V> = Box<dyn Fn(&K) -> V + Send + Sync>;
type Dispose<V> = Box<dyn Fn(V) + Send + Sync>;
type Slot<V> = Arc<RegistryEntry<V>>;

/// Ref-counted registry with caller-supplied creation and disposal
///
/// # Contract
///
/// Every successful [`get`](Self::get) must be paired with exactly one
/// [`release`](Self::release). Releasing a key with no outstanding
/// reference fails with [`RegistryError::ProtocolViolation`].
///
/// # Example
///
/// ```ignore
/// let registry = RefCountedRegistry::new(|key: &u32| Arc::new(load(*key)), |_value| {});
///
/// let a = registry.get(&7);   // factory runs
/// let b = registry.get(&7);   // same value, refcount 2
/// registry.release(&7)?;
/// registry.release(&7)?;      // refcount 0: entry removed, disposal runs
/// ```
pub struct RefCountedRegistry<K, V, S = RandomState> {
    entries: DashMap<K, Slot<V>, S>,
    factory: Factory<K, V>,
    dispose: Dispose<V>,
}

impl<K, V> RefCountedRegistry<K, V, RandomState>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// Create a registry with default map configuration
    pub fn new<F, D>(factory: F, dispose: D) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
        D: Fn(V) + Send + Sync + 'static,
    {
        Self::build(&RegistryConfig::default(), RandomState::new(), factory, dispose)
    }

    /// Create a registry with explicit map configuration
    pub fn with_config<F, D>(
        config: RegistryConfig,
        factory: F,
        dispose: D,
    ) -> Result<Self, ConfigurationError>
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
        D: Fn(V) + Send + Sync + 'static,
    {
        Self::with_config_and_hasher(config, RandomState::new(), factory, dispose)
    }
}

impl<K, V, S> RefCountedRegistry<K, V, S>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Create a registry with explicit map configuration and key hasher
    ///
    /// Key equality is the key type's `Eq`; wrap keys in a newtype to change it.
    pub fn with_config_and_hasher<F, D>(
        config: RegistryConfig,
        hasher: S,
        factory: F,
        dispose: D,
    ) -> Result<Self, ConfigurationError>
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
        D: Fn(V) + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self::build(&config, hasher, factory, dispose))
    }

    /// Build from an already validated configuration
    pub(crate) fn build<F, D>(config: &RegistryConfig, hasher: S, factory: F, dispose: D) -> Self
    where
        F: Fn(&K) -> V + Send + Sync + 'static,
        D: Fn(V) + Send + Sync + 'static,
    {
        let entries = match config.shard_amount {
            Some(shards) => DashMap::with_capacity_and_hasher_and_shard_amount(
                config.initial_capacity,
                hasher,
                shards,
            ),
            None => DashMap::with_capacity_and_hasher(config.initial_capacity, hasher),
        };

        Self {
            entries,
            factory: Box::new(factory),
            dispose: Box::new(dispose),
        }
    }

    /// Get the value for `key`, creating it if absent, and take a reference
    ///
    /// Never suspends. Under contention the factory may run more than once for
    /// the same key; only one result is ever returned and the rest are
    /// disposed immediately.
    pub fn get(&self, key: &K) -> V {
        loop {
            match self.snapshot(key) {
                Some(current) => {
                    let value = current.value().clone();
                    if self.compare_and_replace(key, &current, current.retained()) {
                        trace!(?key, refcount = current.refcount() + 1, "Registry entry retained");
                        return value;
                    }
                    trace!(?key, "Lost increment race, retrying");
                }
                None => {
                    let created = (self.factory)(key);

                    let orphan = match self.entries.entry(key.clone()) {
                        Entry::Vacant(slot) => {
                            slot.insert(Arc::new(RegistryEntry::first(created.clone())));
                            debug!(?key, "Registry entry created");
                            return created;
                        }
                        Entry::Occupied(_) => created,
                    };

                    // Shard lock is released; another caller inserted first
                    debug!(?key, "Lost insert race, disposing orphaned value");
                    (self.dispose)(orphan);
                }
            }
        }
    }

    /// Drop one reference to `key`
    ///
    /// Removes the entry and runs the disposal callback when the last
    /// reference goes away.
    pub fn release(&self, key: &K) -> Result<(), RegistryError> {
        loop {
            let Some(current) = self.snapshot(key) else {
                warn!(?key, "Release without outstanding reference");
                return Err(RegistryError::ProtocolViolation {
                    key: format!("{:?}", key),
                });
            };

            match current.released() {
                None => {
                    if self.compare_and_remove(key, &current) {
                        debug!(?key, "Registry entry evicted");
                        (self.dispose)(current.value().clone());
                        return Ok(());
                    }
                }
                Some(next) => {
                    if self.compare_and_replace(key, &current, next) {
                        trace!(?key, refcount = current.refcount() - 1, "Registry entry released");
                        return Ok(());
                    }
                }
            }
            trace!(?key, "Lost release race, retrying");
        }
    }

    /// Release called from a context that cannot propagate errors
    ///
    /// A failure here means a reference was double-released.
    pub(crate) fn release_detached(&self, key: &K) {
        if let Err(err) = self.release(key) {
            error!(?key, error = %err, "Registry release failed");
            debug_assert!(false, "{}", err);
        }
    }

    /// Current value for `key` without taking a reference
    pub fn peek(&self, key: &K) -> Option<V> {
        self.snapshot(key).map(|entry| entry.value().clone())
    }

    /// Current reference count for `key`
    pub fn ref_count(&self, key: &K) -> Option<usize> {
        self.snapshot(key).map(|entry| entry.refcount())
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of live keys
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone out the current entry; the shard guard is dropped before returning
    #[inline]
    fn snapshot(&self, key: &K) -> Option<Slot<V>> {
        self.entries.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// Swap in `next` only if the slot still holds `observed`
    fn compare_and_replace(&self, key: &K, observed: &Slot<V>, next: RegistryEntry<V>) -> bool {
        match self.entries.get_mut(key) {
            Some(mut slot) if Arc::ptr_eq(slot.value(), observed) => {
                *slot.value_mut() = Arc::new(next);
                true
            }
            _ => false,
        }
    }

    /// Remove the slot only if it still holds `observed`
    fn compare_and_remove(&self, key: &K, observed: &Slot<V>) -> bool {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(current, observed))
            .is_some()
    }
}

impl<K, V, S> Debug for RefCountedRegistry<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCountedRegistry")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}
