/*!
 * Keyed Locks
 *
 * In-process async synchronization primitives:
 * - `ExclusiveLock` and `ReaderWriterLock` for single resources
 * - `KeyedExclusiveLock` and `KeyedReaderWriterLock` for one logical lock
 *   per key, multiplexed over pooled lock instances
 * - `RefCountedRegistry`, the ref-counted map backing the keyed locks
 *
 * Acquisition suspends the calling task, never the thread. Every hold is a
 * guard; dropping it releases the lock exactly once.
 */

pub mod config;
pub mod errors;
pub mod keyed;
pub mod locks;
pub mod pool;
pub mod registry;

// Re-exports
pub use config::{KeyedLockConfig, RegistryConfig, DEFAULT_MAX_POOL_SIZE};
pub use errors::{ConfigurationError, LockError, RegistryError, Result};
pub use keyed::{KeyedExclusiveLock, KeyedReaderWriterLock, LockKey};
pub use locks::{
    ExclusiveGuard, ExclusiveLock, LockKind, LockStatus, ReaderWriterLock, Recyclable,
    ReleaseHook, RwLockGuard,
};
pub use pool::{LockPool, PoolStats};
pub use registry::RefCountedRegistry;
