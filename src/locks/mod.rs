/*!
 * Async Lock Primitives
 *
 * Single-instance locks that suspend callers instead of blocking threads:
 * - `ExclusiveLock`: binary mutex, semaphore-backed
 * - `ReaderWriterLock`: writer-preferring, batch-admits readers
 *
 * Both hand out guards whose drop releases exactly once and then fires an
 * optional release hook. Keyed locks use the hook to return registry
 * references; see `crate::keyed`.
 */

mod exclusive;
mod hook;
mod rwlock;
mod traits;

pub use exclusive::{ExclusiveGuard, ExclusiveLock};
pub use hook::ReleaseHook;
pub use rwlock::{LockKind, LockStatus, ReaderWriterLock, RwLockGuard};
pub use traits::Recyclable;
