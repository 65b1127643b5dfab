/*!
 * Exclusive Lock
 * Async binary mutex with a non-suspending fast path
 */

use super::hook::{HookSlot, ReleaseHook};
use super::traits::Recyclable;
use crate::errors::{LockError, Result};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Async mutual-exclusion lock
///
/// Modeled as a counting semaphore with a single permit. Waiters are granted
/// eventually and one at a time; no stricter ordering is promised.
///
/// # Performance
///
/// - **Uncontended**: one atomic CAS, no waiter allocation
/// - **Contended**: the caller suspends; its thread is free for other tasks
///
/// # Example
///
/// ```ignore
/// let lock = ExclusiveLock::new();
/// let guard = lock.acquire().await?;
/// // critical section
/// drop(guard); // or guard.release()
/// ```
#[derive(Clone)]
pub struct ExclusiveLock {
    inner: Arc<ExclusiveInner>,
}

struct ExclusiveInner {
    permit: Arc<Semaphore>,
    hook: HookSlot,
}

impl ExclusiveLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ExclusiveInner {
                permit: Arc::new(Semaphore::new(1)),
                hook: HookSlot::default(),
            }),
        }
    }

    /// Wait until the lock is free, then take it
    ///
    /// Fails only with [`LockError::Closed`] after [`teardown`](Recyclable::teardown).
    /// Dropping the returned future before it completes takes nothing.
    pub async fn acquire(&self) -> Result<ExclusiveGuard> {
        if let Some(guard) = self.try_acquire() {
            return Ok(guard);
        }

        trace!("Exclusive lock contended, waiting");
        let permit = Arc::clone(&self.inner.permit)
            .acquire_owned()
            .await
            .map_err(|_| LockError::Closed)?;
        Ok(self.guard(permit))
    }

    /// Take the lock only if it is free right now
    pub fn try_acquire(&self) -> Option<ExclusiveGuard> {
        Arc::clone(&self.inner.permit)
            .try_acquire_owned()
            .ok()
            .map(|permit| self.guard(permit))
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.inner.permit.available_permits() == 0
    }

    #[inline]
    fn guard(&self, permit: OwnedSemaphorePermit) -> ExclusiveGuard {
        ExclusiveGuard {
            lock: Arc::clone(&self.inner),
            permit: Some(permit),
        }
    }
}

impl Default for ExclusiveLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExclusiveLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveLock")
            .field("held", &self.is_held())
            .field("leased", &self.inner.hook.is_bound())
            .finish()
    }
}

impl Recyclable for ExclusiveLock {
    fn create() -> Self {
        Self::new()
    }

    fn set_release_hook(&self, hook: ReleaseHook) {
        self.inner.hook.bind(hook);
    }

    fn clear_release_hook(&self) -> bool {
        self.inner.hook.clear()
    }

    fn is_leased(&self) -> bool {
        self.inner.hook.is_bound()
    }

    fn is_idle(&self) -> bool {
        !self.is_held()
    }

    fn teardown(self) {
        debug_assert!(!self.is_held(), "teardown of a held exclusive lock");
        debug_assert!(!self.is_leased(), "teardown of a leased exclusive lock");
        self.inner.permit.close();
    }
}

/// Scoped hold on an [`ExclusiveLock`]
///
/// Dropping the guard releases the lock exactly once, then fires the
/// lock's release hook.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct ExclusiveGuard {
    lock: Arc<ExclusiveInner>,
    permit: Option<OwnedSemaphorePermit>,
}

impl ExclusiveGuard {
    /// Release explicitly; equivalent to dropping the guard
    #[inline]
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        // State transition first, then the hook
        drop(self.permit.take());
        self.lock.hook.fire();
    }
}

impl fmt::Debug for ExclusiveGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveGuard").finish_non_exhaustive()
    }
}
