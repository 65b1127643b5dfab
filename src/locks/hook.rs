/*!
 * Release Hooks
 * Callback fired by a lock after each guard release
 */

use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::Arc;

/// Callback invoked once per guard release, after the lock state transition
///
/// Keyed locks bind one of these per lease to drive the registry decrement.
pub struct ReleaseHook {
    callback: Box<dyn Fn() + Send + Sync>,
}

impl ReleaseHook {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    #[inline]
    fn fire(&self) {
        (self.callback)()
    }
}

impl fmt::Debug for ReleaseHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReleaseHook")
    }
}

/// Lock-free slot holding the currently bound hook
///
/// A bound hook means the lock is leased to a key.
#[derive(Default)]
pub(crate) struct HookSlot {
    slot: ArcSwapOption<ReleaseHook>,
}

impl HookSlot {
    /// Bind a hook, replacing any previous one
    #[inline]
    pub(crate) fn bind(&self, hook: ReleaseHook) {
        let previous = self.slot.swap(Some(Arc::new(hook)));
        debug_assert!(previous.is_none(), "release hook bound twice");
    }

    /// Unbind the hook; returns whether one was bound
    #[inline]
    pub(crate) fn clear(&self) -> bool {
        self.slot.swap(None).is_some()
    }

    #[inline]
    pub(crate) fn is_bound(&self) -> bool {
        self.slot.load().is_some()
    }

    /// Fire the bound hook, if any
    ///
    /// Runs on a private `Arc` clone, so the hook may clear this slot while
    /// it executes.
    #[inline]
    pub(crate) fn fire(&self) {
        if let Some(hook) = self.slot.load_full() {
            hook.fire();
        }
    }
}
