/*!
 * Lock Traits
 *
 * Seam between lock primitives and the keyed lock pools
 */

use super::hook::ReleaseHook;

/// A lock that can be leased to a key, returned, and leased again
///
/// Implementations are cheap handles (clones share one lock). The pool and
/// keyed facades only see this trait.
///
/// # Lease protocol
///
/// 1. `create()` or take an idle instance from the pool
/// 2. `set_release_hook()` binds it to a key (now leased)
/// 3. guards fire the hook after every release
/// 4. `clear_release_hook()` once the key's last reference is gone
/// 5. back to the pool, or `teardown()` if the pool is full
pub trait Recyclable: Clone + Send + Sync + 'static {
    /// Allocate a fresh, unheld instance
    fn create() -> Self;

    /// Bind the hook fired after each guard release
    fn set_release_hook(&self, hook: ReleaseHook);

    /// Unbind the hook; returns whether one was bound
    fn clear_release_hook(&self) -> bool;

    /// Whether a hook is currently bound
    fn is_leased(&self) -> bool;

    /// Unheld with no waiters
    fn is_idle(&self) -> bool;

    /// Release native wait resources. Never called while held or contended.
    fn teardown(self) {}
}
