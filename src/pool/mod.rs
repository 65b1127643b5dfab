/*!
 * Lock Pool
 * Bounded bag of idle lock instances recycled across keys
 */

use crate::locks::Recyclable;
use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Pool of idle locks of one type
///
/// # Performance
///
/// - **Lease / recycle**: lock-free, one queue operation each
/// - **Memory**: at most `capacity` idle instances retained
/// - **Best for**: high key churn, where allocating a fresh lock per key
///   would dominate
pub struct LockPool<L> {
    idle: Option<ArrayQueue<L>>,
    hits: AtomicU64,
    misses: AtomicU64,
    recycled: AtomicU64,
    discarded: AtomicU64,
}

impl<L: Recyclable> LockPool<L> {
    /// Create a pool retaining up to `capacity` idle locks (`0` disables pooling)
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: (capacity > 0).then(|| ArrayQueue::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Take an idle lock, or allocate a new one
    pub fn lease(&self) -> L {
        match self.idle.as_ref().and_then(ArrayQueue::pop) {
            Some(lock) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!("Leased lock from pool");
                lock
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                L::create()
            }
        }
    }

    /// Return a lock whose hook has been cleared
    ///
    /// Tears it down instead when the pool is full.
    pub fn recycle(&self, lock: L) {
        debug_assert!(!lock.is_leased(), "recycling a lock that is still leased");
        debug_assert!(lock.is_idle(), "recycling a lock that is held or contended");

        let rejected = match self.idle.as_ref() {
            Some(idle) => idle.push(lock).err(),
            None => Some(lock),
        };

        match rejected {
            None => {
                self.recycled.fetch_add(1, Ordering::Relaxed);
            }
            Some(lock) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                debug!(capacity = self.capacity(), "Pool full, discarding lock");
                lock.teardown();
            }
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.idle.as_ref().map_or(0, ArrayQueue::capacity)
    }

    /// Idle locks currently held by the pool
    #[inline]
    pub fn len(&self) -> usize {
        self.idle.as_ref().map_or(0, ArrayQueue::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            idle: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

impl<L> fmt::Debug for LockPool<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockPool")
            .field("capacity", &self.idle.as_ref().map_or(0, ArrayQueue::capacity))
            .field("idle", &self.idle.as_ref().map_or(0, ArrayQueue::len))
            .finish_non_exhaustive()
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    /// Leases served from the pool
    pub hits: u64,
    /// Leases that allocated a new lock
    pub misses: u64,
    pub recycled: u64,
    /// Locks torn down because the pool was full
    pub discarded: u64,
}

impl PoolStats {
    /// Fraction of leases served from the pool
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
