/*!
 * Reader/Writer Lock
 *
 * Async reader/writer lock with writer preference and batched reader wake-up.
 *
 * # Writer-Preference Fairness
 *
 * | Scenario                  | Behavior                                      |
 * |---------------------------|-----------------------------------------------|
 * | No writers queued         | Readers acquire immediately                   |
 * | Writer queued             | New readers wait until the writer queue drains |
 * | Readers hold + writer     | Writer waits for the last reader              |
 * | Multiple writers          | Writers queue in arrival order (FIFO)         |
 *
 * Readers that arrive while the lock cannot be granted share one pending
 * batch. When the last queued writer releases, the whole batch is admitted
 * at once rather than one reader at a time.
 *
 * Sustained writer pressure can starve readers. That is the accepted cost
 * of bounding writer latency.
 *
 * # Cancellation
 *
 * Dropping a pending `reader_lock()`/`writer_lock()` future is safe: a
 * waiter that was already handed the lock gives it back, and one that was
 * not leaves its queue. The release hook fires only for guard releases.
 */

use super::hook::{HookSlot, ReleaseHook};
use super::traits::Recyclable;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::trace;

const UNHELD: i64 = 0;
const WRITE_HELD: i64 = -1;

/// Kind of hold a guard represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    Reader,
    Writer,
}

/// Snapshot of a reader/writer lock's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "readers", rename_all = "snake_case")]
pub enum LockStatus {
    Unheld,
    WriteHeld,
    ReadHeld(usize),
}

/// Readers waiting to be admitted together
struct ReaderBatch {
    id: u64,
    count: usize,
    admit: oneshot::Sender<()>,
    signal: Shared<BoxFuture<'static, ()>>,
}

impl ReaderBatch {
    fn new(id: u64) -> Self {
        let (admit, admitted) = oneshot::channel();
        Self {
            id,
            count: 0,
            admit,
            signal: admitted.map(|_| ()).boxed().shared(),
        }
    }
}

/// Bookkeeping guarded by the state mutex
///
/// `status`: `0` unheld, `-1` one writer, `n > 0` readers.
struct RwState {
    status: i64,
    writers: VecDeque<oneshot::Sender<()>>,
    readers: Option<ReaderBatch>,
    next_batch: u64,
}

impl RwState {
    fn new() -> Self {
        Self {
            status: UNHELD,
            writers: VecDeque::new(),
            readers: None,
            next_batch: 0,
        }
    }

    #[inline]
    fn admits_reader(&self) -> bool {
        self.status >= 0 && self.writers.is_empty()
    }

    /// Add a reader to the pending batch, creating it if needed
    fn join_readers(&mut self) -> (u64, Shared<BoxFuture<'static, ()>>) {
        let next_batch = &mut self.next_batch;
        let batch = self.readers.get_or_insert_with(|| {
            let id = *next_batch;
            *next_batch = next_batch.wrapping_add(1);
            ReaderBatch::new(id)
        });
        batch.count += 1;
        (batch.id, batch.signal.clone())
    }

    /// Grant a free lock to the next waiter: head writer first, then the
    /// whole reader batch.
    ///
    /// Writers whose futures were dropped are skipped.
    fn hand_off(&mut self) {
        while let Some(writer) = self.writers.pop_front() {
            if writer.send(()).is_ok() {
                self.status = WRITE_HELD;
                return;
            }
        }
        self.admit_readers_or_free();
    }

    fn admit_readers_or_free(&mut self) {
        match self.readers.take() {
            Some(batch) => {
                self.status = batch.count as i64;
                trace!(readers = batch.count, "Admitting reader batch");
                let _ = batch.admit.send(());
            }
            None => self.status = UNHELD,
        }
    }

    fn release_reader(&mut self) {
        debug_assert!(self.status > 0, "reader release while not read-held");
        self.status -= 1;
        if self.status == UNHELD {
            self.hand_off();
        }
    }

    fn release_writer(&mut self) {
        debug_assert_eq!(self.status, WRITE_HELD, "writer release while not write-held");
        self.hand_off();
    }

    /// Drop queued writers whose futures are gone, then admit readers that
    /// were only waiting behind them.
    fn prune_writers(&mut self) {
        self.writers.retain(|writer| !writer.is_closed());
        if self.writers.is_empty() && self.status >= 0 {
            if let Some(batch) = self.readers.take() {
                self.status += batch.count as i64;
                let _ = batch.admit.send(());
            }
        }
    }
}

struct RwInner {
    state: Mutex<RwState>,
    hook: HookSlot,
}

impl RwInner {
    fn release(&self, kind: LockKind) {
        {
            let mut state = self.state.lock();
            match kind {
                LockKind::Reader => state.release_reader(),
                LockKind::Writer => state.release_writer(),
            }
        }
        // Never under the state mutex: the hook may re-enter this lock
        self.hook.fire();
    }
}

/// Async reader/writer lock
///
/// # Example
///
/// ```ignore
/// let lock = ReaderWriterLock::new();
///
/// let r1 = lock.reader_lock().await;
/// let r2 = lock.reader_lock().await;  // shared
/// drop((r1, r2));
///
/// let w = lock.writer_lock().await;   // exclusive
/// ```
#[derive(Clone)]
pub struct ReaderWriterLock {
    inner: Arc<RwInner>,
}

impl ReaderWriterLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwInner {
                state: Mutex::new(RwState::new()),
                hook: HookSlot::default(),
            }),
        }
    }

    /// Acquire a shared hold
    ///
    /// Granted immediately unless a writer holds the lock or is queued;
    /// otherwise joins the pending reader batch.
    pub async fn reader_lock(&self) -> RwLockGuard {
        let (batch_id, signal) = {
            let mut state = self.inner.state.lock();
            if state.admits_reader() {
                state.status += 1;
                return self.guard(LockKind::Reader);
            }
            state.join_readers()
        };

        trace!(batch = batch_id, "Reader waiting for batch admission");
        let mut waiter = PendingReader {
            inner: &self.inner,
            batch_id,
            admitted: false,
        };
        signal.await;
        waiter.admitted = true;

        self.guard(LockKind::Reader)
    }

    /// Acquire an exclusive hold
    ///
    /// Granted immediately if unheld; otherwise queues behind earlier writers.
    pub async fn writer_lock(&self) -> RwLockGuard {
        let grant = {
            let mut state = self.inner.state.lock();
            if state.status == UNHELD {
                state.status = WRITE_HELD;
                return self.guard(LockKind::Writer);
            }
            let (tx, rx) = oneshot::channel();
            state.writers.push_back(tx);
            trace!(queued = state.writers.len(), "Writer queued");
            rx
        };

        let mut waiter = PendingWriter {
            inner: &self.inner,
            grant,
            granted: false,
        };
        let handed_over = (&mut waiter.grant).await;
        // Senders are only dropped unsent once their receiver is closed
        debug_assert!(handed_over.is_ok(), "writer grant channel dropped");
        waiter.granted = true;

        self.guard(LockKind::Writer)
    }

    /// Shared hold only if grantable without waiting
    pub fn try_reader_lock(&self) -> Option<RwLockGuard> {
        let mut state = self.inner.state.lock();
        if state.admits_reader() {
            state.status += 1;
            drop(state);
            Some(self.guard(LockKind::Reader))
        } else {
            None
        }
    }

    /// Exclusive hold only if the lock is free right now
    pub fn try_writer_lock(&self) -> Option<RwLockGuard> {
        let mut state = self.inner.state.lock();
        if state.status == UNHELD {
            state.status = WRITE_HELD;
            drop(state);
            Some(self.guard(LockKind::Writer))
        } else {
            None
        }
    }

    pub fn status(&self) -> LockStatus {
        match self.inner.state.lock().status {
            UNHELD => LockStatus::Unheld,
            WRITE_HELD => LockStatus::WriteHeld,
            readers => LockStatus::ReadHeld(readers as usize),
        }
    }

    /// Writers waiting in the FIFO queue
    pub fn queued_writers(&self) -> usize {
        self.inner.state.lock().writers.len()
    }

    /// Readers waiting in the pending batch
    pub fn pending_readers(&self) -> usize {
        self.inner
            .state
            .lock()
            .readers
            .as_ref()
            .map_or(0, |batch| batch.count)
    }

    #[inline]
    fn guard(&self, kind: LockKind) -> RwLockGuard {
        RwLockGuard {
            lock: Arc::clone(&self.inner),
            kind,
        }
    }
}

impl Default for ReaderWriterLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReaderWriterLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderWriterLock")
            .field("status", &self.status())
            .field("queued_writers", &self.queued_writers())
            .field("pending_readers", &self.pending_readers())
            .finish()
    }
}

impl Recyclable for ReaderWriterLock {
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
        let state = self.inner.state.lock();
        state.status == UNHELD && state.writers.is_empty() && state.readers.is_none()
    }
}

/// Reader parked in a pending batch
struct PendingReader<'a> {
    inner: &'a RwInner,
    batch_id: u64,
    admitted: bool,
}

impl Drop for PendingReader<'_> {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }

        let mut state = self.inner.state.lock();
        if let Some(batch) = state.readers.as_mut() {
            if batch.id == self.batch_id {
                batch.count -= 1;
                if batch.count == 0 {
                    state.readers = None;
                }
                return;
            }
        }

        // Batch was admitted before this future observed it
        trace!(batch = self.batch_id, "Returning read hold from dropped waiter");
        state.release_reader();
    }
}

/// Writer parked in the FIFO queue
struct PendingWriter<'a> {
    inner: &'a RwInner,
    grant: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for PendingWriter<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }

        // After close() no new grant can arrive; one that already did is ours
        self.grant.close();
        let mut state = self.inner.state.lock();
        if self.grant.try_recv().is_ok() {
            trace!("Returning write hold from dropped waiter");
            state.release_writer();
        } else {
            state.prune_writers();
        }
    }
}

/// Scoped hold on a [`ReaderWriterLock`]
///
/// Dropping the guard releases the hold exactly once, then fires the lock's
/// release hook.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct RwLockGuard {
    lock: Arc<RwInner>,
    kind: LockKind,
}

impl RwLockGuard {
    #[inline]
    pub fn kind(&self) -> LockKind {
        self.kind
    }

    /// Release explicitly; equivalent to dropping the guard
    #[inline]
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RwLockGuard {
    fn drop(&mut self) {
        self.lock.release(self.kind);
    }
}

impl fmt::Debug for RwLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RwLockGuard")
            .field("kind", &self.kind)
            .finish()
    }
}
