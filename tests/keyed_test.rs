/*!
 * Keyed Lock Integration Tests
 *
 * Per-key exclusion, key independence, registry/pool lifecycle, timeouts
 */

use keyed_locks::{
    ConfigurationError, KeyedExclusiveLock, KeyedLockConfig, KeyedReaderWriterLock, LockError,
    LockStatus, RegistryConfig,
};
use std::collections::hash_map::RandomState as StdRandomState;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_pending, assert_ready, task};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const KEYS: u32 = 8;
const TASKS: usize = 64;
const ROUNDS: usize = 100;

fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("keyed_locks=debug"))
        .with(tracing_subscriber::fmt::layer().compact().with_test_writer())
        .try_init();
}

#[test]
fn test_keyed_exclusive_scenario() {
    init_test_tracing();
    let locks = KeyedExclusiveLock::new();

    // A obtains "x" immediately
    let mut a = task::spawn(locks.acquire("x"));
    let a = assert_ready!(a.poll()).unwrap();

    // B waits on "x"
    let mut b = task::spawn(locks.acquire("x"));
    assert_pending!(b.poll());

    // C on "y" is independent of A
    let mut c = task::spawn(locks.acquire("y"));
    let c = assert_ready!(c.poll()).unwrap();

    drop(a);
    assert!(b.is_woken());
    let b = assert_ready!(b.poll()).unwrap();
    assert!(locks.is_locked(&"x"));
    assert!(locks.is_locked(&"y"));

    drop(b);
    drop(c);
    assert_eq!(locks.active_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_keyed_exclusive_under_load() {
    init_test_tracing();
    let config = KeyedLockConfig::default().with_max_pool_size(2);
    let locks = Arc::new(KeyedExclusiveLock::with_config(config).unwrap());
    let inside: Arc<Vec<AtomicUsize>> = Arc::new((0..KEYS).map(|_| AtomicUsize::new(0)).collect());
    let completed = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for task_id in 0..TASKS {
        let locks = Arc::clone(&locks);
        let inside = Arc::clone(&inside);
        let completed = Arc::clone(&completed);

        handles.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let key = ((task_id + round) as u32) % KEYS;
                let _guard = locks.acquire(key).await.unwrap();

                let slot = &inside[key as usize];
                assert_eq!(slot.fetch_add(1, Ordering::SeqCst), 0, "two holders of key {key}");
                tokio::task::yield_now().await;
                slot.fetch_sub(1, Ordering::SeqCst);

                completed.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(completed.load(Ordering::Relaxed), TASKS * ROUNDS);
    assert_eq!(locks.active_keys(), 0);

    let stats = locks.pool_stats();
    assert!(stats.idle <= 2);
    assert_eq!(stats.hits + stats.misses, stats.recycled + stats.discarded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_keyed_rwlock_under_load() {
    let locks = Arc::new(KeyedReaderWriterLock::new());
    let inside: Arc<Vec<AtomicI64>> = Arc::new((0..KEYS).map(|_| AtomicI64::new(0)).collect());
    let mut handles = vec![];

    for task_id in 0..TASKS {
        let locks = Arc::clone(&locks);
        let inside = Arc::clone(&inside);

        handles.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let key = ((task_id * 7 + round) as u32) % KEYS;
                let slot = &inside[key as usize];

                if round % 5 == 0 {
                    let _guard = locks.writer_lock(key).await;
                    assert_eq!(slot.swap(-1, Ordering::SeqCst), 0);
                    tokio::task::yield_now().await;
                    slot.store(0, Ordering::SeqCst);
                } else {
                    let _guard = locks.reader_lock(key).await;
                    assert!(slot.fetch_add(1, Ordering::SeqCst) >= 0);
                    tokio::task::yield_now().await;
                    slot.fetch_sub(1, Ordering::SeqCst);
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(locks.active_keys(), 0);
    for key in 0..KEYS {
        assert_eq!(locks.status(&key), LockStatus::Unheld);
    }
}

#[tokio::test]
async fn test_acquire_timeout_leaves_no_reference() {
    let locks = KeyedExclusiveLock::new();
    let held = locks.acquire("slow".to_string()).await.unwrap();

    let err = locks
        .acquire_timeout("slow".to_string(), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(err, LockError::Timeout { waited_ms: 20 });
    assert_eq!(locks.ref_count(&"slow".to_string()), 1);

    drop(held);
    assert_eq!(locks.active_keys(), 0);

    let guard = locks
        .acquire_timeout("slow".to_string(), Duration::from_millis(20))
        .await
        .unwrap();
    drop(guard);
    assert_eq!(locks.active_keys(), 0);
}

#[tokio::test]
async fn test_rw_timeouts() {
    let locks = KeyedReaderWriterLock::new();
    let writer = locks.writer_lock(1u8).await;

    assert!(matches!(
        locks.reader_lock_timeout(1, Duration::from_millis(10)).await,
        Err(LockError::Timeout { .. })
    ));
    assert!(matches!(
        locks.writer_lock_timeout(1, Duration::from_millis(10)).await,
        Err(LockError::Timeout { .. })
    ));
    assert_eq!(locks.ref_count(&1), 1);

    drop(writer);
    let reader = locks
        .reader_lock_timeout(1, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(locks.status(&1), LockStatus::ReadHeld(1));
    drop(reader);
    assert_eq!(locks.active_keys(), 0);
}

#[test]
fn test_custom_hasher_and_config() {
    let config = KeyedLockConfig::default().with_registry(RegistryConfig {
        initial_capacity: 64,
        shard_amount: Some(16),
    });
    let locks: KeyedExclusiveLock<u64, StdRandomState> =
        KeyedExclusiveLock::with_config_and_hasher(config, StdRandomState::new()).unwrap();

    let guard = locks.try_acquire(42).unwrap();
    assert!(locks.try_acquire(42).is_none());
    assert!(locks.try_acquire(43).is_some());
    drop(guard);
    assert_eq!(locks.active_keys(), 0);
}

#[test]
fn test_invalid_config_rejected() {
    let config = KeyedLockConfig::default().with_registry(RegistryConfig {
        initial_capacity: 0,
        shard_amount: Some(12),
    });

    assert_eq!(
        KeyedReaderWriterLock::<u32>::with_config(config).unwrap_err(),
        ConfigurationError::InvalidShardAmount(12)
    );
}

#[test]
fn test_pooling_disabled() {
    let locks = KeyedReaderWriterLock::with_config(KeyedLockConfig::low_memory()).unwrap();

    for key in 0..4u32 {
        locks.try_writer_lock(key).unwrap().release();
    }

    let stats = locks.pool_stats();
    assert_eq!(stats.capacity, 0);
    assert_eq!(stats.misses, 4);
    assert_eq!(stats.discarded, 4);
}
