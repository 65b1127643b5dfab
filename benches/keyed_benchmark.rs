/*!
 * Keyed Lock Benchmarks
 *
 * Uncontended fast paths, key churn with and without pooling, and
 * contended acquisition across tasks
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keyed_locks::{ExclusiveLock, KeyedExclusiveLock, KeyedLockConfig, ReaderWriterLock};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap()
}

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");

    let exclusive = ExclusiveLock::new();
    group.bench_function("exclusive_try_acquire", |b| {
        b.iter(|| black_box(exclusive.try_acquire()))
    });

    let rwlock = ReaderWriterLock::new();
    group.bench_function("rwlock_try_reader", |b| {
        b.iter(|| black_box(rwlock.try_reader_lock()))
    });

    let keyed = KeyedExclusiveLock::new();
    group.bench_function("keyed_try_acquire", |b| {
        b.iter(|| black_box(keyed.try_acquire(black_box(7u64))))
    });

    group.finish();
}

fn bench_key_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_churn");

    for pool_size in [0usize, 64] {
        let config = KeyedLockConfig::default().with_max_pool_size(pool_size);
        let locks = KeyedExclusiveLock::with_config(config).unwrap();
        let mut next = 0u64;

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("pool_{}", pool_size)),
            &pool_size,
            |b, _| {
                b.iter(|| {
                    next = next.wrapping_add(1);
                    black_box(locks.try_acquire(next))
                });
            },
        );
    }

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("contended");

    for keys in [1u64, 16] {
        let locks = Arc::new(KeyedExclusiveLock::new());

        group.bench_with_input(BenchmarkId::new("keys", keys), &keys, |b, &keys| {
            b.to_async(&rt).iter(|| {
                let locks = Arc::clone(&locks);
                async move {
                    let tasks: Vec<_> = (0..32u64)
                        .map(|i| {
                            let locks = Arc::clone(&locks);
                            tokio::spawn(async move {
                                let _guard = locks.acquire(i % keys).await.unwrap();
                                tokio::task::yield_now().await;
                            })
                        })
                        .collect();
                    for task in tasks {
                        task.await.unwrap();
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_key_churn, bench_contended);
criterion_main!(benches);
