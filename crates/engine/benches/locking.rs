use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use davis_core::{Depth, LockDepth, LockRequest, LockScope, ResourcePath};
use davis_engine::{InMemoryLockManager, LockManager, LockManagerConfig, PropFindHandler};
use davis_store::{MemoryStore, StaticHost};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Manager holding `n` shared locks spread over a two-level hierarchy.
fn populated(n: usize) -> InMemoryLockManager {
    let manager = InMemoryLockManager::new(LockManagerConfig::default()).unwrap();
    for i in 0..n {
        let path = format!("/d{}/f{}", i % 32, i);
        manager.lock(LockRequest::new(path, LockScope::Shared, LockDepth::Zero));
    }
    manager
}

fn wide_store(children: usize) -> MemoryStore {
    (0..children)
        .fold(MemoryStore::builder().collection("/root"), |b, i| {
            b.document(&format!("/root/f{i}"), vec![b'x'; 256])
        })
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Benchmark: grant + release against a populated table
// ---------------------------------------------------------------------------

fn bench_grant_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("grant_release");
    for size in [100, 1_000, 10_000] {
        let manager = populated(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &manager, |b, manager| {
            b.iter(|| {
                let result = manager.lock(LockRequest::new(
                    "/d7/new",
                    LockScope::Exclusive,
                    LockDepth::Zero,
                ));
                let lock = result.lock().unwrap();
                manager.release(&lock.path, &lock.state_token).unwrap();
                black_box(result)
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: depth-infinity conflict scan
// ---------------------------------------------------------------------------

fn bench_infinity_conflicts(c: &mut Criterion) {
    let mut group = c.benchmark_group("infinity_conflicts");
    for size in [100, 1_000, 10_000] {
        let manager = populated(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &manager, |b, manager| {
            b.iter(|| {
                black_box(manager.lock(LockRequest::new(
                    "/d3",
                    LockScope::Exclusive,
                    LockDepth::Infinity,
                )))
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: PROPFIND depth 1
// ---------------------------------------------------------------------------

fn bench_propfind(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let host = Arc::new(StaticHost::parse("http://localhost/").unwrap());
    let root = ResourcePath::new("/root");

    let mut group = c.benchmark_group("propfind_depth_one");
    for children in [10, 100, 1_000] {
        let handler = PropFindHandler::new(Arc::new(wide_store(children)), host.clone());
        group.bench_with_input(
            BenchmarkId::from_parameter(children),
            &handler,
            |b, handler| {
                b.to_async(&rt).iter(|| async {
                    black_box(handler.handle(&root, None, Depth::One).await.unwrap())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_grant_release,
    bench_infinity_conflicts,
    bench_propfind,
);
criterion_main!(benches);
