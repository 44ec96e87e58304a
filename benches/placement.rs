//! Benchmark for the placement engine (component C8)
//!
//! Target: sub-microsecond selection even at cluster-scale candidate counts.

use accel_fabric_driver::allocation::{PlacementCandidate, PlacementEngine, PlacementPolicy};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn candidates(n: usize) -> Vec<PlacementCandidate> {
    (0..n)
        .map(|i| PlacementCandidate {
            uid: format!("gpu-{i:05}"),
            used_millicores: (i as u32 * 37) % 1000,
            capacity_millicores: 1000,
        })
        .collect()
}

fn bench_select_none(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement");
    group.throughput(Throughput::Elements(1));

    let pool = candidates(256);
    group.bench_function("select_none_256", |b| {
        b.iter(|| PlacementEngine::select(black_box(&pool), black_box(8), PlacementPolicy::None));
    });

    group.finish();
}

fn bench_select_balanced(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement");
    group.throughput(Throughput::Elements(1));

    let pool = candidates(256);
    group.bench_function("select_balanced_256", |b| {
        b.iter(|| PlacementEngine::select(black_box(&pool), black_box(8), PlacementPolicy::Balanced));
    });

    group.finish();
}

fn bench_select_packed_large_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("placement");
    group.throughput(Throughput::Elements(1));

    let pool = candidates(4096);
    group.bench_function("select_packed_4096", |b| {
        b.iter(|| PlacementEngine::select(black_box(&pool), black_box(8), PlacementPolicy::Packed));
    });

    group.finish();
}

criterion_group!(benches, bench_select_none, bench_select_balanced, bench_select_packed_large_pool);
criterion_main!(benches);
