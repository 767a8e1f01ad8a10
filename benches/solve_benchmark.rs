//! Benchmarks for the thread launcher against the reference solver.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use dknap::catalog::{Item, ItemCatalog};
use dknap::config::{QueryMode, SolveConfig};
use dknap::launch::solve_in_threads;
use dknap::reference;

/// A fixed catalog with a spread of weights.
fn catalog() -> ItemCatalog {
    ItemCatalog::new(
        (1..=8)
            .map(|i| Item::new(i * 3 + 1, (i * i * 7) as u64))
            .collect(),
    )
}

fn bench_reference(c: &mut Criterion) {
    let items = catalog();
    let mut group = c.benchmark_group("reference");

    for target in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(target), &target, |b, &target| {
            b.iter(|| black_box(reference::solve(&items, black_box(target)).unwrap()));
        });
    }

    group.finish();
}

fn bench_threads(c: &mut Criterion) {
    let items = catalog();
    let mut group = c.benchmark_group("threads");
    group.sample_size(20);

    for world_size in [2usize, 4, 8] {
        for mode in [QueryMode::Retry, QueryMode::Deferred] {
            let config = SolveConfig::new(world_size).with_query_mode(mode);
            let id = BenchmarkId::new(mode.to_string(), world_size);
            group.bench_with_input(id, &config, |b, config| {
                b.iter(|| black_box(solve_in_threads(&items, black_box(500), config).unwrap()));
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_reference, bench_threads);
criterion_main!(benches);
