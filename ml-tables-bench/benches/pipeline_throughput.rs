//! Sequential against parallel pipeline throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ml_tables_bench::{pipeline, synthetic_rows};

fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");
    let rows = 20_000;
    group.throughput(Throughput::Elements(rows as u64));
    let source = synthetic_rows(rows, 16);

    for concurrency in [1usize, 2, 4, 8] {
        let lazy = pipeline(&source, concurrency);
        group.bench_with_input(BenchmarkId::new("workers", concurrency), &lazy, |b, lazy| {
            b.iter(|| black_box(lazy.collect().unwrap().len()));
        });
    }

    group.finish();
}

fn bench_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_transform");
    let source = synthetic_rows(20_000, 16);

    for size in [64usize, 1024, 8192] {
        let lazy = source.batch_transform(size, Ok);
        group.bench_with_input(BenchmarkId::new("size", size), &lazy, |b, lazy| {
            b.iter(|| black_box(lazy.count().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_collect, bench_batches);
criterion_main!(benches);
