//! Microbenchmarks for the write path and range queries.
//!
//! Run with: `cargo bench -p rrdkv`

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rrdkv::Store;
use tempfile::tempdir;

const BASE: i64 = 1_700_000_000;

/// Creates a store with one bucket holding `capacity` one-second samples.
fn setup_store(capacity: u32, sources: &[&str]) -> (Store, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let store = Store::open(temp_dir.path().join("bench.redb")).unwrap();
    store.create_bucket("bench", 1, capacity, sources).unwrap();

    let readings = vec![1.0; sources.len()];
    let bucket = store.bucket("bench");
    for i in 0..capacity {
        bucket.write_at(BASE + i64::from(i), &readings).unwrap();
    }

    (store, temp_dir)
}

fn bench_write_at(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_at/sources");

    for sources in [&["a"][..], &["a", "b", "c", "d"][..]] {
        let (store, _dir) = setup_store(600, sources);
        let bucket = store.bucket("bench");
        let readings = vec![42.5; sources.len()];
        let mut ts = BASE + 600;

        group.bench_with_input(
            BenchmarkId::from_parameter(sources.len()),
            &sources.len(),
            |b, _| {
                b.iter(|| {
                    ts += 1;
                    bucket
                        .write_at(black_box(ts), black_box(&readings))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_get_stats(c: &mut Criterion) {
    let (store, _dir) = setup_store(3600, &["in", "out"]);
    let bucket = store.bucket("bench");
    let mut group = c.benchmark_group("get_stats");

    // Full hour in one-minute windows.
    group.bench_function("aggregate/60s", |b| {
        b.iter(|| {
            bucket
                .get_stats(black_box(BASE), black_box(BASE + 3600), 60)
                .unwrap()
        });
    });

    // Full hour at the native step.
    group.bench_function("aggregate/1s", |b| {
        b.iter(|| {
            bucket
                .get_stats(black_box(BASE), black_box(BASE + 3600), 1)
                .unwrap()
        });
    });

    group.finish();

    let (store, _dir) = setup_store(600, &["in", "out"]);
    store
        .create_bucket("coarse", 10, 600, &["in", "out"])
        .unwrap();
    let coarse = store.bucket("coarse");
    for i in 0..600u32 {
        coarse
            .write_at(BASE + i64::from(i) * 10, &[f64::from(i), 0.0])
            .unwrap();
    }

    c.bench_function("get_stats/interpolate/1s", |b| {
        b.iter(|| {
            coarse
                .get_stats(black_box(BASE), black_box(BASE + 600), 1)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_write_at, bench_get_stats);
criterion_main!(benches);
