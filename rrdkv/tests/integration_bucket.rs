//! Integration tests for the bucket write path: arity checks, eviction and
//! concurrent access.

use rrdkv::{ParamsError, RrdError, Store};
use tempfile::tempdir;

const BASE: i64 = 1_700_000_000;

#[test]
fn test_save_uses_current_time() {
    let temp_dir = tempdir().unwrap();
    let store = Store::open(temp_dir.path().join("now.redb")).unwrap();
    let bucket = store.create_bucket("now", 1, 10, &["v"]).unwrap();

    let before = chrono::Utc::now().timestamp();
    bucket.save(&[42.0]).unwrap();
    let after = chrono::Utc::now().timestamp();

    let samples = bucket.samples(before, after + 1).unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].1, vec![42.0]);
}

#[test]
fn test_arity_always_checked() {
    let temp_dir = tempdir().unwrap();
    let store = Store::open(temp_dir.path().join("arity.redb")).unwrap();
    let one = store.create_bucket("one", 1, 10, &["a"]).unwrap();
    let three = store.create_bucket("abc", 1, 10, &["a", "b", "c"]).unwrap();

    for (bucket, good) in [(&one, 1usize), (&three, 3)] {
        for len in 0..6usize {
            let readings = vec![1.0; len];
            let ts = BASE + i64::try_from(len).unwrap();
            let result = bucket.write_at(ts, &readings);
            if len == good {
                result.unwrap();
            } else {
                assert!(matches!(
                    result,
                    Err(RrdError::Params(ParamsError::WrongArity { .. }))
                ));
            }
        }
    }
}

#[test]
fn test_capacity_never_exceeded() {
    let temp_dir = tempdir().unwrap();
    let store = Store::open(temp_dir.path().join("capacity.redb")).unwrap();
    let bucket = store.create_bucket("b", 2, 5, &["v"]).unwrap();

    // Regular cadence, bursts, pauses and out-of-order writes.
    let offsets = [
        0, 2, 4, 6, 8, 10, 12, 13, 14, 15, 16, 17, 100, 101, 50, 102, 103, 104, 105, 106, 5000,
        5002, 4999,
    ];
    for (i, offset) in offsets.iter().enumerate() {
        let value = f64::from(u32::try_from(i).unwrap());
        bucket.write_at(BASE + offset, &[value]).unwrap();
        let count = bucket.sample_count().unwrap();
        assert!(count <= 5, "{count} samples after write {i}");
    }
}

#[test]
fn test_steady_writes_keep_full_window() {
    let temp_dir = tempdir().unwrap();
    let store = Store::open(temp_dir.path().join("steady.redb")).unwrap();
    let bucket = store.create_bucket("b", 2, 5, &["v"]).unwrap();

    for i in 0..20u32 {
        bucket
            .write_at(BASE + i64::from(i) * 2, &[f64::from(i)])
            .unwrap();
    }

    let samples = bucket.samples(BASE, BASE + 100).unwrap();
    let values: Vec<f64> = samples.iter().map(|(_, v)| v[0]).collect();
    assert_eq!(values, vec![15.0, 16.0, 17.0, 18.0, 19.0]);
}

#[test]
fn test_negative_and_digit_boundary_timestamps() {
    let temp_dir = tempdir().unwrap();
    let store = Store::open(temp_dir.path().join("order.redb")).unwrap();
    let bucket = store.create_bucket("b", 1, 100, &["v"]).unwrap();

    let timestamps = [999_999_998, -5, 1_000_000_001, 0, 99, -100, 100];
    for ts in timestamps {
        #[allow(clippy::cast_precision_loss)]
        bucket.write_at(ts, &[ts as f64]).unwrap();
    }

    let stored: Vec<i64> = bucket
        .samples(i64::MIN, i64::MAX)
        .unwrap()
        .into_iter()
        .map(|(t, _)| t)
        .collect();
    assert_eq!(
        stored,
        vec![-100, -5, 0, 99, 100, 999_999_998, 1_000_000_001]
    );
}

#[test]
fn test_concurrent_writer_and_readers() {
    let temp_dir = tempdir().unwrap();
    let store = Store::open(temp_dir.path().join("shared.redb")).unwrap();
    store.create_bucket("shared", 1, 10, &["a", "b"]).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let bucket = store.bucket("shared");
            for i in 0..200u32 {
                bucket
                    .write_at(BASE + i64::from(i), &[f64::from(i), 1.0])
                    .unwrap();
            }
        });

        for _ in 0..3 {
            scope.spawn(|| {
                let bucket = store.bucket("shared");
                for _ in 0..50 {
                    let stats = bucket.get_stats(BASE, BASE + 200, 1).unwrap();
                    assert!(stats.len() <= 10);
                    assert!(stats.datasets[1].data.iter().all(|&v| v == 1.0));
                }
            });
        }
    });

    assert_eq!(store.bucket("shared").sample_count().unwrap(), 10);
}
