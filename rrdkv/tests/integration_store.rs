//! Integration tests for the store lifecycle: open, create, reload, close,
//! and rejection of corrupt databases.

use redb::{Database, TableDefinition};
use rrdkv::codec::{DESCRIPTOR_KEY, encode_timestamp};
use rrdkv::{ConnectionError, DataError, ParamsError, RrdError, Store};
use tempfile::tempdir;

const RAW_TABLE_NAME: &str = "broken";

/// Writes a table directly through redb, bypassing the store.
fn write_raw_table(path: &std::path::Path, name: &str, entries: &[(&[u8], &[u8])]) {
    let db = Database::create(path).unwrap();
    let txn = db.begin_write().unwrap();
    {
        let mut table = txn
            .open_table(TableDefinition::<&[u8], &[u8]>::new(name))
            .unwrap();
        for (key, value) in entries {
            table.insert(*key, *value).unwrap();
        }
    }
    txn.commit().unwrap();
}

#[test]
fn test_full_store_lifecycle() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("lifecycle.redb");
    let base_time = 1_700_000_000i64;

    // Phase 1: create buckets and write some samples
    {
        let mut store = Store::open(&db_path).unwrap();
        let cpu = store.create_bucket("cpu", 1, 600, &["usr", "sys"]).unwrap();
        let net = store.create_bucket("net", 10, 6, &["in", "out"]).unwrap();

        for i in 0..60u32 {
            let ts = base_time + i64::from(i);
            cpu.write_at(ts, &[f64::from(i % 100), 1.0]).unwrap();
        }
        for i in 0..6u32 {
            let ts = base_time + i64::from(i) * 10;
            net.write_at(ts, &[f64::from(i), 0.0]).unwrap();
        }

        store.close().unwrap();
    }

    // Phase 2: reopen and verify buckets and data persisted
    {
        let store = Store::open(&db_path).unwrap();

        let mut names = store.list_buckets().unwrap();
        names.sort();
        assert_eq!(names, vec!["cpu", "net"]);

        let cpu = store.bucket("cpu");
        assert_eq!(cpu.sample_count().unwrap(), 60);

        let stats = cpu.get_stats(base_time, base_time + 60, 60).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats.datasets[0].data, vec![29.5]);
        assert_eq!(stats.datasets[1].data, vec![1.0]);
    }
}

#[test]
fn test_reload_reproduces_descriptors() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("reload.redb");

    let mut store = Store::open(&db_path).unwrap();
    store.create_bucket("testing", 2, 5, &["a", "b"]).unwrap();
    store.create_bucket("temp", 60, 1440, &["celsius"]).unwrap();
    let before: Vec<_> = ["testing", "temp"]
        .iter()
        .map(|name| store.bucket(name).descriptor().cloned().unwrap())
        .collect();
    store.close().unwrap();

    let store = Store::open(&db_path).unwrap();
    let after: Vec<_> = ["testing", "temp"]
        .iter()
        .map(|name| store.bucket(name).descriptor().cloned().unwrap())
        .collect();

    assert_eq!(before, after);
    assert_eq!(store.list_buckets().unwrap().len(), 2);
}

#[test]
fn test_duplicate_bucket_survives_reload() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("dup.redb");

    let mut store = Store::open(&db_path).unwrap();
    store.create_bucket("testing", 2, 5, &["a"]).unwrap();
    store.close().unwrap();

    let store = Store::open(&db_path).unwrap();
    assert!(matches!(
        store.create_bucket("testing", 1, 1, &["b"]),
        Err(RrdError::Params(ParamsError::BucketExists { .. }))
    ));
    assert_eq!(store.bucket("testing").descriptor().unwrap().step, 2);
}

#[test]
fn test_missing_descriptor_fails_open() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("missing.redb");

    {
        let store = Store::open(&db_path).unwrap();
        store.create_bucket("healthy", 1, 10, &["a"]).unwrap();
    }
    let key = encode_timestamp(1_700_000_000);
    let entries = [(key.as_slice(), b"1".as_slice())];
    write_raw_table(&db_path, RAW_TABLE_NAME, &entries);

    match Store::open(&db_path) {
        Err(RrdError::Data(DataError::MissingDescriptor { bucket })) => {
            assert_eq!(bucket, RAW_TABLE_NAME);
        }
        other => panic!("Expected MissingDescriptor error, got: {other:?}"),
    }
}

#[test]
fn test_zero_capacity_descriptor_fails_open() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("zero.redb");

    {
        let store = Store::open(&db_path).unwrap();
        store.create_bucket("healthy", 1, 10, &["a"]).unwrap();
    }
    let descriptor = br#"{"step":1,"capacity":0,"data_sources":["a"]}"#;
    let entries = [(DESCRIPTOR_KEY, descriptor.as_slice())];
    write_raw_table(&db_path, RAW_TABLE_NAME, &entries);

    match Store::open(&db_path) {
        Err(RrdError::Data(DataError::InvalidDescriptor { bucket, .. })) => {
            assert_eq!(bucket, RAW_TABLE_NAME);
        }
        other => panic!("Expected InvalidDescriptor error, got: {other:?}"),
    }
}

#[test]
fn test_garbage_descriptor_fails_open() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("garbage.redb");

    let entries = [(DESCRIPTOR_KEY, b"{ invalid json }".as_slice())];
    write_raw_table(&db_path, RAW_TABLE_NAME, &entries);

    let err = Store::open(&db_path).unwrap_err();
    assert!(matches!(
        err,
        RrdError::Data(DataError::MalformedDescriptor { .. })
    ));
    assert!(err.to_string().contains(RAW_TABLE_NAME));
}

#[test]
fn test_open_unreachable_path() {
    let result = Store::open("/asfkajd/kskd.redb");
    assert!(matches!(
        result,
        Err(RrdError::Connection(ConnectionError::Open { .. }))
    ));
}

#[test]
fn test_operations_after_close() {
    let temp_dir = tempdir().unwrap();
    let mut store = Store::open(temp_dir.path().join("closed.redb")).unwrap();
    store.create_bucket("cpu", 1, 10, &["a"]).unwrap();
    store.close().unwrap();

    let bucket = store.bucket("cpu");
    assert!(bucket.exists());
    assert!(bucket.save(&[1.0]).unwrap_err().is_connection());
    assert!(bucket.get_stats(0, 10, 1).unwrap_err().is_connection());
    assert!(store.list_buckets().unwrap_err().is_connection());
    assert!(store.close().unwrap_err().is_connection());
}
