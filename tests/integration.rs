//! Integration tests for the public `Store` API.
//!
//! These tests exercise the full stack (memtable → SSTable → compaction)
//! through the public `silt::{Store, StoreConfig, StoreError}` surface only.
//! No internal modules are referenced.
//!
//! ## Coverage areas
//! - **Lifecycle**: open, close, idempotent close, Drop-based flush
//! - **CRUD**: put, get, delete, overwrite, empty values, nonexistent keys
//! - **Scan**: range bounds, inverted ranges, tombstone filtering
//! - **Persistence**: data and deletes survive close → reopen
//! - **Compaction**: merges tables, drops deleted keys, survives reopen
//! - **Crash cleanup**: staged and unpaired files are discarded on open
//! - **Concurrency**: multi-thread writes, readers during writes

use silt::{Store, StoreConfig, StoreError};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Small write buffer to trigger frequent rotations and background flushes.
fn small_buffer_config() -> StoreConfig {
    StoreConfig {
        flush_threshold_bytes: 1024,
    }
}

/// Reopen a store at the same path with default config.
fn reopen(path: &std::path::Path) -> Store {
    Store::open(path).expect("reopen")
}

// ================================================================================================
// Lifecycle
// ================================================================================================

#[test]
fn open_and_close_empty_store() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    store.close().unwrap();
    store.close().unwrap();
}

#[test]
fn open_creates_missing_directory() {
    let tmp = TempDir::new().unwrap();
    let nested = tmp.path().join("a/b/store");
    let store = Store::open(&nested).unwrap();
    store.put("key", "value").unwrap();
    assert!(nested.is_dir());
}

#[test]
fn operations_after_close_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    store.close().unwrap();

    assert!(matches!(store.put("k", "v"), Err(StoreError::Closed)));
    assert!(matches!(store.get(b"k"), Err(StoreError::Closed)));
}

#[test]
fn drop_persists_buffered_writes() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(tmp.path()).unwrap();
        store.put("written", "before-drop").unwrap();
    }

    let store = reopen(tmp.path());
    assert_eq!(store.get(b"written").unwrap(), Some(b"before-drop".to_vec()));
}

// ================================================================================================
// CRUD
// ================================================================================================

#[test]
fn put_get_delete_cycle() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    store.put("user:1", "alice").unwrap();
    store.put("user:2", "bob").unwrap();
    assert_eq!(store.get(b"user:1").unwrap(), Some(b"alice".to_vec()));

    store.delete("user:1").unwrap();
    assert_eq!(store.get(b"user:1").unwrap(), None);
    assert_eq!(store.get(b"user:2").unwrap(), Some(b"bob".to_vec()));
}

#[test]
fn overwrite_keeps_latest_value() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    for i in 0..10 {
        store.put("counter", format!("{i}")).unwrap();
    }
    assert_eq!(store.get(b"counter").unwrap(), Some(b"9".to_vec()));
}

#[test]
fn empty_value_is_distinct_from_deleted() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    store.put("present-but-empty", "").unwrap();
    store.put("deleted", "x").unwrap();
    store.delete("deleted").unwrap();
    store.flush().unwrap();

    assert_eq!(store.get(b"present-but-empty").unwrap(), Some(Vec::new()));
    assert_eq!(store.get(b"deleted").unwrap(), None);
}

#[test]
fn delete_then_recreate_key() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    store.put("phoenix", "first-life").unwrap();
    store.flush().unwrap();
    store.delete("phoenix").unwrap();
    store.flush().unwrap();
    store.put("phoenix", "second-life").unwrap();

    assert_eq!(store.get(b"phoenix").unwrap(), Some(b"second-life".to_vec()));

    // The recreation survives another flush and a compaction.
    store.flush().unwrap();
    store.compact().unwrap();
    assert_eq!(store.get(b"phoenix").unwrap(), Some(b"second-life".to_vec()));
}

// ================================================================================================
// Scan
// ================================================================================================

#[test]
fn scan_returns_sorted_live_pairs() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    store.put("cherry", "3").unwrap();
    store.put("apple", "1").unwrap();
    store.put("banana", "2").unwrap();
    store.delete("banana").unwrap();

    let got: Vec<_> = store.scan(None, None).unwrap().collect();
    assert_eq!(
        got,
        vec![
            (b"apple".to_vec(), b"1".to_vec()),
            (b"cherry".to_vec(), b"3".to_vec()),
        ]
    );
}

#[test]
fn scan_bounds_are_from_inclusive_to_exclusive() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    for key in ["a", "b", "c", "d"] {
        store.put(key, key).unwrap();
    }

    let got: Vec<_> = store
        .scan(Some(b"b"), Some(b"d"))
        .unwrap()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(got, vec![b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn scan_inverted_range_is_empty() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();
    store.put("m", "1").unwrap();

    assert_eq!(store.scan(Some(b"z"), Some(b"a")).unwrap().count(), 0);
}

#[test]
fn scan_spans_memtable_and_tables() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open_with(tmp.path(), small_buffer_config()).unwrap();

    for i in 0..300 {
        store
            .put(format!("key-{i:04}"), format!("value-{i:04}-padded-out"))
            .unwrap();
    }

    let got: Vec<_> = store.scan(None, None).unwrap().collect();
    assert_eq!(got.len(), 300);
    for (i, (key, value)) in got.iter().enumerate() {
        assert_eq!(key, format!("key-{i:04}").as_bytes());
        assert_eq!(value, format!("value-{i:04}-padded-out").as_bytes());
    }
}

// ================================================================================================
// Persistence
// ================================================================================================

#[test]
fn data_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(tmp.path()).unwrap();
        for i in 0..100 {
            store.put(format!("key-{i:03}"), format!("value-{i}")).unwrap();
        }
        store.close().unwrap();
    }

    let store = reopen(tmp.path());
    for i in 0..100 {
        let key = format!("key-{i:03}");
        assert_eq!(
            store.get(key.as_bytes()).unwrap(),
            Some(format!("value-{i}").into_bytes())
        );
    }
}

#[test]
fn deletes_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(tmp.path()).unwrap();
        store.put("kept", "v").unwrap();
        store.put("gone", "v").unwrap();
        store.flush().unwrap();
        store.delete("gone").unwrap();
        store.close().unwrap();
    }

    let store = reopen(tmp.path());
    assert_eq!(store.get(b"kept").unwrap(), Some(b"v".to_vec()));
    assert_eq!(store.get(b"gone").unwrap(), None);
}

// ================================================================================================
// Compaction
// ================================================================================================

#[test]
fn compaction_preserves_live_data() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    for batch in 0..4 {
        for i in 0..25 {
            store
                .put(format!("key-{:03}", batch * 25 + i), format!("batch-{batch}"))
                .unwrap();
        }
        store.flush().unwrap();
    }

    assert!(store.compact().unwrap());

    let got: Vec<_> = store.scan(None, None).unwrap().collect();
    assert_eq!(got.len(), 100);
}

#[test]
fn compaction_removes_deleted_keys_from_disk() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    for i in 0..50 {
        store.put(format!("key-{i:02}"), "v").unwrap();
    }
    store.flush().unwrap();
    for i in 0..25 {
        store.delete(format!("key-{i:02}")).unwrap();
    }
    store.flush().unwrap();

    assert!(store.compact().unwrap());

    let got: Vec<_> = store.scan(None, None).unwrap().collect();
    assert_eq!(got.len(), 25);
    assert_eq!(got[0].0, b"key-25".to_vec());
}

#[test]
fn compact_without_enough_tables_returns_false() {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path()).unwrap();

    assert!(!store.compact().unwrap());

    store.put("only", "table").unwrap();
    store.flush().unwrap();
    assert!(!store.compact().unwrap());
}

// ================================================================================================
// Crash cleanup
// ================================================================================================

#[test]
fn crash_remnants_are_discarded_on_open() {
    let tmp = TempDir::new().unwrap();
    {
        let store = Store::open(tmp.path()).unwrap();
        store.put("committed", "value").unwrap();
        store.close().unwrap();
    }

    // Plant the three remnant shapes an interrupted flush can leave.
    std::fs::write(tmp.path().join("data-50.tmp"), b"staged").unwrap();
    std::fs::write(tmp.path().join("data-51"), b"no index partner").unwrap();
    std::fs::write(tmp.path().join("index-52"), b"no data partner").unwrap();

    let store = reopen(tmp.path());
    assert!(!tmp.path().join("data-50.tmp").exists());
    assert!(!tmp.path().join("data-51").exists());
    assert!(!tmp.path().join("index-52").exists());
    assert_eq!(store.get(b"committed").unwrap(), Some(b"value".to_vec()));
}

// ================================================================================================
// Concurrency
// ================================================================================================

#[test]
fn concurrent_writers_then_full_read_back() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(Store::open_with(tmp.path(), small_buffer_config()).unwrap());

    let mut handles = Vec::new();
    for t in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                store
                    .put(format!("thread{t}:key{i:04}"), format!("value-{t}-{i}"))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let got: Vec<_> = store.scan(None, None).unwrap().collect();
    assert_eq!(got.len(), 800);
}

#[test]
fn readers_see_consistent_data_during_writes() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(Store::open_with(tmp.path(), small_buffer_config()).unwrap());

    for i in 0..50 {
        store.put(format!("stable-{i:02}"), "fixed").unwrap();
    }
    store.flush().unwrap();

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..500 {
                store.put(format!("noise-{i:04}"), "churn").unwrap();
            }
        })
    };

    for _ in 0..25 {
        let stable: Vec<_> = store
            .scan(Some(b"stable-"), Some(b"stable-99"))
            .unwrap()
            .collect();
        assert_eq!(stable.len(), 50);
    }

    writer.join().unwrap();
}

// ================================================================================================
// Full stack
// ================================================================================================

#[test]
fn full_lifecycle_end_to_end() {
    let tmp = TempDir::new().unwrap();

    {
        let store = Store::open_with(tmp.path(), small_buffer_config()).unwrap();
        for i in 0..200 {
            store.put(format!("doc:{i:04}"), format!("body-{i}")).unwrap();
        }
        for i in (0..200).step_by(2) {
            store.delete(format!("doc:{i:04}")).unwrap();
        }
        store.flush().unwrap();
        store.compact().unwrap();
        store.close().unwrap();
    }

    let store = reopen(tmp.path());
    let got: Vec<_> = store.scan(None, None).unwrap().collect();
    assert_eq!(got.len(), 100);
    for (key, _) in &got {
        let n: usize = std::str::from_utf8(&key[4..]).unwrap().parse().unwrap();
        assert_eq!(n % 2, 1, "even-numbered doc survived deletion");
    }
    store.close().unwrap();
}
