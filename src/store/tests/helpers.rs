use crate::store::{Store, StoreConfig};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with a buffer large enough that writes never trigger a rotation;
/// everything stays in the active memtable unless flushed explicitly.
pub fn memtable_only_config() -> StoreConfig {
    init_tracing();
    StoreConfig {
        flush_threshold_bytes: 1024 * 1024,
    }
}

/// Smallest accepted buffer — rotations (and background flushes) kick in
/// after a handful of writes.
pub fn small_buffer_config() -> StoreConfig {
    init_tracing();
    StoreConfig {
        flush_threshold_bytes: 1024,
    }
}

/// Open a store, write `num_keys` pairs, and flush so everything sits in
/// at least one committed table.
pub fn store_with_table(path: &Path, num_keys: usize, prefix: &str) -> Store {
    let store = Store::open_with(path, memtable_only_config()).expect("open");
    for i in 0..num_keys {
        let key = format!("{prefix}-{i:04}");
        let value = format!("value-{i:04}");
        store.put(key, value).expect("put");
    }
    store.flush().expect("flush");
    store
}

/// Number of committed `data-N` files in the store directory.
pub fn table_count(path: &Path) -> usize {
    std::fs::read_dir(path)
        .expect("read_dir")
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .starts_with("data-")
        })
        .count()
}

/// Collect a full scan into a Vec.
pub fn collect_scan(store: &Store) -> Vec<(Vec<u8>, Vec<u8>)> {
    store.scan(None, None).expect("scan").collect()
}
