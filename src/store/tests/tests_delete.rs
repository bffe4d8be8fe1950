//! Point-delete correctness: tombstones must hide older values wherever
//! those values live, and a re-put must bring the key back.

#[cfg(test)]
mod tests {
    use crate::store::Store;
    use crate::store::tests::helpers::*;
    use tempfile::TempDir;

    #[test]
    fn test_delete_in_memtable() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open_with(tmp.path(), memtable_only_config()).unwrap();

        store.put("key", "value").unwrap();
        store.delete("key").unwrap();
        assert_eq!(store.get(b"key").unwrap(), None);
    }

    #[test]
    fn test_delete_missing_key_is_ok() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open_with(tmp.path(), memtable_only_config()).unwrap();

        store.delete("never-existed").unwrap();
        assert_eq!(store.get(b"never-existed").unwrap(), None);
    }

    #[test]
    fn test_memtable_tombstone_hides_table_value() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open_with(tmp.path(), memtable_only_config()).unwrap();

        store.put("key", "persisted").unwrap();
        store.flush().unwrap();
        store.delete("key").unwrap();

        // The value is still physically in the table; the fresher tombstone
        // in the memtable must win.
        assert_eq!(store.get(b"key").unwrap(), None);
    }

    #[test]
    fn test_flushed_tombstone_hides_older_table() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open_with(tmp.path(), memtable_only_config()).unwrap();

        store.put("key", "persisted").unwrap();
        store.flush().unwrap();
        store.delete("key").unwrap();
        store.flush().unwrap();

        assert_eq!(table_count(tmp.path()), 2);
        assert_eq!(store.get(b"key").unwrap(), None);
    }

    #[test]
    fn test_delete_then_recreate() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open_with(tmp.path(), memtable_only_config()).unwrap();

        store.put("key", "original").unwrap();
        store.flush().unwrap();
        store.delete("key").unwrap();
        store.flush().unwrap();
        store.put("key", "recreated").unwrap();

        assert_eq!(store.get(b"key").unwrap(), Some(b"recreated".to_vec()));
    }

    #[test]
    fn test_delete_does_not_affect_neighbors() {
        let tmp = TempDir::new().unwrap();
        let store = store_with_table(tmp.path(), 10, "key");

        store.delete("key-0005").unwrap();

        assert_eq!(store.get(b"key-0005").unwrap(), None);
        assert_eq!(
            store.get(b"key-0004").unwrap(),
            Some(b"value-0004".to_vec())
        );
        assert_eq!(
            store.get(b"key-0006").unwrap(),
            Some(b"value-0006".to_vec())
        );
    }
}
