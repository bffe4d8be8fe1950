#[cfg(test)]
mod tests {
    use crate::entry::Entry;
    use crate::sstable::{SsTable, TableIter, TableWriter};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fruit_table(tmp: &TempDir) -> SsTable {
        let entries = vec![
            Entry::put("apple", "1"),
            Entry::put("banana", "2"),
            Entry::tombstone("cherry"),
            Entry::put("date", "4"),
            Entry::put("fig", "5"),
        ];
        TableWriter::new(tmp.path(), 1)
            .build(entries.into_iter())
            .unwrap();
        SsTable::open(tmp.path(), 1).unwrap()
    }

    fn keys(entries: impl Iterator<Item = Entry>) -> Vec<Vec<u8>> {
        entries.map(|e| e.key).collect()
    }

    #[test]
    fn test_full_scan() {
        let tmp = TempDir::new().unwrap();
        let table = fruit_table(&tmp);

        let got = keys(table.range(None, None).unwrap());
        assert_eq!(
            got,
            vec![
                b"apple".to_vec(),
                b"banana".to_vec(),
                b"cherry".to_vec(),
                b"date".to_vec(),
                b"fig".to_vec(),
            ]
        );
    }

    #[test]
    fn test_half_open_bounds() {
        let tmp = TempDir::new().unwrap();
        let table = fruit_table(&tmp);

        let got = keys(table.range(Some(b"banana"), Some(b"date")).unwrap());
        assert_eq!(got, vec![b"banana".to_vec(), b"cherry".to_vec()]);
    }

    #[test]
    fn test_bounds_between_keys() {
        let tmp = TempDir::new().unwrap();
        let table = fruit_table(&tmp);

        let got = keys(table.range(Some(b"b"), Some(b"e")).unwrap());
        assert_eq!(
            got,
            vec![b"banana".to_vec(), b"cherry".to_vec(), b"date".to_vec()]
        );
    }

    #[test]
    fn test_range_outside_table_is_empty() {
        let tmp = TempDir::new().unwrap();
        let table = fruit_table(&tmp);

        assert_eq!(table.range(Some(b"x"), None).unwrap().count(), 0);
        assert_eq!(table.range(None, Some(b"a")).unwrap().count(), 0);
    }

    #[test]
    fn test_scan_yields_tombstones() {
        let tmp = TempDir::new().unwrap();
        let table = fruit_table(&tmp);

        let entries: Vec<Entry> = table.range(None, None).unwrap().collect();
        assert!(entries[2].is_tombstone());
    }

    #[test]
    fn test_owned_iterator_outlives_borrow_scope() {
        let tmp = TempDir::new().unwrap();
        let table = Arc::new(fruit_table(&tmp));

        let iter = TableIter::new(Arc::clone(&table), Some(b"banana"), None).unwrap();
        drop(table);

        // The Arc handle keeps the mapping alive for the whole scan.
        assert_eq!(iter.count(), 4);
    }
}
