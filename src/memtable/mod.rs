//! # Memtable Module
//!
//! The mutable, in-memory layer of the store: a concurrent ordered map from
//! key to [`Entry`] that absorbs every upsert until it grows past the
//! configured flush threshold, at which point the store freezes it and hands
//! it to the flush path.
//!
//! ## Concurrency
//!
//! Backed by a lock-free [`SkipMap`], so point lookups, range scans, and a
//! writer stream proceed without external locking. Iterators are weakly
//! consistent: a scan started before a concurrent upsert may or may not
//! observe it, but is never corrupted. The *rotation* to a fresh memtable is
//! coordinated by the store, not here.
//!
//! ## Size accounting
//!
//! Every upsert adjusts a running byte counter by the serialized size of the
//! new entry minus the size of the entry it replaced (if any). The counter
//! therefore approximates the SSTable a flush of this memtable would write.


use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::SkipMap;
use tracing::trace;

use crate::entry::{ENTRY_HEADER_LEN, Entry};

/// Concurrent, ordered in-memory write buffer.
///
/// Invariant: at most one entry per key — the latest upsert wins. Tombstones
/// are stored like any other entry (`value == None`) so that a deletion in
/// the memtable shadows older live values in the SSTables below it.
pub struct Memtable {
    /// Ordered key → value map. `None` values are tombstones.
    map: SkipMap<Vec<u8>, Option<Vec<u8>>>,

    /// Serialized size of all resident entries, in bytes.
    size: AtomicUsize,
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Memtable {
    /// Creates an empty memtable.
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Inserts or overwrites the entry for `entry.key`.
    ///
    /// Has no error path. Adjusts the byte counter by the size delta when
    /// replacing an existing entry.
    pub fn upsert(&self, entry: Entry) {
        trace!(key_len = entry.key.len(), tombstone = entry.is_tombstone(), "memtable upsert");

        let new_size = entry.encoded_len();
        let old_size = self.map.get(entry.key.as_slice()).map(|existing| {
            ENTRY_HEADER_LEN
                + existing.key().len()
                + existing.value().as_ref().map_or(0, Vec::len)
        });

        self.map.insert(entry.key, entry.value);

        self.size.fetch_add(new_size, Ordering::Relaxed);
        if let Some(old) = old_size {
            self.size.fetch_sub(old, Ordering::Relaxed);
        }
    }

    /// Point lookup.
    ///
    /// Returns the entry including tombstones; `None` means this memtable
    /// holds no information about the key — the caller must keep "absent"
    /// and "present as tombstone" distinct.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.map.get(key).map(|e| Entry {
            key: e.key().clone(),
            value: e.value().clone(),
        })
    }

    /// Scans entries in `[from, to)` in ascending key order.
    ///
    /// `None` bounds mean "from the beginning" / "to the end". Tombstones
    /// are included. The iterator is lazy and weakly consistent under
    /// concurrent upserts.
    pub fn range<'a>(
        &'a self,
        from: Option<&'a [u8]>,
        to: Option<&'a [u8]>,
    ) -> impl Iterator<Item = Entry> + 'a {
        let lower = from.map_or(Bound::Unbounded, Bound::Included);
        let upper = to.map_or(Bound::Unbounded, Bound::Excluded);

        self.map.range::<[u8], _>((lower, upper)).map(|e| Entry {
            key: e.key().clone(),
            value: e.value().clone(),
        })
    }

    /// Returns `true` if no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of resident entries (tombstones included).
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Serialized size of all resident entries, in bytes.
    ///
    /// The store compares this against the flush threshold after each
    /// upsert to decide when to rotate.
    pub fn size_in_bytes(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }
}
