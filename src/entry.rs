//! Core value types shared by every layer of the store.
//!
//! An [`Entry`] is the unit of data that flows through the system: memtable,
//! SSTable, merge iterator, and the public API all speak in entries. A
//! tombstone is an entry whose value is `None` — a distinguished state, not
//! an empty byte string. `Entry { value: Some(vec![]) }` is a live,
//! zero-length value.
//!
//! Keys are opaque byte sequences. Their total order is lexicographic
//! unsigned byte comparison, exposed here as [`key_cmp`] so that every
//! ordering site in the crate names the same comparator.

use std::cmp::Ordering;

/// Compares two keys by lexicographic unsigned byte order.
///
/// This is the single total order used by the memtable, SSTable binary
/// search, and the merge iterator. It coincides with `Ord` on byte slices;
/// giving it a name keeps the ordering contract explicit at call sites.
#[inline]
pub fn key_cmp(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Fixed per-entry framing overhead in the on-disk encoding:
/// `keyLen: u32` plus `valueLen: i32`.
pub(crate) const ENTRY_HEADER_LEN: usize = 8;

/// A single key-value record, or a deletion marker for a key.
///
/// Entries are immutable once created. The same type travels through the
/// memtable, the SSTable encoder/decoder, and the merge pipeline, so
/// "tombstone" means exactly one thing everywhere: `value == None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The key bytes.
    pub key: Vec<u8>,

    /// The value bytes. `None` is a tombstone (the key is deleted).
    pub value: Option<Vec<u8>>,
}

impl Entry {
    /// Creates a live entry.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Creates a tombstone for `key`.
    pub fn tombstone(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Returns `true` if this entry marks a deletion.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Serialized size of this entry in the on-disk format:
    /// `[keyLen: u32][key][valueLen: i32][value?]`.
    ///
    /// The memtable byte counter uses this same measure, so the flush
    /// threshold approximates the size of the SSTable a flush would produce.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        ENTRY_HEADER_LEN + self.key.len() + self.value.as_ref().map_or(0, Vec::len)
    }
}
