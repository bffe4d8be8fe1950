//! Sorted String Table (SSTable) Module
//!
//! An SSTable is an **immutable**, sorted, on-disk snapshot of entries,
//! stored as a file pair named after its generation number `N`:
//!
//! - `data-N` — a contiguous sequence of serialized entries in ascending
//!   key order.
//! - `index-N` — a binary offset index over the data file.
//!
//! # On-disk layout
//!
//! ```text
//! data-N:   [keyLen: u32 LE][key bytes][valueLen: i32 LE][value bytes?]  × entryCount
//! index-N:  [entryCount: u64 LE][offset_0: u64 LE]…[offset_{n-1}: u64 LE]
//! ```
//!
//! A `valueLen` of `-1` marks a tombstone; no value bytes follow it. Each
//! `offset_i` is the byte position of entry `i` within the data file.
//!
//! # Invariants
//!
//! - Keys within one table are **strictly increasing** — no duplicates.
//!   [`TableWriter`] enforces this on the write path.
//! - Tables are write-once. Both files are created under a `.tmp` staging
//!   name and renamed into place only after an fsync, so a reader never
//!   observes a partially written table under its permanent name.
//! - A table is never empty: flushing zero entries writes no files at all.
//!
//! # Concurrency
//!
//! Both files are memory-mapped read-only; the mappings live exactly as long
//! as the [`SsTable`] handle and are shared freely across reader threads.
//! Point lookups ([`SsTable::get`]) binary-search the index; range scans
//! ([`TableIter`]) decode entries lazily between two insertion points.
//!
//! # Sub-modules
//!
//! - [`builder`] — [`TableWriter`] for building tables from sorted streams.
//! - [`iterator`] — [`TableIter`] for lazy forward range scans.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod builder;
pub mod iterator;

#[cfg(test)]
mod tests;

pub use builder::TableWriter;
pub use iterator::TableIter;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

use crate::entry::{Entry, key_cmp};

// ------------------------------------------------------------------------------------------------
// Constants & file naming
// ------------------------------------------------------------------------------------------------

/// Filename prefix of the entry file.
pub(crate) const DATA_PREFIX: &str = "data-";

/// Filename prefix of the offset-index file.
pub(crate) const INDEX_PREFIX: &str = "index-";

/// Suffix used while a file pair is being staged; never loaded as a table.
pub(crate) const TMP_SUFFIX: &str = ".tmp";

/// `valueLen` sentinel marking a tombstone in the data file.
pub(crate) const TOMBSTONE_LEN: i32 = -1;

/// Size of the index file header (`entryCount: u64`).
pub(crate) const INDEX_HEADER_LEN: usize = 8;

/// Size of one offset slot in the index file.
pub(crate) const OFFSET_LEN: usize = 8;

/// Path of the data file for `generation` under `dir`.
pub(crate) fn data_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{DATA_PREFIX}{generation}"))
}

/// Path of the index file for `generation` under `dir`.
pub(crate) fn index_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{INDEX_PREFIX}{generation}"))
}

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by SSTable operations (open, read, build).
#[derive(Debug, Error)]
pub enum SsTableError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file pair does not describe a well-formed table.
    #[error("malformed table: {0}")]
    Malformed(String),

    /// A key or value exceeds the length representable in the wire format.
    #[error("{what} of {len} bytes exceeds the format limit")]
    TooLarge {
        /// Which field overflowed ("key" or "value").
        what: &'static str,
        /// The offending length.
        len: usize,
    },

    /// The caller handed the writer entries that were not strictly
    /// increasing by key.
    #[error("input entries are not strictly increasing by key")]
    UnsortedInput,
}

// ------------------------------------------------------------------------------------------------
// SsTable — immutable reader
// ------------------------------------------------------------------------------------------------

/// A memory-mapped, immutable sorted table.
///
/// Opened from a committed `data-N` / `index-N` pair. All reads go through
/// the mappings; the handle owns them and unmaps on drop, so slices decoded
/// from the table never outlive it.
pub struct SsTable {
    /// Generation number this table was committed under.
    generation: u64,

    /// Read-only mapping of the data file.
    data: Mmap,

    /// Read-only mapping of the index file.
    index: Mmap,

    /// Entry count from the index header.
    entry_count: usize,
}

impl SsTable {
    /// Opens the committed table `generation` under `dir` and validates the
    /// index against the data file.
    ///
    /// # Errors
    ///
    /// [`SsTableError::Malformed`] when the index is truncated, empty,
    /// disagrees with the data file length, or holds non-increasing
    /// offsets — the conditions a crashed writer could leave behind only
    /// under a staging name, so a committed table failing them is treated
    /// as a discardable remnant by the catalog.
    ///
    /// # Safety
    ///
    /// Uses `unsafe { Mmap::map(..) }`; sound because both files are
    /// write-once and every decode below is bounds-checked against the
    /// mapping length.
    pub fn open(dir: &Path, generation: u64) -> Result<Self, SsTableError> {
        let data_file = File::open(data_path(dir, generation))?;
        let index_file = File::open(index_path(dir, generation))?;

        let data = unsafe { Mmap::map(&data_file)? };
        let index = unsafe { Mmap::map(&index_file)? };

        if index.len() < INDEX_HEADER_LEN {
            return Err(SsTableError::Malformed("index header truncated".into()));
        }

        let raw_count = u64::from_le_bytes(
            index[..INDEX_HEADER_LEN]
                .try_into()
                .map_err(|_| SsTableError::Malformed("index header truncated".into()))?,
        );
        let entry_count = usize::try_from(raw_count)
            .map_err(|_| SsTableError::Malformed("entry count exceeds addressable range".into()))?;

        if entry_count == 0 {
            return Err(SsTableError::Malformed("table holds no entries".into()));
        }

        let expected_len = INDEX_HEADER_LEN + entry_count * OFFSET_LEN;
        if index.len() != expected_len {
            return Err(SsTableError::Malformed(format!(
                "index length {} does not match entry count {entry_count}",
                index.len()
            )));
        }

        let table = Self {
            generation,
            data,
            index,
            entry_count,
        };

        // Offsets must be strictly increasing and inside the data file.
        let mut previous: Option<u64> = None;
        for i in 0..entry_count {
            let offset = table.offset_at(i);
            if offset >= table.data.len() as u64 {
                return Err(SsTableError::Malformed(format!(
                    "offset {offset} beyond data file length {}",
                    table.data.len()
                )));
            }
            if let Some(prev) = previous
                && offset <= prev
            {
                return Err(SsTableError::Malformed("offsets are not increasing".into()));
            }
            previous = Some(offset);
        }

        Ok(table)
    }

    /// Generation number this table was committed under.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.entry_count
    }

    /// Always `false`: the writer never commits an empty table.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// On-disk size of the data file in bytes.
    pub fn data_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Point lookup via binary search over the offset index.
    ///
    /// Returns the exact entry when the key is present — including
    /// tombstones, which the caller must not conflate with `Ok(None)`
    /// ("this table has no information about the key"). Resolving
    /// tombstone-versus-absent is the store's job, not this layer's.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>, SsTableError> {
        let idx = self.lower_bound(key)?;
        if idx < self.entry_count && self.key_at(idx)? == key {
            return Ok(Some(self.entry_at(idx)?));
        }
        Ok(None)
    }

    /// Borrowing range scan over `[from, to)`; `None` bounds are unbounded.
    ///
    /// See [`TableIter`] for the owned variant used when the iterator must
    /// outlive a lock guard.
    pub fn range<'a>(
        &'a self,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
    ) -> Result<TableIter<&'a SsTable>, SsTableError> {
        TableIter::new(self, from, to)
    }

    // --------------------------------------------------------------------------------------------
    // Decoding internals
    // --------------------------------------------------------------------------------------------

    /// Reads offset slot `i`. Caller guarantees `i < entry_count`.
    fn offset_at(&self, i: usize) -> u64 {
        let start = INDEX_HEADER_LEN + i * OFFSET_LEN;
        let bytes: [u8; OFFSET_LEN] = self.index[start..start + OFFSET_LEN]
            .try_into()
            .unwrap_or([0; OFFSET_LEN]);
        u64::from_le_bytes(bytes)
    }

    /// Borrows the key bytes of entry `i` from the data mapping.
    pub(crate) fn key_at(&self, i: usize) -> Result<&[u8], SsTableError> {
        let offset = self.offset_at(i) as usize;

        let key_len_end = offset
            .checked_add(4)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SsTableError::Malformed("entry header out of bounds".into()))?;
        let key_len = u32::from_le_bytes(
            self.data[offset..key_len_end]
                .try_into()
                .map_err(|_| SsTableError::Malformed("entry header out of bounds".into()))?,
        ) as usize;

        let key_end = key_len_end
            .checked_add(key_len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SsTableError::Malformed("key out of bounds".into()))?;

        Ok(&self.data[key_len_end..key_end])
    }

    /// Decodes entry `i` into an owned [`Entry`].
    pub(crate) fn entry_at(&self, i: usize) -> Result<Entry, SsTableError> {
        let key = self.key_at(i)?.to_vec();
        let offset = self.offset_at(i) as usize;
        let value_len_start = offset + 4 + key.len();

        let value_len_end = value_len_start
            .checked_add(4)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SsTableError::Malformed("value header out of bounds".into()))?;
        let value_len = i32::from_le_bytes(
            self.data[value_len_start..value_len_end]
                .try_into()
                .map_err(|_| SsTableError::Malformed("value header out of bounds".into()))?,
        );

        if value_len == TOMBSTONE_LEN {
            return Ok(Entry { key, value: None });
        }
        if value_len < 0 {
            return Err(SsTableError::Malformed(format!(
                "negative value length {value_len}"
            )));
        }

        let value_end = value_len_end
            .checked_add(value_len as usize)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| SsTableError::Malformed("value out of bounds".into()))?;

        Ok(Entry {
            key,
            value: Some(self.data[value_len_end..value_end].to_vec()),
        })
    }

    /// Index of the first entry whose key is `>= key` (the insertion
    /// point), or `entry_count` when every key is smaller.
    ///
    /// This is the single search primitive behind both [`SsTable::get`]
    /// and the range-scan bounds.
    pub(crate) fn lower_bound(&self, key: &[u8]) -> Result<usize, SsTableError> {
        let mut lo = 0usize;
        let mut hi = self.entry_count;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match key_cmp(self.key_at(mid)?, key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Equal | Ordering::Greater => hi = mid,
            }
        }

        Ok(lo)
    }
}

impl std::fmt::Debug for SsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsTable")
            .field("generation", &self.generation)
            .field("entries", &self.entry_count)
            .field("data_bytes", &self.data.len())
            .finish()
    }
}
