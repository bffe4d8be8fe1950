//! SSTable writer — serializes a sorted entry stream into a committed
//! `data-N` / `index-N` file pair.
//!
//! # Input requirements
//!
//! The caller supplies entries **strictly increasing by key** and already
//! deduplicated — memtable iteration order and the merge pipeline both
//! satisfy this. The writer verifies the invariant and fails with
//! [`SsTableError::UnsortedInput`] rather than committing a table that
//! would break binary search.
//!
//! # Atomicity
//!
//! 1. Write `data-N.tmp`, recording each entry's byte offset.
//! 2. Write `index-N.tmp` from the recorded offsets.
//! 3. Flush and `sync_all` both files.
//! 4. Rename `data-N.tmp` → `data-N`, then `index-N.tmp` → `index-N`.
//! 5. Fsync the directory.
//!
//! The index rename is the commit point: startup recovery only loads
//! generations whose *pair* is complete, so a crash anywhere before step 4
//! finishes leaves at most a remnant that the catalog deletes. A stream of
//! zero entries creates no files at all.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::entry::Entry;

use super::{
    INDEX_HEADER_LEN, OFFSET_LEN, SsTableError, TMP_SUFFIX, TOMBSTONE_LEN, data_path, index_path,
};

/// Appends `.tmp` to a committed path to form its staging name.
fn staging(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Writes one table for a given generation.
pub struct TableWriter {
    dir: PathBuf,
    generation: u64,
}

impl TableWriter {
    /// Creates a writer that will commit `data-N` / `index-N` under `dir`.
    pub fn new(dir: impl Into<PathBuf>, generation: u64) -> Self {
        Self {
            dir: dir.into(),
            generation,
        }
    }

    /// Consumes a sorted, deduplicated entry stream and commits the pair.
    ///
    /// Returns `Ok(false)` without touching the filesystem when the stream
    /// is empty, `Ok(true)` once both files are durably in place.
    pub fn build(self, entries: impl Iterator<Item = Entry>) -> Result<bool, SsTableError> {
        let mut entries = entries.peekable();
        if entries.peek().is_none() {
            return Ok(false);
        }

        let data_final = data_path(&self.dir, self.generation);
        let index_final = index_path(&self.dir, self.generation);
        let data_tmp = staging(&data_final);
        let index_tmp = staging(&index_final);

        // 1. Data file: entries in iteration order, offsets recorded.
        let offsets = match self.write_data(&data_tmp, entries) {
            Ok(offsets) => offsets,
            Err(e) => {
                let _ = fs::remove_file(&data_tmp);
                return Err(e);
            }
        };

        // 2. Index file from the recorded offsets.
        if let Err(e) = self.write_index(&index_tmp, &offsets) {
            let _ = fs::remove_file(&data_tmp);
            let _ = fs::remove_file(&index_tmp);
            return Err(e);
        }

        // 3. Commit: data first, index last. The pair is live only once
        //    the index rename lands.
        fs::rename(&data_tmp, &data_final)?;
        fs::rename(&index_tmp, &index_final)?;
        File::open(&self.dir)?.sync_all()?;

        debug!(
            generation = self.generation,
            entries = offsets.len(),
            "sstable committed"
        );
        Ok(true)
    }

    /// Serializes entries into the staging data file and returns their
    /// byte offsets. The file is fsynced before returning.
    fn write_data(
        &self,
        path: &Path,
        entries: impl Iterator<Item = Entry>,
    ) -> Result<Vec<u64>, SsTableError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = BufWriter::new(&mut file);

        let mut offsets = Vec::new();
        let mut position = 0u64;
        let mut last_key: Option<Vec<u8>> = None;

        for entry in entries {
            if let Some(ref prev) = last_key
                && prev.as_slice() >= entry.key.as_slice()
            {
                return Err(SsTableError::UnsortedInput);
            }

            let key_len = u32::try_from(entry.key.len()).map_err(|_| SsTableError::TooLarge {
                what: "key",
                len: entry.key.len(),
            })?;
            let value_len = match entry.value {
                Some(ref v) => i32::try_from(v.len()).map_err(|_| SsTableError::TooLarge {
                    what: "value",
                    len: v.len(),
                })?,
                None => TOMBSTONE_LEN,
            };

            offsets.push(position);

            writer.write_all(&key_len.to_le_bytes())?;
            writer.write_all(&entry.key)?;
            writer.write_all(&value_len.to_le_bytes())?;
            if let Some(ref value) = entry.value {
                writer.write_all(value)?;
            }

            position += entry.encoded_len() as u64;
            last_key = Some(entry.key);
        }

        writer.flush()?;
        drop(writer);
        file.sync_all()?;

        Ok(offsets)
    }

    /// Writes `[entryCount: u64][offset…]` to the staging index file and
    /// fsyncs it.
    fn write_index(&self, path: &Path, offsets: &[u64]) -> Result<(), SsTableError> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut buf = Vec::with_capacity(INDEX_HEADER_LEN + offsets.len() * OFFSET_LEN);
        buf.extend_from_slice(&(offsets.len() as u64).to_le_bytes());
        for offset in offsets {
            buf.extend_from_slice(&offset.to_le_bytes());
        }

        file.write_all(&buf)?;
        file.sync_all()?;

        Ok(())
    }
}
