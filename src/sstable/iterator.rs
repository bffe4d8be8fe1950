//! Lazy forward range scan over a single SSTable.
//!
//! [`TableIter`] walks the half-open interval `[from, to)`, decoding one
//! entry per step from the memory-mapped data file. Both bounds are
//! resolved once, at construction, via the same insertion-point binary
//! search that backs point lookups. The iterator is forward-only and not
//! restartable — callers re-scan by constructing a fresh one.
//!
//! The handle parameter `S` is anything that derefs to [`SsTable`]: a plain
//! borrow for table-local scans, or an `Arc<SsTable>` when the iterator
//! must outlive the store's lock guard (the engine scan path).

use std::ops::Deref;

use tracing::warn;

use crate::entry::Entry;

use super::{SsTable, SsTableError};

/// Iterator over the entries of one table within `[from, to)`.
///
/// Yields entries — tombstones included — in ascending key order. Visibility
/// resolution across tables is the merge layer's job.
pub struct TableIter<S: Deref<Target = SsTable>> {
    /// Borrowed or owned handle on the table being scanned.
    table: S,

    /// Index of the next entry to decode.
    pos: usize,

    /// One past the last entry in range.
    end: usize,
}

impl<S: Deref<Target = SsTable>> TableIter<S> {
    /// Positions a new scan at the first key `>= from` (or the table start)
    /// and bounds it at the first key `>= to` (or the table end).
    pub fn new(table: S, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<Self, SsTableError> {
        let pos = match from {
            Some(key) => table.lower_bound(key)?,
            None => 0,
        };
        let end = match to {
            Some(key) => table.lower_bound(key)?,
            None => table.len(),
        };

        Ok(Self { table, pos, end })
    }
}

impl<S: Deref<Target = SsTable>> Iterator for TableIter<S> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }

        match self.table.entry_at(self.pos) {
            Ok(entry) => {
                self.pos += 1;
                Some(entry)
            }
            Err(e) => {
                // Open-time validation makes this unreachable for a table
                // the writer committed; stop rather than yield garbage.
                warn!(
                    generation = self.table.generation(),
                    pos = self.pos,
                    %e,
                    "decode failed mid-scan, ending iteration"
                );
                self.pos = self.end;
                None
            }
        }
    }
}
