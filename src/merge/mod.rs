//! K-way merge across independently sorted entry streams.
//!
//! Every read that spans more than one layer of the store goes through this
//! module: the memtable snapshot and each SSTable contribute one strictly
//! increasing stream, and [`MergeIterator`] combines them into a single
//! strictly increasing stream in which the **freshest** source wins every
//! key collision. [`TombstoneFilter`] then hides entries whose effective
//! value is a deletion marker — the shape the public scan API exposes.
//!
//! Sources are wrapped in [`PeekedSource`], an explicit one-element buffer,
//! so the priority queue's ordering key never requires poking a stateful
//! iterator mid-comparison.


use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::entry::{Entry, key_cmp};

// ------------------------------------------------------------------------------------------------
// PeekedSource — a sorted stream tagged with freshness
// ------------------------------------------------------------------------------------------------

/// One sorted input to the merge: an entry iterator plus a buffered head
/// and a freshness priority (`0` is freshest; the memtable outranks every
/// table, newer tables outrank older ones).
pub struct PeekedSource {
    /// The buffered next entry; `None` once the stream is exhausted.
    head: Option<Entry>,

    /// Remaining entries, strictly increasing by key.
    iter: Box<dyn Iterator<Item = Entry> + Send>,

    /// Collision rank: lower wins on duplicate keys.
    priority: usize,
}

impl PeekedSource {
    /// Wraps a sorted stream, buffering its first entry.
    pub fn new(priority: usize, iter: impl Iterator<Item = Entry> + Send + 'static) -> Self {
        let mut iter = Box::new(iter) as Box<dyn Iterator<Item = Entry> + Send>;
        let head = iter.next();
        Self {
            head,
            iter,
            priority,
        }
    }

    /// Takes the buffered entry and refills the buffer from the stream.
    fn advance(&mut self) -> Option<Entry> {
        let taken = self.head.take();
        self.head = self.iter.next();
        taken
    }
}

// ------------------------------------------------------------------------------------------------
// Heap adapter — ordered by (peeked key ASC, priority ASC)
// ------------------------------------------------------------------------------------------------

/// Heap slot. Invariant: `source.head` is always `Some` while the slot is
/// in the heap — exhausted sources are never re-inserted.
struct HeapSource(PeekedSource);

impl HeapSource {
    fn key(&self) -> &[u8] {
        // Invariant above: head is Some for every slot in the heap.
        self.0.head.as_ref().map(|e| e.key.as_slice()).unwrap_or(&[])
    }

    fn advance(&mut self) -> Option<Entry> {
        self.0.advance()
    }
}

impl Ord for HeapSource {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest key
        // (and on ties the freshest source) on top.
        key_cmp(self.key(), other.key())
            .then_with(|| self.0.priority.cmp(&other.0.priority))
            .reverse()
    }
}

impl PartialOrd for HeapSource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapSource {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapSource {}

// ------------------------------------------------------------------------------------------------
// MergeIterator
// ------------------------------------------------------------------------------------------------

/// Merges k sorted sources into one strictly increasing entry stream.
///
/// For each key present in several sources, only the highest-priority
/// (freshest) source's entry is yielded — older versions are advanced past
/// and discarded, realizing last-write-wins across separately sorted
/// layers. Tombstones are passed through; see [`TombstoneFilter`].
///
/// Zero sources produce an empty stream; a single source passes through
/// unchanged.
pub struct MergeIterator {
    heap: BinaryHeap<HeapSource>,
}

impl MergeIterator {
    /// Builds the merge over the given sources. Sources whose stream is
    /// already empty are dropped immediately.
    pub fn new(sources: Vec<PeekedSource>) -> Self {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for source in sources {
            if source.head.is_some() {
                heap.push(HeapSource(source));
            }
        }
        Self { heap }
    }
}

impl Iterator for MergeIterator {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        // The top slot holds the smallest key; among equal keys the
        // freshest source sorts first, so the first pop is the winner.
        let mut winner_slot = self.heap.pop()?;
        let winner = winner_slot.advance()?;
        if winner_slot.0.head.is_some() {
            self.heap.push(winner_slot);
        }

        // Advance every other source sitting on the same key; their
        // entries are shadowed and never surfaced.
        while let Some(top) = self.heap.peek() {
            if top.key() != winner.key.as_slice() {
                break;
            }
            let mut shadowed = match self.heap.pop() {
                Some(slot) => slot,
                None => break,
            };
            shadowed.advance();
            if shadowed.0.head.is_some() {
                self.heap.push(shadowed);
            }
        }

        Some(winner)
    }
}

// ------------------------------------------------------------------------------------------------
// TombstoneFilter
// ------------------------------------------------------------------------------------------------

/// Hides deletion markers from a merged stream.
///
/// Wraps a [`MergeIterator`] (or any entry stream in which each key's
/// effective winner has already been chosen) and skips entries whose value
/// is the tombstone. The exposed stream never yields a tombstone — this is
/// what the public range scan returns, and what compaction writes out.
pub struct TombstoneFilter<I> {
    inner: I,
}

impl<I: Iterator<Item = Entry>> TombstoneFilter<I> {
    /// Wraps the given stream.
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I: Iterator<Item = Entry>> Iterator for TombstoneFilter<I> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find(|entry| !entry.is_tombstone())
    }
}
