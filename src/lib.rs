//! # silt
//!
//! An embeddable, ordered key-value store built on an LSM-tree architecture.
//!
//! Writes are absorbed by an in-memory [`Memtable`]; once it grows past a
//! configurable threshold it is frozen and persisted as an immutable sorted
//! table (a `data-N` / `index-N` file pair) by a background worker. Reads
//! consult the layers newest first and merge them on the fly, so the latest
//! write for a key always wins and deletions (tombstones) shadow older
//! values until compaction physically drops them.
//!
//! Keys and values are arbitrary byte sequences; keys are ordered by
//! lexicographic unsigned byte comparison.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use silt::Store;
//!
//! fn main() -> Result<(), silt::StoreError> {
//!     let store = Store::open("/tmp/silt-demo")?;
//!
//!     store.put("apple", "red")?;
//!     store.put("banana", "yellow")?;
//!     store.delete("apple")?;
//!
//!     assert_eq!(store.get(b"apple")?, None);
//!     assert_eq!(store.get(b"banana")?, Some(b"yellow".to_vec()));
//!
//!     for (key, value) in store.scan(None, None)? {
//!         println!("{:?} => {:?}", key, value);
//!     }
//!
//!     store.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Durability
//!
//! There is no write-ahead log: a write is durable once it has been flushed
//! to a table, which [`Store::flush`] forces and [`Store::close`] performs
//! for everything still buffered. A process crash loses only unflushed
//! writes and never corrupts committed tables; interrupted flushes and
//! compactions are cleaned up on the next open.

// ------------------------------------------------------------------------------------------------
// Modules
// ------------------------------------------------------------------------------------------------

pub(crate) mod catalog;
pub(crate) mod entry;
pub(crate) mod memtable;
pub(crate) mod merge;
pub(crate) mod sstable;
pub(crate) mod store;

// ------------------------------------------------------------------------------------------------
// Public API
// ------------------------------------------------------------------------------------------------

pub use entry::{Entry, key_cmp};
pub use memtable::Memtable;
pub use store::{ScanIter, Store, StoreConfig, StoreError};
