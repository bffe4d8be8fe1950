//! # Store Module
//!
//! [`Store`] is the public face of the engine: an embeddable, ordered
//! key-value store persisting to a single directory. It composes the layers
//! below into the classic LSM read/write paths:
//!
//! - **Writes** (`put` / `delete`) land in the active [`Memtable`]. When it
//!   grows past the configured threshold it is frozen and a fresh one takes
//!   its place; a background worker serializes the frozen memtable into a
//!   new SSTable generation.
//! - **Reads** (`get` / `scan`) consult the layers newest first: active
//!   memtable, frozen memtables, then SSTables by descending generation.
//!   The first layer with information about a key wins, so a tombstone in a
//!   newer layer hides a live value in an older one.
//! - **Maintenance** (`flush` / `compact`) is available on demand and runs
//!   on the same single worker thread as background flushes, so at most one
//!   table-producing operation is in flight at a time.
//!
//! ## Locking
//!
//! All mutable state sits behind one `RwLock`. Writers into the active
//! memtable take it for read (the memtable itself is concurrent); only
//! rotation, table installation, and close take it for write. Table file
//! serialization happens with **no** lock held — readers and writers
//! proceed while a flush or compaction is writing to disk.
//!
//! ## Durability
//!
//! There is no write-ahead log. Data reaches disk when a memtable is
//! flushed, which `close` does for everything still buffered; a process
//! crash loses whatever was only in memory and leaves the directory exactly
//! as of the last committed table. Interrupted flushes and compactions are
//! cleaned up by the catalog on the next open.

#[cfg(test)]
mod tests;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::catalog::{Catalog, CatalogError};
use crate::entry::Entry;
use crate::memtable::Memtable;
use crate::merge::{MergeIterator, PeekedSource, TombstoneFilter};
use crate::sstable::{SsTable, SsTableError, TableIter, TableWriter};

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Smallest accepted flush threshold. Anything lower would rotate on nearly
/// every write.
const MIN_FLUSH_THRESHOLD: usize = 1024;

/// Default flush threshold: 64 KiB of serialized entries.
const DEFAULT_FLUSH_THRESHOLD: usize = 64 * 1024;

/// Tunables for a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Serialized size at which the active memtable is frozen and queued
    /// for flushing.
    pub flush_threshold_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flush_threshold_bytes: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), StoreError> {
        if self.flush_threshold_bytes < MIN_FLUSH_THRESHOLD {
            return Err(StoreError::InvalidConfig(format!(
                "flush_threshold_bytes must be at least {MIN_FLUSH_THRESHOLD}, got {}",
                self.flush_threshold_bytes
            )));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Store`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has been closed; no further operations are accepted.
    #[error("store is closed")]
    Closed,

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// SSTable read or write failure.
    #[error("table error: {0}")]
    Table(#[from] SsTableError),

    /// Catalog load or maintenance failure.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Invariant violation inside the store (poisoned lock, dead worker).
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Shared state
// ------------------------------------------------------------------------------------------------

/// Everything the public handle and the maintenance worker both touch.
struct State {
    /// The memtable absorbing writes.
    active: Arc<Memtable>,

    /// Frozen memtables awaiting flush, newest first. Still readable.
    frozen: Vec<Arc<Memtable>>,

    /// Registry of committed tables.
    catalog: Catalog,
}

struct Shared {
    state: RwLock<State>,
}

impl Shared {
    fn read_lock(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Internal("state lock poisoned".into()))
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Internal("state lock poisoned".into()))
    }
}

// ------------------------------------------------------------------------------------------------
// Maintenance worker
// ------------------------------------------------------------------------------------------------

/// Work items for the maintenance thread. Flush jobs triggered by rotation
/// carry no reply channel; explicit `flush()` and `compact()` calls block
/// on one.
enum Job {
    Flush(Option<Sender<Result<(), StoreError>>>),
    Compact(Sender<Result<bool, StoreError>>),
}

fn worker_loop(shared: Arc<Shared>, jobs: Receiver<Job>) {
    debug!("maintenance worker started");

    // The loop ends when the store drops its sender; jobs already queued
    // are drained first.
    for job in jobs {
        match job {
            Job::Flush(reply) => {
                let result = flush_all_frozen(&shared);
                match reply {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            error!(%e, "background flush failed");
                        }
                    }
                }
            }
            Job::Compact(reply) => {
                let _ = reply.send(compact_tables(&shared));
            }
        }
    }

    debug!("maintenance worker stopped");
}

/// Flushes frozen memtables oldest-first until none remain.
///
/// The serialization runs without the state lock: the frozen memtable stays
/// readable the whole time and is removed only after its table is
/// registered, so a reader always sees the key in exactly one of the two
/// places.
fn flush_all_frozen(shared: &Shared) -> Result<(), StoreError> {
    loop {
        let (memtable, generation, dir) = {
            let state = shared.read_lock()?;
            let Some(memtable) = state.frozen.last().cloned() else {
                return Ok(());
            };
            (
                memtable,
                state.catalog.allocate_generation(),
                state.catalog.dir().to_path_buf(),
            )
        };

        let wrote = TableWriter::new(&dir, generation).build(memtable.range(None, None))?;

        let mut state = shared.write_lock()?;
        if wrote {
            let table = SsTable::open(&dir, generation)?;
            info!(generation, entries = table.len(), "memtable flushed");
            state.catalog.install_flushed(table);
        }
        state.frozen.pop();
    }
}

/// Merges every committed table into one and retires the inputs.
///
/// Returns `Ok(false)` when fewer than two tables exist. The merged output
/// is written under a fresh (highest) generation before the inputs are
/// deleted, so a crash mid-compaction leaves either the old tables intact
/// or the new table shadowing them — never a gap.
fn compact_tables(shared: &Shared) -> Result<bool, StoreError> {
    let (tables, generation, dir) = {
        let state = shared.read_lock()?;
        if state.catalog.len() < 2 {
            return Ok(false);
        }
        (
            state.catalog.tables().to_vec(),
            state.catalog.allocate_generation(),
            state.catalog.dir().to_path_buf(),
        )
    };

    let consumed: Vec<u64> = tables.iter().map(|t| t.generation()).collect();

    // Newest-first catalog order maps directly onto merge priority.
    let mut sources = Vec::with_capacity(tables.len());
    for (priority, table) in tables.iter().enumerate() {
        let iter = TableIter::new(Arc::clone(table), None, None)?;
        sources.push(PeekedSource::new(priority, iter));
    }
    let survivors = TombstoneFilter::new(MergeIterator::new(sources));

    let wrote = TableWriter::new(&dir, generation).build(survivors)?;

    let mut state = shared.write_lock()?;
    let survivor = if wrote {
        Some(SsTable::open(&dir, generation)?)
    } else {
        // Every entry was deleted; the directory ends up empty of tables.
        None
    };
    info!(
        consumed = consumed.len(),
        generation, wrote, "compaction finished"
    );
    state.catalog.replace(survivor, &consumed);

    Ok(true)
}

// ------------------------------------------------------------------------------------------------
// Scan iterator
// ------------------------------------------------------------------------------------------------

/// Iterator returned by [`Store::scan`]: live key-value pairs in ascending
/// key order, deletions already resolved away.
///
/// The scan is a snapshot of the layers at call time. It holds `Arc`s on
/// the memtables and tables it reads, so it stays valid across concurrent
/// flushes, compactions, and even `close` — but writes made after the call
/// may or may not be observed.
pub struct ScanIter {
    inner: TombstoneFilter<MergeIterator>,
}

impl Iterator for ScanIter {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.inner.next()?;
        // The filter only passes live entries.
        let value = entry.value.unwrap_or_default();
        Some((entry.key, value))
    }
}

// ------------------------------------------------------------------------------------------------
// Store
// ------------------------------------------------------------------------------------------------

/// An embeddable, ordered key-value store backed by one directory.
///
/// All methods take `&self`; the handle is `Send + Sync` and is typically
/// wrapped in an `Arc` to share across threads. Dropping the handle closes
/// the store, flushing buffered writes best-effort; call [`Store::close`]
/// explicitly to observe flush errors.
pub struct Store {
    shared: Arc<Shared>,
    config: StoreConfig,

    /// `None` once close has detached the worker.
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,

    closed: AtomicBool,
}

impl Store {
    /// Opens (or creates) the store at `dir` with default configuration.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with(dir, StoreConfig::default())
    }

    /// Opens (or creates) the store at `dir`.
    ///
    /// Creates the directory if missing, removes crash remnants, loads all
    /// committed tables, and starts the maintenance worker.
    pub fn open_with(dir: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let catalog = Catalog::load(&dir)?;
        info!(
            path = %dir.display(),
            tables = catalog.len(),
            flush_threshold = config.flush_threshold_bytes,
            "store opened"
        );

        let shared = Arc::new(Shared {
            state: RwLock::new(State {
                active: Arc::new(Memtable::new()),
                frozen: Vec::new(),
                catalog,
            }),
        });

        let (tx, rx) = unbounded();
        let worker = std::thread::Builder::new()
            .name("silt-maintenance".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || worker_loop(shared, rx)
            })?;

        Ok(Self {
            shared,
            config,
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        })
    }

    /// Inserts or overwrites the value for `key`.
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<(), StoreError> {
        self.apply(Entry::put(key, value))
    }

    /// Deletes `key` by writing a tombstone.
    ///
    /// Succeeds whether or not the key exists; the tombstone shadows any
    /// older value until compaction drops both.
    pub fn delete(&self, key: impl Into<Vec<u8>>) -> Result<(), StoreError> {
        self.apply(Entry::tombstone(key))
    }

    /// Returns the current value for `key`, or `None` if absent or deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.ensure_open()?;
        let state = self.shared.read_lock()?;

        // Newest layer with any information about the key wins. A tombstone
        // answer (`entry.value == None`) must stop the search, so "found"
        // and "found a value" are distinct here.
        if let Some(entry) = state.active.get(key) {
            return Ok(entry.value);
        }
        for memtable in &state.frozen {
            if let Some(entry) = memtable.get(key) {
                return Ok(entry.value);
            }
        }
        for table in state.catalog.tables() {
            if let Some(entry) = table.get(key)? {
                return Ok(entry.value);
            }
        }

        Ok(None)
    }

    /// Scans live pairs in `[from, to)` in ascending key order.
    ///
    /// `None` bounds are unbounded on that side. An inverted range yields
    /// nothing.
    pub fn scan(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<ScanIter, StoreError> {
        self.ensure_open()?;

        if let (Some(from), Some(to)) = (from, to)
            && from >= to
        {
            return Ok(ScanIter {
                inner: TombstoneFilter::new(MergeIterator::new(Vec::new())),
            });
        }

        let state = self.shared.read_lock()?;

        let mut sources = Vec::with_capacity(2 + state.catalog.len());
        let mut priority = 0usize;

        // Memtable layers are snapshotted eagerly: their iterators borrow
        // the map, and the scan must outlive this lock guard.
        let snapshot: Vec<Entry> = state.active.range(from, to).collect();
        sources.push(PeekedSource::new(priority, snapshot.into_iter()));
        priority += 1;

        for memtable in &state.frozen {
            let snapshot: Vec<Entry> = memtable.range(from, to).collect();
            sources.push(PeekedSource::new(priority, snapshot.into_iter()));
            priority += 1;
        }

        // Tables stream lazily; the Arc keeps each mapping alive for the
        // life of the scan.
        for table in state.catalog.tables() {
            let iter = TableIter::new(Arc::clone(table), from, to)?;
            sources.push(PeekedSource::new(priority, iter));
            priority += 1;
        }

        Ok(ScanIter {
            inner: TombstoneFilter::new(MergeIterator::new(sources)),
        })
    }

    /// Flushes every buffered write to disk, blocking until done.
    ///
    /// Freezes the active memtable (if non-empty) and waits for the worker
    /// to persist all frozen memtables. On return every prior write is in a
    /// committed table.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.freeze_active()?;

        let (tx, rx) = bounded(1);
        self.enqueue(Job::Flush(Some(tx)))?;
        rx.recv()
            .map_err(|_| StoreError::Internal("maintenance worker disconnected".into()))?
    }

    /// Merges all committed tables into one, dropping deleted and shadowed
    /// versions. Blocks until done.
    ///
    /// Returns `Ok(false)` when fewer than two tables exist. Buffered
    /// memtable data is not touched; flush first to include it.
    pub fn compact(&self) -> Result<bool, StoreError> {
        self.ensure_open()?;

        let (tx, rx) = bounded(1);
        self.enqueue(Job::Compact(tx))?;
        rx.recv()
            .map_err(|_| StoreError::Internal("maintenance worker disconnected".into()))?
    }

    /// Flushes buffered writes, stops the worker, and releases all file
    /// handles. Idempotent; every later operation returns
    /// [`StoreError::Closed`].
    pub fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("closing store");

        {
            let mut state = self.shared.write_lock()?;
            if !state.active.is_empty() {
                let full = std::mem::replace(&mut state.active, Arc::new(Memtable::new()));
                state.frozen.insert(0, full);
            }
        }

        // Dropping the sender ends the worker loop after queued jobs drain.
        let sender = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Internal("jobs lock poisoned".into()))?
            .take();
        drop(sender);

        let worker = self
            .worker
            .lock()
            .map_err(|_| StoreError::Internal("worker lock poisoned".into()))?
            .take();
        if let Some(handle) = worker
            && handle.join().is_err()
        {
            error!("maintenance worker panicked");
        }

        // The worker reported background flush errors only to the log;
        // re-run synchronously so anything still frozen either lands on
        // disk or surfaces its error to the caller.
        flush_all_frozen(&self.shared)?;

        let mut state = self.shared.write_lock()?;
        state.frozen.clear();
        state.catalog.clear();

        info!("store closed");
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Internals
    // --------------------------------------------------------------------------------------------

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Writes one entry into the active memtable and rotates when it has
    /// outgrown the threshold.
    fn apply(&self, entry: Entry) -> Result<(), StoreError> {
        self.ensure_open()?;

        let over_threshold = {
            let state = self.shared.read_lock()?;
            state.active.upsert(entry);
            state.active.size_in_bytes() >= self.config.flush_threshold_bytes
        };

        if over_threshold {
            self.rotate()?;
        }
        Ok(())
    }

    /// Freezes the active memtable and queues a background flush. Re-checks
    /// the threshold under the write lock, since a racing writer may have
    /// rotated already.
    fn rotate(&self) -> Result<(), StoreError> {
        {
            let mut state = self.shared.write_lock()?;
            if state.active.size_in_bytes() < self.config.flush_threshold_bytes {
                return Ok(());
            }
            debug!(
                bytes = state.active.size_in_bytes(),
                entries = state.active.len(),
                "rotating memtable"
            );
            let full = std::mem::replace(&mut state.active, Arc::new(Memtable::new()));
            state.frozen.insert(0, full);
        }
        self.enqueue(Job::Flush(None))
    }

    /// Freezes the active memtable unconditionally (if non-empty); used by
    /// the explicit flush path.
    fn freeze_active(&self) -> Result<(), StoreError> {
        let mut state = self.shared.write_lock()?;
        if !state.active.is_empty() {
            let full = std::mem::replace(&mut state.active, Arc::new(Memtable::new()));
            state.frozen.insert(0, full);
        }
        Ok(())
    }

    fn enqueue(&self, job: Job) -> Result<(), StoreError> {
        let guard = self
            .jobs
            .lock()
            .map_err(|_| StoreError::Internal("jobs lock poisoned".into()))?;
        match guard.as_ref() {
            Some(tx) => tx.send(job).map_err(|_| StoreError::Closed),
            None => Err(StoreError::Closed),
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(%e, "close on drop failed");
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
