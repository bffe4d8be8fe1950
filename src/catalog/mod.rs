//! # Table Catalog Module
//!
//! The catalog is the authoritative registry of committed SSTables for one
//! store directory. It owns the open [`SsTable`] handles, keeps them ordered
//! **newest generation first** (read precedence order), and hands out fresh
//! generation numbers to the flush and compaction paths.
//!
//! ## Startup recovery
//!
//! [`Catalog::load`] scans the directory once. Anything that is not a
//! complete, readable `data-N` / `index-N` pair is a crash remnant and is
//! deleted on the spot:
//!
//! - files still carrying the `.tmp` staging suffix,
//! - a data or index file whose partner is missing,
//! - a pair whose index fails validation on open.
//!
//! Because the writer renames the index file last, an interrupted flush or
//! compaction can only ever leave remnants of these three shapes; deleting
//! them restores exactly the state before the interrupted operation began.
//!
//! ## Generation numbers
//!
//! Generations are allocated from an atomic counter seeded at load time to
//! one past the highest generation on disk. They only ever grow, so a table
//! written by compaction always shadows the tables it replaced.


use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::sstable::{DATA_PREFIX, INDEX_PREFIX, SsTable, TMP_SUFFIX, data_path, index_path};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying I/O error while scanning or cleaning the directory.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ------------------------------------------------------------------------------------------------
// Catalog
// ------------------------------------------------------------------------------------------------

/// Registry of committed tables for one store directory.
///
/// Mutation (install, replace, clear) requires `&mut self`; the store wraps
/// the catalog in its state lock, so handles cloned out of [`Catalog::tables`]
/// stay valid after the lock is released — the `Arc` keeps the mapping alive
/// even if a concurrent compaction unregisters the table.
pub struct Catalog {
    /// Store directory both file scans and new tables are rooted at.
    dir: PathBuf,

    /// Open tables, newest generation first.
    tables: Vec<Arc<SsTable>>,

    /// Next generation to hand out.
    next_generation: AtomicU64,
}

impl Catalog {
    /// Scans `dir`, deletes crash remnants, opens every surviving pair and
    /// returns the catalog with tables ordered newest first.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let dir = dir.into();

        let mut data_gens = Vec::new();
        let mut index_gens = Vec::new();

        for dirent in fs::read_dir(&dir)? {
            let dirent = dirent?;
            let name = dirent.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if name.ends_with(TMP_SUFFIX) {
                warn!(file = name, "removing staging remnant");
                fs::remove_file(dirent.path())?;
                continue;
            }

            if let Some(generation) = parse_generation(name, DATA_PREFIX) {
                data_gens.push(generation);
            } else if let Some(generation) = parse_generation(name, INDEX_PREFIX) {
                index_gens.push(generation);
            }
        }

        // A generation counts only when both halves of the pair exist.
        let mut tables = Vec::new();
        let mut max_generation = 0u64;

        for &generation in &data_gens {
            if !index_gens.contains(&generation) {
                warn!(generation, "removing data file without index");
                fs::remove_file(data_path(&dir, generation))?;
                continue;
            }

            match SsTable::open(&dir, generation) {
                Ok(table) => {
                    max_generation = max_generation.max(generation);
                    tables.push(Arc::new(table));
                }
                Err(e) => {
                    warn!(generation, %e, "removing unreadable table pair");
                    fs::remove_file(data_path(&dir, generation))?;
                    fs::remove_file(index_path(&dir, generation))?;
                }
            }
        }

        for &generation in &index_gens {
            if !data_gens.contains(&generation) {
                warn!(generation, "removing index file without data");
                fs::remove_file(index_path(&dir, generation))?;
            }
        }

        tables.sort_by(|a, b| b.generation().cmp(&a.generation()));

        info!(
            path = %dir.display(),
            tables = tables.len(),
            next_generation = max_generation + 1,
            "catalog loaded"
        );

        Ok(Self {
            dir,
            tables,
            next_generation: AtomicU64::new(max_generation + 1),
        })
    }

    /// Store directory this catalog manages.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open tables, newest generation first.
    pub fn tables(&self) -> &[Arc<SsTable>] {
        &self.tables
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` when no tables are registered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Hands out the next generation number.
    ///
    /// Shared access: the flush path allocates while holding only a read
    /// lock on the store state.
    pub fn allocate_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a freshly flushed table as the newest.
    ///
    /// The flush path allocates generations in order and installs them in
    /// order, so pushing to the front preserves newest-first order.
    pub fn install_flushed(&mut self, table: SsTable) {
        debug!(
            generation = table.generation(),
            entries = table.len(),
            "table registered"
        );
        self.tables.insert(0, Arc::new(table));
    }

    /// Swaps the tables consumed by a compaction for its survivor.
    ///
    /// `survivor` is `None` when every merged entry was a tombstone and no
    /// output table was written. The consumed generations are unregistered
    /// first, then their files deleted; deletion failures are logged and
    /// ignored since the load-time scan ignores shadowed generations anyway.
    pub fn replace(&mut self, survivor: Option<SsTable>, consumed: &[u64]) {
        self.tables
            .retain(|table| !consumed.contains(&table.generation()));

        if let Some(table) = survivor {
            debug!(
                generation = table.generation(),
                entries = table.len(),
                replaced = consumed.len(),
                "compacted table registered"
            );
            self.tables.insert(0, Arc::new(table));
            self.tables
                .sort_by(|a, b| b.generation().cmp(&a.generation()));
        }

        for &generation in consumed {
            if let Err(e) = fs::remove_file(data_path(&self.dir, generation)) {
                warn!(generation, %e, "failed to delete consumed data file");
            }
            if let Err(e) = fs::remove_file(index_path(&self.dir, generation)) {
                warn!(generation, %e, "failed to delete consumed index file");
            }
        }
    }

    /// Drops every open handle, releasing the file mappings. Files on disk
    /// are untouched; the next [`Catalog::load`] picks them up again.
    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

/// Parses `N` out of `prefix-N`, rejecting anything else.
fn parse_generation(name: &str, prefix: &str) -> Option<u64> {
    name.strip_prefix(prefix)?.parse().ok()
}
