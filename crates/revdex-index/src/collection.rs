//! Live search and write index sets.
//!
//! An [`IndexCollection`] holds the one index version serving reads and the
//! set of versions receiving writes. The search pointer is swapped atomically
//! and read without locking; the write set sits behind a read-write lock.

use std::{
    collections::{BTreeMap, btree_map::Entry},
    mem,
    sync::Arc,
};

use arc_swap::ArcSwapOption;
use parking_lot::RwLock;

use crate::{IndexError, document::Document, index::IndexRef};

/// Search and write indexes of one document kind.
pub struct IndexCollection<D: Document> {
    /// Document kind name.
    name: String,
    /// Index serving reads.
    search: ArcSwapOption<IndexRef<D>>,
    /// Indexes receiving writes, keyed by version.
    write: RwLock<BTreeMap<u32, IndexRef<D>>>,
}

impl<D: Document> IndexCollection<D> {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            search: ArcSwapOption::empty(),
            write: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the document kind name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the index serving reads, if one is set.
    pub fn search_index(&self) -> Option<IndexRef<D>> {
        self.search.load_full().map(|index| Arc::clone(&*index))
    }

    /// Atomically replaces the index serving reads.
    pub fn set_search_index(&self, index: IndexRef<D>) {
        self.search.store(Some(Arc::new(index)));
    }

    /// Returns all write indexes in ascending version order.
    pub fn write_indexes(&self) -> Vec<IndexRef<D>> {
        self.write.read().values().cloned().collect()
    }

    /// Returns the write index for a version.
    pub fn write_index(&self, version: u32) -> Option<IndexRef<D>> {
        self.write.read().get(&version).cloned()
    }

    /// Registers a write index.
    ///
    /// Registering a version twice is a programming error.
    pub fn add_write_index(&self, index: IndexRef<D>) -> Result<(), IndexError> {
        let version = index.version();
        match self.write.write().entry(version) {
            Entry::Occupied(_) => Err(IndexError::DuplicateVersion { version }),
            Entry::Vacant(slot) => {
                slot.insert(index);
                Ok(())
            }
        }
    }

    /// Unregisters a write index; absent versions are ignored.
    pub fn remove_write_index(&self, version: u32) -> Option<IndexRef<D>> {
        self.write.write().remove(&version)
    }

    /// Closes every reachable index exactly once and empties the collection.
    pub fn close(&self) {
        let mut reachable: BTreeMap<u32, IndexRef<D>> = BTreeMap::new();
        if let Some(search) = self.search.swap(None) {
            reachable.insert(search.version(), Arc::clone(&*search));
        }
        for (version, index) in mem::take(&mut *self.write.write()) {
            reachable.entry(version).or_insert(index);
        }
        for index in reachable.into_values() {
            index.close();
        }
    }
}
