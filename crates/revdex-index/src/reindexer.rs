//! Background rebuild of one index version.
//!
//! An [`OnlineReindexer`] repopulates a write index on a dedicated thread while
//! the current search index keeps serving queries. On success the rebuilt
//! version becomes the search index and every other write version is demoted.
//! On failure nothing is promoted and the write index is left registered.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use log::{error, info, warn};

use crate::{
    IndexError,
    batch::SiteIndexer,
    collection::IndexCollection,
    document::Document,
    index::IndexRef,
};

/// Rebuilds one write index version in the background.
pub struct OnlineReindexer<D: Document> {
    /// Document kind name.
    name: String,
    /// Version being rebuilt.
    version: u32,
    /// Indexes of the document kind.
    collection: Arc<IndexCollection<D>>,
    /// Populates the target index.
    indexer: Arc<dyn SiteIndexer<D>>,
    /// Set while a run is in flight.
    running: AtomicBool,
}

/// Clears the running flag when a run ends, even by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a background reindex run.
pub struct ReindexHandle {
    /// Thread running the rebuild.
    thread: JoinHandle<Result<bool, IndexError>>,
}

impl ReindexHandle {
    /// Waits for the run; `Ok(true)` means the version was promoted.
    pub fn join(self) -> Result<bool, IndexError> {
        self.thread
            .join()
            .map_err(|_| IndexError::Invariant("reindex thread panicked".to_string()))?
    }

    /// Returns true once the run has ended.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

impl<D: Document> OnlineReindexer<D> {
    /// Creates an idle reindexer for `version`.
    pub fn new(
        name: impl Into<String>,
        version: u32,
        collection: Arc<IndexCollection<D>>,
        indexer: Arc<dyn SiteIndexer<D>>,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            collection,
            indexer,
            running: AtomicBool::new(false),
        }
    }

    /// Returns the target version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns true while a run is in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts a run on a new thread.
    ///
    /// Returns `None` without doing anything if a run is already in flight.
    pub fn start(self: &Arc<Self>) -> Result<Option<ReindexHandle>, IndexError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(None);
        }
        let this = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("reindex-{}-v{}", self.name, self.version))
            .spawn(move || {
                let _guard = RunningGuard(&this.running);
                this.reindex()
            });
        match spawned {
            Ok(thread) => Ok(Some(ReindexHandle { thread })),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Rebuilds the target version on the calling thread.
    ///
    /// Returns `Ok(true)` if the version was promoted to search.
    pub fn reindex(&self) -> Result<bool, IndexError> {
        let index = self
            .collection
            .write_index(self.version)
            .ok_or_else(|| IndexError::MissingWriteIndex {
                name: self.name.clone(),
                version: self.version,
            })?;

        info!("starting online reindex of {} version {}", self.name, self.version);
        let result = self.indexer.index_all(&index)?;
        if !result.success {
            error!(
                "online reindex of {} version {} failed after {:?}: {} documents indexed, {} failed",
                self.name, self.version, result.elapsed, result.done, result.failed
            );
            return Ok(false);
        }
        if result.failed > 0 {
            warn!(
                "online reindex of {} version {} skipped {} documents",
                self.name, self.version, result.failed
            );
        }
        info!(
            "reindexed {} documents of {} version {} in {:?}",
            result.done, self.name, self.version, result.elapsed
        );
        self.activate(index)?;
        Ok(true)
    }

    /// Promotes the target version without rebuilding it.
    pub fn activate_index(&self) -> Result<(), IndexError> {
        let index = self
            .collection
            .write_index(self.version)
            .ok_or_else(|| IndexError::MissingWriteIndex {
                name: self.name.clone(),
                version: self.version,
            })?;
        self.activate(index)
    }

    /// Makes `index` the search index, then demotes and closes the other
    /// write versions.
    fn activate(&self, index: IndexRef<D>) -> Result<(), IndexError> {
        self.collection.set_search_index(Arc::clone(&index));
        index.mark_ready(true)?;
        for other in self.collection.write_indexes() {
            let version = other.version();
            if version == self.version {
                continue;
            }
            other.mark_ready(false)?;
            if let Some(demoted) = self.collection.remove_write_index(version) {
                demoted.close();
            }
            info!("demoted {} version {version}", self.name);
        }
        info!("using {} version {} for searches", self.name, self.version);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Barrier, time::Duration};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        batch::BatchResult,
        status::{MemoryReadinessStore, ReadinessStore},
        test_support::{FixedIndexer, Item, counting_index, item, memory_index_with_store},
    };

    fn setup(
        success: bool,
    ) -> (
        Arc<IndexCollection<Item>>,
        Arc<MemoryReadinessStore>,
        Arc<OnlineReindexer<Item>>,
    ) {
        let store = Arc::new(MemoryReadinessStore::default());
        let collection = Arc::new(IndexCollection::new("items"));
        let v1 = memory_index_with_store(1, store.clone());
        let v2 = memory_index_with_store(2, store.clone());
        v1.mark_ready(true).unwrap();
        collection.add_write_index(v1.clone()).unwrap();
        collection.add_write_index(v2).unwrap();
        collection.set_search_index(v1);
        let indexer = Arc::new(FixedIndexer::new(BatchResult {
            elapsed: Duration::from_millis(5),
            success,
            done: 100,
            failed: 0,
        }));
        let reindexer = Arc::new(OnlineReindexer::new(
            "items",
            2,
            Arc::clone(&collection),
            indexer,
        ));
        (collection, store, reindexer)
    }

    #[test_log::test]
    fn success_promotes_and_demotes() {
        let (collection, store, reindexer) = setup(true);
        assert!(reindexer.reindex().unwrap());

        assert_eq!(collection.search_index().map(|i| i.version()), Some(2));
        let writes: Vec<u32> = collection.write_indexes().iter().map(|i| i.version()).collect();
        assert_eq!(writes, vec![2]);
        let status = store.read();
        assert!(status.is_ready("items", 2));
        assert!(!status.is_ready("items", 1));
    }

    #[test]
    fn demoted_versions_are_closed() {
        let store = Arc::new(MemoryReadinessStore::default());
        let collection = Arc::new(IndexCollection::new("items"));
        let (v1, counter) = counting_index(1);
        collection.add_write_index(v1.clone()).unwrap();
        collection
            .add_write_index(memory_index_with_store(2, store))
            .unwrap();
        collection.set_search_index(v1);
        let reindexer = OnlineReindexer::new(
            "items",
            2,
            Arc::clone(&collection),
            Arc::new(FixedIndexer::succeeding(1)),
        );

        assert!(reindexer.reindex().unwrap());
        assert_eq!(counter.closes.load(Ordering::SeqCst), 1);
        assert!(collection.write_index(1).is_none());
        let search = collection.search_index().unwrap();
        search.replace(&item(7, "tools", "alice", "open")).unwrap();
    }

    #[test_log::test]
    fn failure_leaves_search_unchanged() {
        let (collection, store, reindexer) = setup(false);
        assert!(!reindexer.reindex().unwrap());

        assert_eq!(collection.search_index().map(|i| i.version()), Some(1));
        let writes: Vec<u32> = collection.write_indexes().iter().map(|i| i.version()).collect();
        assert_eq!(writes, vec![1, 2]);
        assert!(store.read().is_ready("items", 1));
        assert!(!store.read().is_ready("items", 2));
    }

    #[test]
    fn missing_target_is_an_error() {
        let (collection, _, reindexer) = setup(true);
        collection.remove_write_index(2);
        assert!(matches!(
            reindexer.reindex(),
            Err(IndexError::MissingWriteIndex { version: 2, .. })
        ));
    }

    #[test]
    fn start_runs_once_at_a_time() {
        let store = Arc::new(MemoryReadinessStore::default());
        let collection = Arc::new(IndexCollection::new("items"));
        collection
            .add_write_index(memory_index_with_store(2, store))
            .unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let indexer = Arc::new(FixedIndexer::blocking(Arc::clone(&barrier)));
        let reindexer = Arc::new(OnlineReindexer::new("items", 2, collection, indexer));

        let handle = reindexer.start().unwrap().unwrap();
        assert!(reindexer.is_running());
        assert!(reindexer.start().unwrap().is_none());
        barrier.wait();
        assert!(handle.join().unwrap());
        assert!(!reindexer.is_running());
    }
}
