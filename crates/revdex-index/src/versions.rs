//! Index version lifecycle.
//!
//! The [`VersionManager`] decides at startup which schema version of each
//! document kind serves searches and which versions receive writes, and owns
//! the one [`OnlineReindexer`] of each kind. Operator actions on a kind
//! (starting the reindexer, promoting the newest version) are serialized by a
//! per-kind lock that is never held while a rebuild runs.

use std::{
    collections::{BTreeMap, BTreeSet, btree_map::Entry},
    sync::Arc,
};

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::{
    IndexError,
    batch::{BatchResult, SiteIndexer},
    collection::IndexCollection,
    document::Document,
    index::IndexFactory,
    reindexer::{OnlineReindexer, ReindexHandle},
    schema::{SchemaDefinitions, SchemaRef},
    status::ReadinessStore,
};

/// Everything the manager needs to run one document kind.
pub struct IndexDefinition<D: Document> {
    /// Schema history.
    pub schemas: SchemaDefinitions<D>,
    /// Live indexes, shared with query and write paths.
    pub collection: Arc<IndexCollection<D>>,
    /// Opens index versions.
    pub factory: Arc<dyn IndexFactory<D>>,
    /// Rebuilds a version from scratch.
    pub indexer: Arc<dyn SiteIndexer<D>>,
}

/// State of one schema version, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// Schema version.
    pub version: u32,
    /// Marked ready in the readiness metadata.
    pub ready: bool,
    /// Index data exists.
    pub exists: bool,
    /// Serves searches.
    pub search: bool,
    /// Receives writes.
    pub write: bool,
    /// Shipped in a release.
    pub release: bool,
}

/// Type-erased operations on one managed document kind.
trait ManagedKind: Send + Sync {
    /// Chooses search and write versions and opens their indexes.
    ///
    /// With `auto_start` the rebuild of a pending version begins at once.
    fn start(
        &self,
        store: &dyn ReadinessStore,
        online_upgrade: bool,
        auto_start: bool,
    ) -> Result<(), IndexError>;

    /// Starts the reindexer; returns false if there was nothing to do.
    fn start_reindexer(&self, force: bool) -> Result<bool, IndexError>;

    /// Promotes the reindexer's target version without rebuilding it.
    fn activate_latest(&self) -> Result<(), IndexError>;

    /// Waits for a started reindexer, if any.
    fn wait_for_reindexer(&self) -> Option<Result<bool, IndexError>>;

    /// Returns true while a rebuild is in flight.
    fn is_reindexer_running(&self) -> bool;

    /// Reports every known version.
    fn versions(&self, store: &dyn ReadinessStore) -> Vec<VersionInfo>;

    /// Rebuilds one version synchronously, outside the live collection.
    ///
    /// Fails for a version the collection searches or writes.
    fn reindex_offline(&self, version: Option<u32>) -> Result<(u32, BatchResult), IndexError>;

    /// Waits for any rebuild and closes every index.
    fn stop(&self);
}

/// Reindexer bookkeeping of one kind.
struct ReindexState<D: Document> {
    /// The kind's reindexer, created at startup.
    reindexer: Option<Arc<OnlineReindexer<D>>>,
    /// The in-flight or finished run not yet waited for.
    handle: Option<ReindexHandle>,
}

/// A managed document kind.
struct Kind<D: Document> {
    /// Definition supplied at registration.
    def: IndexDefinition<D>,
    /// Reindexer state, guarded for operator actions.
    state: Mutex<ReindexState<D>>,
}

impl<D: Document> Kind<D> {
    /// Returns the kind name.
    fn name(&self) -> &str {
        self.def.schemas.name()
    }

    /// Returns the kind's reindexer, failing if the kind was not started.
    fn reindexer(state: &ReindexState<D>, name: &str) -> Result<Arc<OnlineReindexer<D>>, IndexError> {
        state
            .reindexer
            .clone()
            .ok_or_else(|| IndexError::Invariant(format!("index {name} was not started")))
    }

    /// Fails if a rebuild of this kind is in flight.
    fn ensure_idle(&self, state: &ReindexState<D>) -> Result<(), IndexError> {
        if state.reindexer.as_ref().is_some_and(|r| r.is_running()) {
            return Err(IndexError::ReindexerAlreadyRunning {
                name: self.name().to_string(),
            });
        }
        Ok(())
    }
}

impl<D: Document> ManagedKind for Kind<D> {
    fn start(
        &self,
        store: &dyn ReadinessStore,
        online_upgrade: bool,
        auto_start: bool,
    ) -> Result<(), IndexError> {
        let name = self.name().to_string();
        let status = store.read();

        let mut search: Option<SchemaRef<D>> = None;
        let mut pending: Option<SchemaRef<D>> = None;
        for schema in self.def.schemas.newest_first() {
            if status.is_ready(&name, schema.version()) {
                search = Some(Arc::clone(schema));
                break;
            }
            if online_upgrade && pending.is_none() {
                pending = Some(Arc::clone(schema));
            }
        }
        let search = search.ok_or_else(|| IndexError::NoReadyVersion { name: name.clone() })?;

        let mut write: BTreeMap<u32, SchemaRef<D>> = BTreeMap::new();
        write.insert(search.version(), Arc::clone(&search));
        if let Some(pending) = pending {
            write.insert(pending.version(), pending);
        }

        let mut stale = false;
        for version in self.def.schemas.versions() {
            if !write.contains_key(&version) && self.def.factory.version_exists(version) {
                store.set_ready(&name, version, false);
                stale = true;
            }
        }
        if stale {
            store.save()?;
        }

        for schema in write.values() {
            let index = self.def.factory.create(Arc::clone(schema))?;
            if schema.version() == search.version() {
                self.def.collection.set_search_index(Arc::clone(&index));
            }
            self.def.collection.add_write_index(index)?;
        }

        let target = write.keys().next_back().copied().unwrap_or(search.version());
        let reindexer = Arc::new(OnlineReindexer::new(
            name.clone(),
            target,
            Arc::clone(&self.def.collection),
            Arc::clone(&self.def.indexer),
        ));
        info!(
            "using {name} version {} for searches, writing to {:?}",
            search.version(),
            write.keys().collect::<Vec<_>>()
        );

        let mut state = self.state.lock();
        state.reindexer = Some(Arc::clone(&reindexer));
        if auto_start && target != search.version() {
            info!("starting online upgrade of {name} to version {target}");
            state.handle = reindexer.start()?;
        }
        Ok(())
    }

    fn start_reindexer(&self, force: bool) -> Result<bool, IndexError> {
        let mut state = self.state.lock();
        self.ensure_idle(&state)?;
        let reindexer = Self::reindexer(&state, self.name())?;
        let search = self.def.collection.search_index().map(|i| i.version());
        if !force && search == Some(reindexer.version()) {
            info!(
                "{} already searches version {}; nothing to reindex",
                self.name(),
                reindexer.version()
            );
            return Ok(false);
        }
        match reindexer.start()? {
            Some(handle) => {
                state.handle = Some(handle);
                Ok(true)
            }
            None => Err(IndexError::ReindexerAlreadyRunning {
                name: self.name().to_string(),
            }),
        }
    }

    fn activate_latest(&self) -> Result<(), IndexError> {
        let state = self.state.lock();
        self.ensure_idle(&state)?;
        Self::reindexer(&state, self.name())?.activate_index()
    }

    fn wait_for_reindexer(&self) -> Option<Result<bool, IndexError>> {
        let handle = self.state.lock().handle.take()?;
        Some(handle.join())
    }

    fn is_reindexer_running(&self) -> bool {
        self.state
            .lock()
            .reindexer
            .as_ref()
            .is_some_and(|r| r.is_running())
    }

    fn versions(&self, store: &dyn ReadinessStore) -> Vec<VersionInfo> {
        let status = store.read();
        let search = self.def.collection.search_index().map(|i| i.version());
        self.def
            .schemas
            .newest_first()
            .map(|schema| {
                let version = schema.version();
                VersionInfo {
                    version,
                    ready: status.is_ready(self.name(), version),
                    exists: self.def.factory.version_exists(version),
                    search: search == Some(version),
                    write: self.def.collection.write_index(version).is_some(),
                    release: schema.is_release(),
                }
            })
            .collect()
    }

    fn reindex_offline(&self, version: Option<u32>) -> Result<(u32, BatchResult), IndexError> {
        let schema = match version {
            Some(v) => self.def.schemas.get(v)?,
            None => self.def.schemas.latest()?,
        };
        let version = schema.version();
        let collection = &self.def.collection;
        if collection.write_index(version).is_some()
            || collection.search_index().is_some_and(|i| i.version() == version)
        {
            return Err(IndexError::VersionInUse {
                name: self.name().to_string(),
                version,
            });
        }
        info!("reindexing {} version {version}", self.name());
        let index = self.def.factory.create(schema)?;
        index.delete_all()?;
        let result = self.def.indexer.index_all(&index);
        let outcome = result.and_then(|result| {
            index.mark_ready(result.success)?;
            Ok(result)
        });
        index.close();
        let result = outcome?;
        if result.success {
            info!(
                "reindexed {} documents of {} version {version} in {:?}",
                result.done,
                self.name(),
                result.elapsed
            );
        } else {
            error!(
                "reindex of {} version {version} failed: {} documents indexed, {} failed",
                self.name(),
                result.done,
                result.failed
            );
        }
        Ok((version, result))
    }

    fn stop(&self) {
        if let Some(Err(e)) = self.wait_for_reindexer() {
            warn!("reindexer of {} ended with error: {e}", self.name());
        }
        self.def.collection.close();
    }
}

/// Owns the version lifecycle of every document kind.
pub struct VersionManager {
    /// Readiness metadata.
    store: Arc<dyn ReadinessStore>,
    /// Whether newer schema versions are rebuilt in the background.
    online_upgrade: bool,
    /// Open pending versions for writes but leave their rebuild to the operator.
    deferred: bool,
    /// Managed kinds by name.
    kinds: BTreeMap<String, Box<dyn ManagedKind>>,
}

impl VersionManager {
    /// Creates a manager with no registered kinds.
    pub fn new(store: Arc<dyn ReadinessStore>, online_upgrade: bool) -> Self {
        Self {
            store,
            online_upgrade,
            deferred: false,
            kinds: BTreeMap::new(),
        }
    }

    /// Opens pending versions at startup without rebuilding them.
    ///
    /// The rebuild then waits for [`VersionManager::start_reindexer`]. Used by
    /// one-shot tools that must not start background work on every run.
    pub fn defer_upgrade(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Registers a document kind.
    pub fn register<D: Document>(&mut self, def: IndexDefinition<D>) -> Result<(), IndexError> {
        let name = def.schemas.name().to_string();
        if def.schemas.versions().is_empty() {
            return Err(IndexError::NoSchema { name });
        }
        match self.kinds.entry(name) {
            Entry::Occupied(slot) => Err(IndexError::Invariant(format!(
                "index {} registered twice",
                slot.key()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(Kind {
                    def,
                    state: Mutex::new(ReindexState {
                        reindexer: None,
                        handle: None,
                    }),
                }));
                Ok(())
            }
        }
    }

    /// Returns the registered kind names.
    pub fn names(&self) -> BTreeSet<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }

    /// Opens the indexes of every kind.
    ///
    /// Fails if some kind has no ready version.
    pub fn start(&self) -> Result<(), IndexError> {
        for kind in self.kinds.values() {
            kind.start(
                self.store.as_ref(),
                self.online_upgrade,
                self.online_upgrade && !self.deferred,
            )?;
        }
        Ok(())
    }

    /// Looks up a kind.
    fn kind(&self, name: &str) -> Result<&dyn ManagedKind, IndexError> {
        self.kinds
            .get(name)
            .map(|kind| kind.as_ref())
            .ok_or_else(|| IndexError::UnknownIndex {
                name: name.to_string(),
            })
    }

    /// Starts the online reindexer of a kind.
    ///
    /// Returns false if the kind already searches the reindexer's target
    /// version and `force` is not set.
    pub fn start_reindexer(&self, name: &str, force: bool) -> Result<bool, IndexError> {
        self.kind(name)?.start_reindexer(force)
    }

    /// Promotes the newest write version of a kind without rebuilding it.
    pub fn activate_latest_index(&self, name: &str) -> Result<(), IndexError> {
        self.kind(name)?.activate_latest()
    }

    /// Waits for the kind's started reindexer.
    ///
    /// Returns `None` if no run was started since the last wait.
    pub fn wait_for_reindexer(&self, name: &str) -> Result<Option<bool>, IndexError> {
        self.kind(name)?.wait_for_reindexer().transpose()
    }

    /// Returns true while a rebuild of the kind is in flight.
    pub fn is_reindexer_running(&self, name: &str) -> Result<bool, IndexError> {
        Ok(self.kind(name)?.is_reindexer_running())
    }

    /// Reports every schema version of a kind, newest first.
    pub fn versions(&self, name: &str) -> Result<Vec<VersionInfo>, IndexError> {
        Ok(self.kind(name)?.versions(self.store.as_ref()))
    }

    /// Rebuilds one version of a kind synchronously; the newest by default.
    ///
    /// Works without [`VersionManager::start`], so a site with no ready
    /// version can be brought up. Once started, versions that serve searches
    /// or receive writes are refused; use the online reindexer for those.
    pub fn reindex_offline(
        &self,
        name: &str,
        version: Option<u32>,
    ) -> Result<(u32, BatchResult), IndexError> {
        self.kind(name)?.reindex_offline(version)
    }

    /// Waits for running rebuilds and closes every index.
    pub fn stop(&self) {
        for kind in self.kinds.values() {
            kind.stop();
        }
    }
}
