//! Shared context for running CLI commands.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use log::{info, warn};
use revdex_change::{CHANGES, Change, ExportSite, change_schemas};
use revdex_config::{BackendKind, Config};
use revdex_index::{
    BatchIndexer, FileReadinessStore, IndexCollection, IndexDefinition, IndexError, IndexFactory,
    MemoryIndexFactory, MemoryReadinessStore, QueryOptions, ReadinessStore, RepositoryProvider,
    TantivyIndexFactory, VersionManager,
};

use crate::cli::output::ConsoleReporter;

/// Command execution context built once per CLI invocation.
pub struct CommandContext {
    /// Site directory.
    pub site: PathBuf,
    /// Loaded configuration (defaults if the site has no config file).
    pub config: Config,
}

/// How a command needs the indexes opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Registered only; nothing is opened until a rebuild asks for it.
    Offline,
    /// Started with the configured upgrade policy, without background work.
    Serve,
    /// Started with the newest version open for writes, rebuilt on request.
    Upgrade,
}

/// The version manager and live indexes of a site.
pub struct SiteIndexes {
    /// Version lifecycle of every kind.
    pub manager: VersionManager,
    /// Live change indexes.
    pub changes: Arc<IndexCollection<Change>>,
    /// Storage backend in use.
    pub backend: BackendKind,
}

impl CommandContext {
    /// Loads the configuration of a site and logs its warnings.
    pub fn load(site: &Path) -> Result<Self, ExitCode> {
        let config = Config::load(site).map_err(|e| fail("failed to load configuration", &e))?;
        for warning in config.validate() {
            warn!("{warning}");
        }
        Ok(Self {
            site: site.to_path_buf(),
            config,
        })
    }

    /// Returns query limits from the configuration.
    pub fn query_options(&self) -> QueryOptions {
        let query = &self.config.query;
        QueryOptions::new(query.max_limit, query.max_pages, query.max_terms)
    }

    /// Builds the version manager and opens indexes as `mode` requires.
    ///
    /// The memory backend keeps nothing between runs, so every mode but
    /// [`OpenMode::Offline`] rebuilds the newest version first.
    pub fn open(&self, mode: OpenMode) -> Result<SiteIndexes, ExitCode> {
        let indexes = self
            .build(mode)
            .map_err(|e| fail("failed to open indexes", &e))?;
        if mode == OpenMode::Offline {
            return Ok(indexes);
        }
        if indexes.backend == BackendKind::Memory {
            info!("memory backend: building {CHANGES} in process");
            indexes
                .manager
                .reindex_offline(CHANGES, None)
                .map_err(|e| fail("failed to build in-memory index", &e))?;
        }
        indexes.manager.start().map_err(|e| match e {
            IndexError::NoReadyVersion { .. } => {
                eprintln!("error: {e}");
                ExitCode::FAILURE
            }
            e => fail("failed to start indexes", &e),
        })?;
        Ok(indexes)
    }

    /// Wires the change kind into a new version manager.
    fn build(&self, mode: OpenMode) -> Result<SiteIndexes, IndexError> {
        let backend = self.config.index.backend_kind();
        let index_dir = self.config.index_dir();
        let (store, factory): (Arc<dyn ReadinessStore>, Arc<dyn IndexFactory<Change>>) =
            match backend {
                BackendKind::Tantivy => {
                    let store: Arc<dyn ReadinessStore> =
                        Arc::new(FileReadinessStore::open(&index_dir)?);
                    let factory =
                        TantivyIndexFactory::new(index_dir, CHANGES, Arc::clone(&store));
                    (store, Arc::new(factory))
                }
                BackendKind::Memory => {
                    let store: Arc<dyn ReadinessStore> = Arc::new(MemoryReadinessStore::default());
                    let factory = MemoryIndexFactory::new(CHANGES, Arc::clone(&store));
                    (store, Arc::new(factory))
                }
            };

        let exports = Arc::new(ExportSite::new(&self.site));
        let indexer = BatchIndexer::<Change>::new(
            Arc::clone(&exports) as Arc<dyn RepositoryProvider>,
            exports,
        )
        .threads(self.config.batch.effective_threads())
        .reporter(Arc::new(ConsoleReporter));

        let online_upgrade = match mode {
            OpenMode::Upgrade => true,
            OpenMode::Offline | OpenMode::Serve => self.config.index.online_upgrade,
        };
        let mut manager = VersionManager::new(store, online_upgrade).defer_upgrade();
        let changes = Arc::new(IndexCollection::new(CHANGES));
        let schemas = change_schemas()?;
        manager.register(IndexDefinition {
            schemas,
            collection: Arc::clone(&changes),
            factory,
            indexer: Arc::new(indexer),
        })?;
        Ok(SiteIndexes {
            manager,
            changes,
            backend,
        })
    }
}

/// Prints an error with context and returns the failure exit code.
pub fn fail(context: &str, err: &dyn Display) -> ExitCode {
    eprintln!("error: {context}: {err}");
    ExitCode::FAILURE
}
