//! Batch reindexing.
//!
//! The [`BatchIndexer`] rebuilds one index version from the repositories of a
//! site. Repositories are processed in parallel on a bounded worker pool. For
//! each one it:
//! 1. Opens the repository and maps commit ids to the documents whose current
//!    revision is that commit
//! 2. Walks the commit graph from every branch tip, indexing documents as
//!    their commits are reached
//! 3. Indexes documents whose commits the walk never reached
//!
//! A document that fails to resolve or index is counted and skipped. A
//! repository that fails to open or walk is logged and marks the batch as
//! unsuccessful without stopping other repositories. A worker panic is
//! reported as an error once every repository has finished.

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use rayon::{ThreadPoolBuilder, prelude::*};

use crate::{IndexError, document::Document, index::IndexRef};

/// Hex id of a commit.
pub type ObjectId = String;

/// Line counts for one file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Path of the file.
    pub path: String,
    /// Lines added.
    pub added: u32,
    /// Lines deleted.
    pub deleted: u32,
}

/// An opened repository.
pub trait Repository: Send {
    /// Returns the repository name.
    fn name(&self) -> &str;

    /// Returns the commit at the tip of every branch.
    fn branch_tips(&self) -> Result<Vec<ObjectId>, IndexError>;

    /// Returns the parents of a commit.
    fn parents(&self, commit: &str) -> Result<Vec<ObjectId>, IndexError>;

    /// Returns the files a commit changed relative to its first parent.
    fn diff(&self, commit: &str) -> Result<Vec<FileDiff>, IndexError>;
}

/// Breadth-first walk over a commit graph.
///
/// Every reachable commit is returned exactly once.
pub struct RevWalk<'a> {
    /// Repository being walked.
    repo: &'a dyn Repository,
    /// Commits waiting to be visited.
    queue: VecDeque<ObjectId>,
    /// Commits already queued.
    seen: HashSet<ObjectId>,
}

impl<'a> RevWalk<'a> {
    /// Creates an empty walk.
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self {
            repo,
            queue: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Adds a starting point.
    pub fn mark_start(&mut self, commit: ObjectId) {
        if self.seen.insert(commit.clone()) {
            self.queue.push_back(commit);
        }
    }

    /// Returns the next commit, or `None` when the walk is done.
    pub fn next(&mut self) -> Result<Option<ObjectId>, IndexError> {
        let Some(commit) = self.queue.pop_front() else {
            return Ok(None);
        };
        for parent in self.repo.parents(&commit)? {
            self.mark_start(parent);
        }
        Ok(Some(commit))
    }
}

/// Opens repositories by name.
pub trait RepositoryProvider: Send + Sync {
    /// Lists every repository name.
    fn repositories(&self) -> Result<Vec<String>, IndexError>;

    /// Opens a repository, failing with `RepositoryNotFound` if absent.
    fn open(&self, name: &str) -> Result<Box<dyn Repository>, IndexError>;
}

/// Finds and hydrates the documents of a repository.
pub trait DocumentLoader<D: Document>: Send + Sync {
    /// Maps commit ids to the documents whose current revision they are.
    fn documents_by_commit(
        &self,
        repo: &dyn Repository,
    ) -> Result<BTreeMap<ObjectId, Vec<D>>, IndexError>;

    /// Fills in fields derived from the commit, such as changed files.
    fn resolve(&self, repo: &dyn Repository, commit: &str, doc: D) -> Result<D, IndexError>;

    /// Expected number of documents, for progress display.
    fn document_hint(&self) -> Option<usize> {
        None
    }
}

/// Rebuilds a whole index version.
pub trait SiteIndexer<D: Document>: Send + Sync {
    /// Indexes every document of the site into `index`.
    fn index_all(&self, index: &IndexRef<D>) -> Result<BatchResult, IndexError>;
}

/// Outcome of a batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Wall-clock time of the run.
    pub elapsed: Duration,
    /// False if any repository failed as a whole.
    pub success: bool,
    /// Documents indexed.
    pub done: usize,
    /// Documents that failed.
    pub failed: usize,
}

/// A progress counter updated concurrently by workers.
#[derive(Debug)]
pub struct Task {
    /// Counter name for display.
    name: &'static str,
    /// Completed units.
    done: AtomicUsize,
    /// Expected units, if known.
    total: Option<usize>,
}

impl Task {
    /// Creates a counter.
    pub fn new(name: &'static str, total: Option<usize>) -> Self {
        Self {
            name,
            done: AtomicUsize::new(0),
            total,
        }
    }

    /// Records one completed unit, returning the new count.
    pub fn increment(&self) -> usize {
        self.done.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the completed count.
    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    /// Returns the expected count, if known.
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// Returns the counter name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The three counters of a batch run.
#[derive(Debug)]
pub struct BatchProgress {
    /// Repositories finished.
    pub repositories: Task,
    /// Documents indexed.
    pub documents: Task,
    /// Documents that failed.
    pub failed: Task,
}

impl BatchProgress {
    /// Creates counters with optional totals.
    pub fn new(repositories: Option<usize>, documents: Option<usize>) -> Self {
        Self {
            repositories: Task::new("repositories", repositories),
            documents: Task::new("documents", documents),
            failed: Task::new("failed", None),
        }
    }
}

/// Callback for reporting batch progress.
///
/// Called concurrently from worker threads.
pub trait ProgressReporter: Send + Sync {
    /// Called after a document was indexed or failed.
    fn on_document(&self, progress: &BatchProgress);

    /// Called when a document could not be indexed.
    fn on_document_error(&self, key: &str, error: &IndexError);

    /// Called when a repository is finished.
    fn on_repository_done(&self, name: &str, progress: &BatchProgress);

    /// Called when the batch is complete.
    fn on_complete(&self, result: &BatchResult);
}

/// A no-op progress reporter.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn on_document(&self, _progress: &BatchProgress) {}
    fn on_document_error(&self, _key: &str, _error: &IndexError) {}
    fn on_repository_done(&self, _name: &str, _progress: &BatchProgress) {}
    fn on_complete(&self, _result: &BatchResult) {}
}

/// How one repository's unit of work ended.
enum UnitOutcome {
    /// Every document was attempted.
    Done,
    /// The repository could not be processed.
    Failed,
    /// The worker panicked.
    Panicked,
}

/// Reindexes documents from repositories on a worker pool.
pub struct BatchIndexer<D: Document> {
    /// Repository source.
    provider: Arc<dyn RepositoryProvider>,
    /// Document source.
    loader: Arc<dyn DocumentLoader<D>>,
    /// Worker threads; zero means one per CPU.
    threads: usize,
    /// Progress sink.
    reporter: Arc<dyn ProgressReporter>,
    /// Restricts the run to these repositories.
    only: Option<Vec<String>>,
}

impl<D: Document> BatchIndexer<D> {
    /// Creates an indexer over every repository of `provider`.
    pub fn new(provider: Arc<dyn RepositoryProvider>, loader: Arc<dyn DocumentLoader<D>>) -> Self {
        Self {
            provider,
            loader,
            threads: 0,
            reporter: Arc::new(SilentReporter),
            only: None,
        }
    }

    /// Sets the worker pool size; zero means one per CPU.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Sets the progress reporter.
    pub fn reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Restricts the run to the named repositories.
    pub fn only(mut self, repositories: Vec<String>) -> Self {
        self.only = Some(repositories);
        self
    }

    /// Indexes every selected repository into `index`.
    ///
    /// Writes are staged while workers run and flushed once at the end.
    pub fn run(&self, index: &IndexRef<D>) -> Result<BatchResult, IndexError> {
        let start = Instant::now();
        let repositories = match &self.only {
            Some(names) => names.clone(),
            None => self.provider.repositories()?,
        };
        let progress = BatchProgress::new(Some(repositories.len()), self.loader.document_hint());
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("batch-indexer-{i}"))
            .build()?;

        info!(
            "indexing {} repositories into version {} on {} threads",
            repositories.len(),
            index.version(),
            pool.current_num_threads()
        );

        index.defer_commits();
        let outcomes: Vec<(&String, UnitOutcome)> = pool.install(|| {
            repositories
                .par_iter()
                .map(|name| (name, self.run_unit(index, name, &progress)))
                .collect()
        });
        index.flush()?;

        let success = outcomes
            .iter()
            .all(|(_, outcome)| matches!(outcome, UnitOutcome::Done));
        let result = BatchResult {
            elapsed: start.elapsed(),
            success,
            done: progress.documents.done(),
            failed: progress.failed.done(),
        };
        self.reporter.on_complete(&result);

        if let Some((name, _)) = outcomes
            .iter()
            .find(|(_, outcome)| matches!(outcome, UnitOutcome::Panicked))
        {
            return Err(IndexError::WorkerPanicked {
                repository: (*name).clone(),
            });
        }
        Ok(result)
    }

    /// Runs one repository, catching failures and panics.
    fn run_unit(&self, index: &IndexRef<D>, name: &str, progress: &BatchProgress) -> UnitOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.index_repository(index, name, progress)
        }));
        let outcome = match result {
            Ok(Ok(())) => UnitOutcome::Done,
            Ok(Err(err)) => {
                error!("failed to index repository {name}: {err}");
                UnitOutcome::Failed
            }
            Err(_) => {
                error!("worker panicked while indexing repository {name}");
                UnitOutcome::Panicked
            }
        };
        progress.repositories.increment();
        self.reporter.on_repository_done(name, progress);
        outcome
    }

    /// Walks one repository and indexes its documents.
    fn index_repository(
        &self,
        index: &IndexRef<D>,
        name: &str,
        progress: &BatchProgress,
    ) -> Result<(), IndexError> {
        let repo = self.provider.open(name)?;
        let mut by_commit = self.loader.documents_by_commit(repo.as_ref())?;
        debug!("{name}: {} commits with documents", by_commit.len());

        let mut walk = RevWalk::new(repo.as_ref());
        for tip in repo.branch_tips()? {
            walk.mark_start(tip);
        }
        while let Some(commit) = walk.next()? {
            if let Some(docs) = by_commit.remove(&commit) {
                self.index_documents(index, repo.as_ref(), &commit, docs, progress);
            }
        }

        if !by_commit.is_empty() {
            debug!("{name}: {} commits not reachable from branches", by_commit.len());
        }
        for (commit, docs) in by_commit {
            self.index_documents(index, repo.as_ref(), &commit, docs, progress);
        }
        Ok(())
    }

    /// Resolves and indexes the documents of one commit.
    fn index_documents(
        &self,
        index: &IndexRef<D>,
        repo: &dyn Repository,
        commit: &str,
        docs: Vec<D>,
        progress: &BatchProgress,
    ) {
        for doc in docs {
            let key = doc.key();
            let result = self
                .loader
                .resolve(repo, commit, doc)
                .and_then(|resolved| index.replace(&resolved));
            match result {
                Ok(()) => {
                    progress.documents.increment();
                }
                Err(err) => {
                    progress.failed.increment();
                    warn!("failed to index {key} in {}: {err}", repo.name());
                    self.reporter.on_document_error(&key.to_string(), &err);
                }
            }
            self.reporter.on_document(progress);
        }
    }
}

impl<D: Document> SiteIndexer<D> for BatchIndexer<D> {
    fn index_all(&self, index: &IndexRef<D>) -> Result<BatchResult, IndexError> {
        self.run(index)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::{
        FakeLoader, FakeProvider, FakeRepo, Item, counting_index, memory_index, sample_items,
    };

    #[test]
    fn walk_visits_each_commit_once() {
        let repo = FakeRepo::linear("tools", &["c3", "c2", "c1"]).with_merge("m", &["c3", "c2"]);
        let mut walk = RevWalk::new(&repo);
        walk.mark_start("m".into());
        walk.mark_start("c3".into());
        let mut seen = Vec::new();
        while let Some(commit) = walk.next().unwrap() {
            seen.push(commit);
        }
        assert_eq!(seen, vec!["m", "c3", "c2", "c1"]);
    }

    #[test]
    fn indexes_reachable_and_orphaned_documents() {
        let items = sample_items();
        let index = memory_index(1, &[]);
        let provider = FakeProvider::from_items(&items);
        let loader = FakeLoader::new(&items).orphan(items[0].id);
        let result = BatchIndexer::<Item>::new(Arc::new(provider), Arc::new(loader))
            .threads(2)
            .run(&index)
            .unwrap();
        assert!(result.success);
        assert_eq!(result.done, items.len());
        assert_eq!(result.failed, 0);
        assert_eq!(crate::test_support::count_all(&index), items.len());
    }

    #[test]
    fn missing_repository_fails_batch_but_not_others() {
        let items = sample_items();
        let index = memory_index(1, &[]);
        let provider = FakeProvider::from_items(&items).with_missing("ghost");
        let loader = FakeLoader::new(&items);
        let result = BatchIndexer::<Item>::new(Arc::new(provider), Arc::new(loader))
            .threads(2)
            .run(&index)
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.done, items.len());
    }

    #[test]
    fn panicking_worker_surfaces_after_bookkeeping() {
        let items = sample_items();
        let index = memory_index(1, &[]);
        let provider = FakeProvider::from_items(&items).with_panicking("boom");
        let loader = FakeLoader::new(&items);
        let err = BatchIndexer::<Item>::new(Arc::new(provider), Arc::new(loader))
            .threads(2)
            .run(&index)
            .unwrap_err();
        assert!(matches!(err, IndexError::WorkerPanicked { repository } if repository == "boom"));
        assert_eq!(crate::test_support::count_all(&index), items.len());
    }

    #[test]
    fn writes_are_flushed_once() {
        let items = sample_items();
        let (index, counter) = counting_index(1);
        let provider = FakeProvider::from_items(&items);
        let loader = FakeLoader::new(&items);
        let result = BatchIndexer::<Item>::new(Arc::new(provider), Arc::new(loader))
            .threads(3)
            .run(&index)
            .unwrap();
        assert!(result.success);
        assert_eq!(counter.deferrals.load(Ordering::SeqCst), 1);
        assert_eq!(counter.flushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn task_counts() {
        let task = Task::new("documents", Some(3));
        assert_eq!(task.increment(), 1);
        assert_eq!(task.increment(), 2);
        assert_eq!(task.done(), 2);
        assert_eq!(task.total(), Some(3));
        assert_eq!(task.name(), "documents");
    }
}
