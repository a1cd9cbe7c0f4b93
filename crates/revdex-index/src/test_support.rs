//! Shared fixtures for unit tests.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc, Barrier,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    IndexError,
    batch::{
        BatchResult, DocumentLoader, FileDiff, ObjectId, Repository, RepositoryProvider,
        SiteIndexer,
    },
    document::Document,
    error::QueryParseError,
    field::FieldDef,
    index::{Index, IndexRef},
    memory::MemoryIndex,
    predicate::{LocalPredicate, Predicate},
    schema::{Schema, SchemaDefinitions, SchemaRef},
    source::{DataSource, QueryOptions},
    status::{MemoryReadinessStore, ReadinessStore},
};

/// A small review-like document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i32,
    pub project: String,
    pub owner: String,
    pub status: String,
    pub message: String,
    pub hashtags: Vec<String>,
}

impl Document for Item {
    type Key = i32;

    fn key(&self) -> i32 {
        self.id
    }
}

pub fn item(id: i32, project: &str, owner: &str, status: &str) -> Item {
    Item {
        id,
        project: project.to_string(),
        owner: owner.to_string(),
        status: status.to_string(),
        message: String::new(),
        hashtags: Vec::new(),
    }
}

fn with_message(mut item: Item, message: &str, hashtags: &[&str]) -> Item {
    item.message = message.to_string();
    item.hashtags = hashtags.iter().map(|h| (*h).to_string()).collect();
    item
}

pub fn sample_items() -> Vec<Item> {
    vec![
        with_message(item(1, "tools", "alice", "open"), "Fix crash in parser", &[]),
        with_message(item(2, "tools", "bob", "merged"), "Add feature flag", &[]),
        with_message(item(3, "core", "carol", "open"), "fix typo", &["bug"]),
        with_message(item(4, "tools", "alice", "abandoned"), "Refactor lexer", &[]),
        with_message(item(5, "core", "bob", "open"), "docs: update readme", &[]),
        with_message(item(6, "tools", "dave", "open"), "fix build on windows", &["bug", "ci"]),
        with_message(item(7, "web", "alice", "merged"), "New landing page", &[]),
        with_message(item(8, "tools", "carol", "open"), "bump deps", &["ci"]),
        with_message(item(9, "web", "bob", "open"), "fix-css layout", &[]),
        with_message(item(10, "core", "alice", "merged"), "stabilize fix_flaky test", &[]),
    ]
}

fn item_fields(version: u32) -> Vec<FieldDef<Item>> {
    let mut fields = vec![
        FieldDef::integer("id").stored().build(|d: &Item| Some(d.id)),
        FieldDef::exact("project").build(|d: &Item| Some(d.project.clone())),
        FieldDef::exact("owner").build(|d: &Item| Some(d.owner.clone())),
        FieldDef::exact("status").build(|d: &Item| Some(d.status.clone())),
        FieldDef::full_text("message").build(|d: &Item| Some(d.message.clone())),
    ];
    if version >= 2 {
        fields.push(FieldDef::exact("hashtag").build_repeatable(|d: &Item| d.hashtags.clone()));
    }
    fields
}

/// Version 1 lacks `hashtag`; version 2 adds it and is unreleased.
fn build_schema(version: u32) -> Schema<Item> {
    Schema::new(version, item_fields(version))
        .unwrap()
        .with_release(version < 2)
}

pub fn item_schema(version: u32) -> SchemaRef<Item> {
    Arc::new(build_schema(version))
}

pub fn item_definitions() -> SchemaDefinitions<Item> {
    SchemaDefinitions::new("items", vec![build_schema(1), build_schema(2)]).unwrap()
}

/// A field predicate resolved against the newest schema.
pub fn field(name: &str, value: &str) -> Predicate<Item> {
    let schema = item_schema(2);
    Predicate::field(schema.field(name).unwrap(), value).unwrap()
}

/// Owner equality that no index can answer.
pub struct LocalOwner(pub String);

impl LocalPredicate<Item> for LocalOwner {
    fn matches(&self, doc: &Item) -> bool {
        doc.owner == self.0
    }

    fn describe(&self) -> String {
        format!("owner~{}", self.0)
    }
}

pub fn memory_index(version: u32, items: &[Item]) -> IndexRef<Item> {
    let index = memory_index_with_store(version, Arc::new(MemoryReadinessStore::default()));
    for doc in items {
        index.replace(doc).unwrap();
    }
    index
}

pub fn memory_index_with_store(version: u32, store: Arc<MemoryReadinessStore>) -> IndexRef<Item> {
    let store: Arc<dyn ReadinessStore> = store;
    Arc::new(MemoryIndex::new("items", item_schema(version), store))
}

/// Counts every document of an index.
pub fn count_all(index: &IndexRef<Item>) -> usize {
    let everything = Predicate::not(field("owner", ""));
    index
        .get_source(&everything, &QueryOptions::default())
        .unwrap()
        .cardinality()
}

/// An index that only counts lifecycle calls.
pub struct CountingIndex {
    schema: SchemaRef<Item>,
    pub closes: AtomicUsize,
    pub deferrals: AtomicUsize,
    pub flushes: AtomicUsize,
}

impl Index<Item> for CountingIndex {
    fn schema(&self) -> SchemaRef<Item> {
        Arc::clone(&self.schema)
    }

    fn replace(&self, _doc: &Item) -> Result<(), IndexError> {
        Ok(())
    }

    fn delete(&self, _key: &i32) -> Result<(), IndexError> {
        Ok(())
    }

    fn delete_all(&self) -> Result<(), IndexError> {
        Ok(())
    }

    fn defer_commits(&self) {
        self.deferrals.fetch_add(1, Ordering::SeqCst);
    }

    fn flush(&self) -> Result<(), IndexError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_source(
        &self,
        predicate: &Predicate<Item>,
        _options: &QueryOptions,
    ) -> Result<Arc<dyn DataSource<Item>>, QueryParseError> {
        Err(QueryParseError::Unsupported {
            predicate: predicate.to_string(),
        })
    }

    fn mark_ready(&self, _ready: bool) -> Result<(), IndexError> {
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn counting_index(version: u32) -> (IndexRef<Item>, Arc<CountingIndex>) {
    let index = Arc::new(CountingIndex {
        schema: item_schema(version),
        closes: AtomicUsize::new(0),
        deferrals: AtomicUsize::new(0),
        flushes: AtomicUsize::new(0),
    });
    let shared: IndexRef<Item> = index.clone();
    (shared, index)
}

/// A site indexer returning a canned result.
pub struct FixedIndexer {
    result: BatchResult,
    barrier: Option<Arc<Barrier>>,
}

impl FixedIndexer {
    pub fn new(result: BatchResult) -> Self {
        Self {
            result,
            barrier: None,
        }
    }

    pub fn succeeding(done: usize) -> Self {
        Self::new(BatchResult {
            elapsed: Duration::from_millis(1),
            success: true,
            done,
            failed: 0,
        })
    }

    pub fn failing() -> Self {
        Self::new(BatchResult {
            elapsed: Duration::from_millis(1),
            success: false,
            done: 0,
            failed: 0,
        })
    }

    /// Succeeds once the test joins the barrier.
    pub fn blocking(barrier: Arc<Barrier>) -> Self {
        Self {
            barrier: Some(barrier),
            ..Self::succeeding(0)
        }
    }
}

impl SiteIndexer<Item> for FixedIndexer {
    fn index_all(&self, _index: &IndexRef<Item>) -> Result<BatchResult, IndexError> {
        if let Some(barrier) = &self.barrier {
            barrier.wait();
        }
        Ok(self.result.clone())
    }
}

/// A repository with a fixed commit graph.
pub struct FakeRepo {
    name: String,
    parents: BTreeMap<ObjectId, Vec<ObjectId>>,
    tips: Vec<ObjectId>,
}

impl FakeRepo {
    /// A single branch; `commits` is newest first.
    pub fn linear(name: &str, commits: &[&str]) -> Self {
        let mut parents = BTreeMap::new();
        for pair in commits.windows(2) {
            parents.insert(pair[0].to_string(), vec![pair[1].to_string()]);
        }
        if let Some(last) = commits.last() {
            parents.insert((*last).to_string(), Vec::new());
        }
        Self {
            name: name.to_string(),
            parents,
            tips: commits.first().map(|c| (*c).to_string()).into_iter().collect(),
        }
    }

    /// Adds a merge commit as a new branch tip.
    pub fn with_merge(mut self, commit: &str, parents: &[&str]) -> Self {
        self.parents.insert(
            commit.to_string(),
            parents.iter().map(|p| (*p).to_string()).collect(),
        );
        self.tips.push(commit.to_string());
        self
    }
}

impl Repository for FakeRepo {
    fn name(&self) -> &str {
        &self.name
    }

    fn branch_tips(&self) -> Result<Vec<ObjectId>, IndexError> {
        Ok(self.tips.clone())
    }

    fn parents(&self, commit: &str) -> Result<Vec<ObjectId>, IndexError> {
        Ok(self.parents.get(commit).cloned().unwrap_or_default())
    }

    fn diff(&self, commit: &str) -> Result<Vec<FileDiff>, IndexError> {
        Ok(vec![FileDiff {
            path: format!("src/{commit}.rs"),
            added: 1,
            deleted: 0,
        }])
    }
}

/// One repository per project, one commit per item.
pub struct FakeProvider {
    repos: BTreeMap<String, Vec<String>>,
    missing: Vec<String>,
    panicking: Vec<String>,
}

impl FakeProvider {
    pub fn from_items(items: &[Item]) -> Self {
        let mut repos: BTreeMap<String, Vec<i32>> = BTreeMap::new();
        for item in items {
            repos.entry(item.project.clone()).or_default().push(item.id);
        }
        let repos = repos
            .into_iter()
            .map(|(name, mut ids)| {
                ids.sort_unstable_by(|a, b| b.cmp(a));
                (name, ids.into_iter().map(|id| format!("c{id}")).collect())
            })
            .collect();
        Self {
            repos,
            missing: Vec::new(),
            panicking: Vec::new(),
        }
    }

    pub fn with_missing(mut self, name: &str) -> Self {
        self.missing.push(name.to_string());
        self
    }

    pub fn with_panicking(mut self, name: &str) -> Self {
        self.panicking.push(name.to_string());
        self
    }
}

impl RepositoryProvider for FakeProvider {
    fn repositories(&self) -> Result<Vec<String>, IndexError> {
        Ok(self
            .repos
            .keys()
            .chain(&self.missing)
            .chain(&self.panicking)
            .cloned()
            .collect())
    }

    fn open(&self, name: &str) -> Result<Box<dyn Repository>, IndexError> {
        assert!(!self.panicking.iter().any(|p| p == name), "cannot open {name}");
        let commits = self
            .repos
            .get(name)
            .ok_or_else(|| IndexError::RepositoryNotFound {
                name: name.to_string(),
            })?;
        let commits: Vec<&str> = commits.iter().map(String::as_str).collect();
        Ok(Box::new(FakeRepo::linear(name, &commits)))
    }
}

/// Loads items of a repository's project.
pub struct FakeLoader {
    items: Vec<Item>,
    orphans: BTreeSet<i32>,
    failing: BTreeSet<i32>,
}

impl FakeLoader {
    pub fn new(items: &[Item]) -> Self {
        Self {
            items: items.to_vec(),
            orphans: BTreeSet::new(),
            failing: BTreeSet::new(),
        }
    }

    /// Points the item at a commit the walk never reaches.
    pub fn orphan(mut self, id: i32) -> Self {
        self.orphans.insert(id);
        self
    }

    pub fn failing(mut self, id: i32) -> Self {
        self.failing.insert(id);
        self
    }
}

impl DocumentLoader<Item> for FakeLoader {
    fn documents_by_commit(
        &self,
        repo: &dyn Repository,
    ) -> Result<BTreeMap<ObjectId, Vec<Item>>, IndexError> {
        let mut map: BTreeMap<ObjectId, Vec<Item>> = BTreeMap::new();
        for item in self.items.iter().filter(|i| i.project == repo.name()) {
            let commit = if self.orphans.contains(&item.id) {
                format!("orphan-{}", item.id)
            } else {
                format!("c{}", item.id)
            };
            map.entry(commit).or_default().push(item.clone());
        }
        Ok(map)
    }

    fn resolve(&self, repo: &dyn Repository, commit: &str, doc: Item) -> Result<Item, IndexError> {
        if self.failing.contains(&doc.id) {
            return Err(IndexError::repository(repo.name(), format!("cannot diff {commit}")));
        }
        repo.diff(commit)?;
        Ok(doc)
    }
}
