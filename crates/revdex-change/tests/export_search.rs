//! Integration tests for revdex-change.
//!
//! Builds a Tantivy index from JSON exports with the batch indexer and
//! queries it through the change query builder.

// Integration tests live outside cfg(test) by design
#![allow(clippy::tests_outside_test_module)]

use std::{fs, path::Path, sync::Arc};

use pretty_assertions::assert_eq;
use revdex_change::{Change, ChangeQueryBuilder, DATA_DIR, ExportSite, change_schemas};
use revdex_index::{
    BatchIndexer, BatchResult, IndexCollection, IndexFactory, IndexRef, MemoryReadinessStore,
    QueryOptions, QueryProcessor, ReadinessStore, TantivyIndexFactory,
};
use tempfile::TempDir;

const TOOLS: &str = r#"{
  "refs": { "refs/heads/main": "t3", "refs/heads/stable": "t2" },
  "commits": {
    "t3": { "parents": ["t2"], "files": [{ "path": "src/parser.rs", "added": 12, "deleted": 3 }] },
    "t2": { "parents": ["t1"], "files": [{ "path": "docs/guide.md", "added": 40 }] },
    "t1": { "files": [{ "path": "Cargo.toml", "added": 1 }] }
  },
  "changes": [
    { "id": 1, "change_id": "I1111", "project": "tools", "branch": "refs/heads/main",
      "owner": "alice", "status": "new", "message": "Fix crash in parser",
      "updated": "2024-03-01T10:00:00Z", "revisions": ["t1", "t3"], "hashtags": ["Bug"] },
    { "id": 2, "change_id": "I2222", "project": "tools", "branch": "refs/heads/stable",
      "owner": "bob", "status": "merged", "message": "Document the guide",
      "updated": "2024-03-05T10:00:00Z", "revisions": ["t2"], "reviewed": true },
    { "id": 3, "change_id": "I3333", "project": "tools", "branch": "refs/heads/main",
      "owner": "carol", "status": "new", "message": "Orphaned work",
      "updated": "2024-03-06T10:00:00Z", "revisions": ["t9"] }
  ]
}"#;

const CORE: &str = r#"{
  "refs": { "refs/heads/main": "k1" },
  "commits": { "k1": { "files": [{ "path": "src/parser/mod.rs", "added": 2, "deleted": 2 }] } },
  "changes": [
    { "id": 4, "change_id": "I4444", "project": "core", "branch": "refs/heads/main",
      "owner": "alice", "status": "abandoned", "message": "Parser cleanup",
      "updated": "2024-03-07T10:00:00Z", "revisions": ["k1"], "topic": "parsing" }
  ]
}"#;

fn write_site(root: &Path) {
    let data = root.join(DATA_DIR);
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("tools.json"), TOOLS).unwrap();
    fs::write(data.join("core.json"), CORE).unwrap();
}

struct Indexed {
    _temp: TempDir,
    index: IndexRef<Change>,
    processor: QueryProcessor<Change>,
}

fn build() -> (Indexed, BatchResult) {
    let temp = TempDir::new().unwrap();
    write_site(temp.path());
    let site = Arc::new(ExportSite::new(temp.path()));

    let store: Arc<dyn ReadinessStore> = Arc::new(MemoryReadinessStore::default());
    let factory = TantivyIndexFactory::<Change>::new(temp.path().join("index"), "changes", store);
    let schema = change_schemas().unwrap().latest().unwrap();
    let index = factory.create(schema).unwrap();

    let result = BatchIndexer::<Change>::new(Arc::<ExportSite>::clone(&site), site)
        .threads(2)
        .run(&index)
        .unwrap();

    let collection = Arc::new(IndexCollection::new("changes"));
    collection.set_search_index(Arc::clone(&index));
    let processor = QueryProcessor::new(collection, QueryOptions::default());
    (
        Indexed {
            _temp: temp,
            index,
            processor,
        },
        result,
    )
}

fn search(indexed: &Indexed, query: &str) -> Vec<i32> {
    let builder = ChangeQueryBuilder::new(indexed.index.schema());
    let predicate = builder.parse(query).unwrap();
    indexed
        .processor
        .query(&predicate, 0, 50)
        .unwrap()
        .documents
        .iter()
        .map(|c| c.id)
        .collect()
}

#[test]
fn batch_rebuild_reports_unresolvable_changes() {
    let (_, result) = build();
    assert!(result.success);
    assert_eq!(result.done, 3);
    assert_eq!(result.failed, 1);
}

#[test]
fn searches_resolved_fields() {
    let (indexed, _) = build();
    assert_eq!(search(&indexed, "project:tools"), vec![2, 1]);
    assert_eq!(search(&indexed, "file:src/parser.rs"), vec![1]);
    assert_eq!(search(&indexed, "filepart:parser"), vec![4]);
    assert_eq!(search(&indexed, "added:>=40"), vec![2]);
    assert_eq!(search(&indexed, "delta:15"), vec![1]);
    assert_eq!(search(&indexed, "hashtag:bug"), vec![1]);
    assert_eq!(search(&indexed, "parser"), vec![4, 1]);
    assert_eq!(search(&indexed, "status:closed"), vec![4, 2]);
    assert_eq!(search(&indexed, "branch:stable OR topic:parsing"), vec![4, 2]);
    assert_eq!(search(&indexed, "commit:t3"), vec![1]);
    assert_eq!(search(&indexed, "after:2024-03-05"), vec![4, 2]);
}

#[test]
fn local_operators_combine_with_indexed_ones() {
    let (indexed, _) = build();
    assert_eq!(search(&indexed, "project:tools is:reviewed"), vec![2]);
    assert_eq!(search(&indexed, "owner:alice -has:topic"), vec![1]);

    // a disjunction with a local branch has nothing to read from the index
    let builder = ChangeQueryBuilder::new(indexed.index.schema());
    let predicate = builder.parse("file:^docs/ OR owner:bob").unwrap();
    assert!(indexed.processor.query(&predicate, 0, 10).is_err());
}
