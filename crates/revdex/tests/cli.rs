//! CLI integration tests for revdex commands.
//!
//! These tests focus on exit codes, index state on disk, and JSON output,
//! not on table formatting which may change.

// Integration tests live outside cfg(test) by design
#![allow(clippy::tests_outside_test_module)]

use std::{fs, path::Path};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

/// A project export with two changes on main.
const TOOLS: &str = r#"{
  "refs": { "refs/heads/main": "c2" },
  "commits": {
    "c2": { "parents": ["c1"], "files": [{ "path": "src/parser.rs", "added": 12, "deleted": 3 }] },
    "c1": { "files": [{ "path": "README.md", "added": 4 }] }
  },
  "changes": [
    { "id": 1, "change_id": "I1111", "project": "tools", "branch": "refs/heads/main",
      "owner": "alice", "status": "merged", "message": "Add readme",
      "updated": "2024-03-01T10:00:00Z", "revisions": ["c1"] },
    { "id": 2, "change_id": "I2222", "project": "tools", "branch": "refs/heads/main",
      "owner": "bob", "status": "new", "message": "Fix crash in parser",
      "updated": "2024-03-02T10:00:00Z", "revisions": ["c2"] }
  ]
}"#;

/// Helper to create a site directory with one export.
fn site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("tools.json"), TOOLS).unwrap();
    dir
}

/// Helper to get a revdex command for a site.
fn revdex(site: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("revdex").unwrap();
    cmd.arg("--site").arg(site);
    cmd
}

/// Reads the readiness flag of a change index version from disk.
fn ready(site: &Path, version: &str) -> Option<bool> {
    let text = fs::read_to_string(site.join("index").join("index_status.json")).ok()?;
    let status: Value = serde_json::from_str(&text).unwrap();
    status["changes"][version]["ready"].as_bool()
}

/// Runs a JSON search and returns the change ids.
fn search_ids(site: &Path, query: &str) -> Vec<i64> {
    let output = revdex(site)
        .args(["search", "--json", query])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    json["changes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect()
}

mod status {
    use super::*;

    #[test]
    fn reports_missing_ready_version() {
        let dir = site();
        revdex(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No ready version of changes"))
            .stdout(predicate::str::contains("revdex reindex"));
    }

    #[test]
    fn lists_versions_after_reindex() {
        let dir = site();
        revdex(dir.path()).arg("reindex").assert().success();
        revdex(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Index changes:"))
            .stdout(predicate::str::contains("Version"))
            .stdout(predicate::str::contains("No ready version").not());
    }

    #[test]
    fn unknown_backend_is_a_warning() {
        let dir = site();
        fs::write(dir.path().join("revdex.toml"), "[index]\nbackend = \"lucene\"\n").unwrap();
        revdex(dir.path())
            .arg("status")
            .assert()
            .failure()
            .stdout(predicate::str::contains("unknown index backend 'lucene'"));
    }
}

mod reindex {
    use super::*;

    #[test]
    fn builds_newest_version_and_marks_it_ready() {
        let dir = site();
        revdex(dir.path())
            .arg("reindex")
            .assert()
            .success()
            .stdout(predicate::str::contains("changes version 3: 2 indexed, 0 failed"));
        assert_eq!(ready(dir.path(), "3"), Some(true));
    }

    #[test]
    fn builds_requested_version() {
        let dir = site();
        revdex(dir.path())
            .args(["reindex", "--version", "2"])
            .assert()
            .success();
        assert_eq!(ready(dir.path(), "2"), Some(true));
        assert_eq!(ready(dir.path(), "3"), None);
    }

    #[test]
    fn unknown_version_fails() {
        let dir = site();
        revdex(dir.path())
            .args(["reindex", "--version", "9"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("failed to reindex changes"));
    }

    #[test]
    fn malformed_export_fails_the_repository() {
        let dir = site();
        fs::write(dir.path().join("data").join("broken.json"), "{ nope").unwrap();
        revdex(dir.path())
            .arg("reindex")
            .assert()
            .failure()
            .stdout(predicate::str::contains("was not marked ready"));
        assert_eq!(ready(dir.path(), "3"), Some(false));
    }
}

mod search {
    use super::*;

    #[test]
    fn requires_a_ready_version() {
        let dir = site();
        revdex(dir.path())
            .args(["search", "project:tools"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no ready version of index changes"));
    }

    #[test]
    fn returns_newest_changes_first() {
        let dir = site();
        revdex(dir.path()).arg("reindex").assert().success();
        assert_eq!(search_ids(dir.path(), "project:tools"), vec![2, 1]);
        assert_eq!(search_ids(dir.path(), "status:merged"), vec![1]);
        assert_eq!(search_ids(dir.path(), "file:src/parser.rs"), vec![2]);
        assert_eq!(search_ids(dir.path(), "added:>10"), vec![2]);
    }

    #[test]
    fn pages_through_results() {
        let dir = site();
        revdex(dir.path()).arg("reindex").assert().success();
        let output = revdex(dir.path())
            .args(["search", "--json", "-n", "1", "project:tools"])
            .output()
            .unwrap();
        let json: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["more"], Value::Bool(true));
        assert_eq!(json["changes"][0]["id"], 2);

        let output = revdex(dir.path())
            .args(["search", "--json", "-n", "1", "--start", "1", "project:tools"])
            .output()
            .unwrap();
        let json: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["more"], Value::Bool(false));
        assert_eq!(json["changes"][0]["id"], 1);
    }

    #[test]
    fn table_output_names_more_pages() {
        let dir = site();
        revdex(dir.path()).arg("reindex").assert().success();
        revdex(dir.path())
            .args(["search", "-n", "1", "owner:bob", "OR", "owner:alice"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Fix crash in parser"))
            .stdout(predicate::str::contains("--start 1"));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let dir = site();
        revdex(dir.path()).arg("reindex").assert().success();
        revdex(dir.path())
            .args(["search", "colour:blue"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid query"));
    }

    #[test]
    fn syntax_error_shows_position() {
        let dir = site();
        revdex(dir.path()).arg("reindex").assert().success();
        revdex(dir.path())
            .args(["search", "(owner:alice"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("group is never closed (column 1)"))
            .stderr(predicate::str::contains("hint: add ) to close the group"));
    }

    #[test]
    fn memory_backend_builds_in_process() {
        let dir = site();
        fs::write(dir.path().join("revdex.toml"), "[index]\nbackend = \"memory\"\n").unwrap();
        assert_eq!(search_ids(dir.path(), "owner:alice"), vec![1]);
        assert!(!dir.path().join("index").exists());
    }
}

mod upgrade {
    use super::*;

    #[test]
    fn rebuilds_newest_version_and_promotes_it() {
        let dir = site();
        revdex(dir.path())
            .args(["reindex", "--version", "2"])
            .assert()
            .success();
        revdex(dir.path())
            .arg("upgrade")
            .assert()
            .success()
            .stdout(predicate::str::contains("changes now searches version 3"));
        assert_eq!(ready(dir.path(), "3"), Some(true));
        assert_eq!(ready(dir.path(), "2"), Some(false));
        assert_eq!(search_ids(dir.path(), "project:tools"), vec![2, 1]);
    }

    #[test]
    fn nothing_to_do_at_newest_version() {
        let dir = site();
        revdex(dir.path()).arg("reindex").assert().success();
        revdex(dir.path())
            .arg("upgrade")
            .assert()
            .success()
            .stdout(predicate::str::contains("already searches its newest version"));
    }

    #[test]
    fn force_rebuilds_current_version() {
        let dir = site();
        revdex(dir.path()).arg("reindex").assert().success();
        revdex(dir.path())
            .args(["upgrade", "--force"])
            .assert()
            .success()
            .stdout(predicate::str::contains("changes now searches version 3"));
    }
}

mod activate {
    use super::*;

    #[test]
    fn promotes_newest_version_without_rebuilding() {
        let dir = site();
        revdex(dir.path())
            .args(["reindex", "--version", "2"])
            .assert()
            .success();
        revdex(dir.path()).arg("activate").assert().success();
        assert_eq!(ready(dir.path(), "3"), Some(true));
        assert_eq!(ready(dir.path(), "2"), Some(false));
        // the promoted version was never filled
        assert!(search_ids(dir.path(), "project:tools").is_empty());
    }
}
