//! Change exports on disk.
//!
//! A site keeps one JSON file per project under `<site>/data/`:
//!
//! ```json
//! {
//!   "refs": { "refs/heads/main": "c3" },
//!   "commits": {
//!     "c3": { "parents": ["c2"], "files": [{ "path": "src/lib.rs", "added": 4, "deleted": 1 }] }
//!   },
//!   "changes": [ { "id": 7, "change_id": "I8a3f", "revisions": ["c3"], ... } ]
//! }
//! ```
//!
//! [`ExportSite`] serves these files as repositories for the batch indexer and
//! loads the changes of each one, keyed by their current revision.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::warn;
use revdex_index::{
    DocumentLoader, FileDiff, IndexError, ObjectId, Repository, RepositoryProvider,
};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::{ChangeError, change::Change};

/// Directory under the site root holding exports.
pub const DATA_DIR: &str = "data";

/// Extension of export files.
const EXPORT_EXTENSION: &str = "json";

/// One touched file in an exported commit.
#[derive(Debug, Clone, Deserialize)]
struct ExportFile {
    /// File path.
    path: String,
    /// Lines added.
    #[serde(default)]
    added: u32,
    /// Lines deleted.
    #[serde(default)]
    deleted: u32,
}

/// One exported commit.
#[derive(Debug, Clone, Deserialize)]
struct ExportCommit {
    /// Parent commits, first parent first.
    #[serde(default)]
    parents: Vec<ObjectId>,
    /// Files changed relative to the first parent.
    #[serde(default)]
    files: Vec<ExportFile>,
}

/// The export of one project.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectExport {
    /// Ref names and the commits they point at.
    #[serde(default)]
    refs: BTreeMap<String, ObjectId>,
    /// Commit graph.
    #[serde(default)]
    commits: BTreeMap<ObjectId, ExportCommit>,
    /// Changes of the project.
    #[serde(default)]
    changes: Vec<Change>,
}

impl ProjectExport {
    /// Returns the changes of the project.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }
}

/// A project export opened as a repository.
struct ExportRepository {
    /// Project name.
    name: String,
    /// Parsed export.
    export: ProjectExport,
}

impl ExportRepository {
    /// Looks up a commit.
    fn commit(&self, id: &str) -> Result<&ExportCommit, IndexError> {
        self.export
            .commits
            .get(id)
            .ok_or_else(|| IndexError::repository(&self.name, format!("unknown commit {id}")))
    }
}

impl Repository for ExportRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn branch_tips(&self) -> Result<Vec<ObjectId>, IndexError> {
        let mut tips: Vec<ObjectId> = self.export.refs.values().cloned().collect();
        tips.sort();
        tips.dedup();
        Ok(tips)
    }

    fn parents(&self, commit: &str) -> Result<Vec<ObjectId>, IndexError> {
        Ok(self.commit(commit)?.parents.clone())
    }

    fn diff(&self, commit: &str) -> Result<Vec<FileDiff>, IndexError> {
        Ok(self
            .commit(commit)?
            .files
            .iter()
            .map(|f| FileDiff {
                path: f.path.clone(),
                added: f.added,
                deleted: f.deleted,
            })
            .collect())
    }
}

/// The exports of one site.
#[derive(Debug, Clone)]
pub struct ExportSite {
    /// Directory holding `<project>.json` files.
    data_dir: PathBuf,
}

impl ExportSite {
    /// Creates a reader for the exports under `<site>/data`.
    pub fn new(site: &Path) -> Self {
        Self {
            data_dir: site.join(DATA_DIR),
        }
    }

    /// Returns the export directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the path of a project's export.
    fn export_path(&self, project: &str) -> PathBuf {
        self.data_dir.join(format!("{project}.{EXPORT_EXTENSION}"))
    }

    /// Lists exported projects in name order.
    ///
    /// A missing export directory holds no projects.
    pub fn projects(&self) -> Result<Vec<String>, ChangeError> {
        if !self.data_dir.exists() {
            warn!("export directory {} does not exist", self.data_dir.display());
            return Ok(Vec::new());
        }
        let mut projects = Vec::new();
        for entry in WalkDir::new(&self.data_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| ChangeError::Read {
                path: self.data_dir.clone(),
                source: e.into(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(EXPORT_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                projects.push(stem.to_string());
            }
        }
        projects.sort();
        Ok(projects)
    }

    /// Reads and parses one project's export.
    pub fn load(&self, project: &str) -> Result<ProjectExport, ChangeError> {
        let path = self.export_path(project);
        let text = fs::read_to_string(&path).map_err(|source| ChangeError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ChangeError::Export { path, source })
    }
}

impl RepositoryProvider for ExportSite {
    fn repositories(&self) -> Result<Vec<String>, IndexError> {
        Ok(self.projects()?)
    }

    fn open(&self, name: &str) -> Result<Box<dyn Repository>, IndexError> {
        if !self.export_path(name).is_file() {
            return Err(IndexError::RepositoryNotFound {
                name: name.to_string(),
            });
        }
        Ok(Box::new(ExportRepository {
            name: name.to_string(),
            export: self.load(name)?,
        }))
    }
}

impl DocumentLoader<Change> for ExportSite {
    fn documents_by_commit(
        &self,
        repo: &dyn Repository,
    ) -> Result<BTreeMap<ObjectId, Vec<Change>>, IndexError> {
        let export = self.load(repo.name())?;
        let mut by_commit: BTreeMap<ObjectId, Vec<Change>> = BTreeMap::new();
        for change in export.changes {
            let Some(commit) = change.current_revision().map(str::to_string) else {
                warn!("{}: change {} has no revisions", repo.name(), change.id);
                continue;
            };
            by_commit.entry(commit).or_default().push(change);
        }
        Ok(by_commit)
    }

    fn resolve(
        &self,
        repo: &dyn Repository,
        commit: &str,
        mut change: Change,
    ) -> Result<Change, IndexError> {
        let diff = repo.diff(commit)?;
        let added: u32 = diff.iter().map(|f| f.added).fold(0, u32::saturating_add);
        let deleted: u32 = diff.iter().map(|f| f.deleted).fold(0, u32::saturating_add);
        change.added = i32::try_from(added).unwrap_or(i32::MAX);
        change.deleted = i32::try_from(deleted).unwrap_or(i32::MAX);
        change.files = diff.into_iter().map(|f| f.path).collect();
        Ok(change)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::test_support::write_export;

    #[test]
    fn lists_json_exports_only() {
        let temp = TempDir::new().unwrap();
        write_export(temp.path(), "tools", "{}");
        write_export(temp.path(), "core", "{}");
        fs::write(temp.path().join(DATA_DIR).join("notes.txt"), "x").unwrap();

        let site = ExportSite::new(temp.path());
        assert_eq!(site.projects().unwrap(), vec!["core", "tools"]);
    }

    #[test]
    fn missing_data_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(ExportSite::new(temp.path()).projects().unwrap().is_empty());
    }

    #[test]
    fn open_missing_project_fails() {
        let temp = TempDir::new().unwrap();
        let site = ExportSite::new(temp.path());
        assert!(matches!(
            site.open("nope"),
            Err(IndexError::RepositoryNotFound { .. })
        ));
    }

    #[test]
    fn malformed_export_names_the_file() {
        let temp = TempDir::new().unwrap();
        write_export(temp.path(), "tools", "{ not json");
        let err = ExportSite::new(temp.path()).load("tools").unwrap_err();
        assert!(matches!(err, ChangeError::Export { .. }));
        assert!(err.to_string().contains("tools.json"), "{err}");
    }

    #[test]
    fn resolves_files_and_line_counts() {
        let temp = TempDir::new().unwrap();
        write_export(
            temp.path(),
            "tools",
            r#"{
                "refs": {"refs/heads/main": "c2"},
                "commits": {
                    "c2": {"parents": ["c1"], "files": [
                        {"path": "src/a.rs", "added": 3, "deleted": 1},
                        {"path": "src/b.rs", "added": 2}
                    ]},
                    "c1": {}
                },
                "changes": [{
                    "id": 1, "change_id": "Iaaaa", "project": "tools",
                    "branch": "refs/heads/main", "owner": "alice", "status": "new",
                    "message": "Add things", "updated": "2024-03-01T00:00:00Z",
                    "revisions": ["c1", "c2"]
                }]
            }"#,
        );
        let site = ExportSite::new(temp.path());
        let repo = site.open("tools").unwrap();
        assert_eq!(repo.branch_tips().unwrap(), vec!["c2"]);
        assert_eq!(repo.parents("c2").unwrap(), vec!["c1"]);

        let mut by_commit = site.documents_by_commit(repo.as_ref()).unwrap();
        let change = by_commit.remove("c2").unwrap().remove(0);
        let change = site.resolve(repo.as_ref(), "c2", change).unwrap();
        assert_eq!(change.files, vec!["src/a.rs", "src/b.rs"]);
        assert_eq!((change.added, change.deleted, change.delta()), (5, 1, 6));

        assert!(repo.diff("c9").is_err());
    }
}
