//! Index readiness metadata.
//!
//! Records, per document kind and schema version, whether the index for that
//! version is complete enough to serve queries. The file store keeps this in
//! `index_status.json` inside the index directory:
//!
//! ```json
//! { "changes": { "3": { "ready": true }, "4": { "ready": false } } }
//! ```

use std::{
    collections::BTreeMap,
    error::Error,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::IndexError;

/// Name of the readiness file inside the index directory.
pub const STATUS_FILENAME: &str = "index_status.json";

/// Readiness of one index version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStatus {
    /// Whether the version may serve queries.
    pub ready: bool,
}

/// Readiness of every known index version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexStatus {
    /// Versions keyed by document kind.
    kinds: BTreeMap<String, BTreeMap<u32, VersionStatus>>,
}

impl IndexStatus {
    /// Returns true if the version is marked ready.
    pub fn is_ready(&self, kind: &str, version: u32) -> bool {
        self.kinds
            .get(kind)
            .and_then(|versions| versions.get(&version))
            .is_some_and(|status| status.ready)
    }

    /// Marks a version ready or not ready.
    pub fn set_ready(&mut self, kind: &str, version: u32, ready: bool) {
        self.kinds
            .entry(kind.to_string())
            .or_default()
            .insert(version, VersionStatus { ready });
    }

    /// Returns the recorded versions of a document kind.
    pub fn versions(&self, kind: &str) -> BTreeMap<u32, VersionStatus> {
        self.kinds.get(kind).cloned().unwrap_or_default()
    }
}

/// Persistent readiness metadata.
///
/// A single process owns the store; reads and writes from that process may
/// come from any thread.
pub trait ReadinessStore: Send + Sync {
    /// Returns a snapshot of the current metadata.
    fn read(&self) -> IndexStatus;

    /// Marks a version ready or not ready, in memory.
    fn set_ready(&self, kind: &str, version: u32, ready: bool);

    /// Durably saves the metadata.
    fn save(&self) -> Result<(), IndexError>;
}

/// Readiness metadata stored as JSON in the index directory.
#[derive(Debug)]
pub struct FileReadinessStore {
    /// Path to the status file.
    path: PathBuf,
    /// Current metadata.
    status: Mutex<IndexStatus>,
}

impl FileReadinessStore {
    /// Loads the store for an index directory.
    ///
    /// A missing file yields empty metadata.
    pub fn open(index_dir: &Path) -> Result<Self, IndexError> {
        let path = index_dir.join(STATUS_FILENAME);
        let status = load_status(&path)?;
        Ok(Self {
            path,
            status: Mutex::new(status),
        })
    }

    /// Returns the status file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads a status file, treating a missing file as empty.
fn load_status(path: &Path) -> Result<IndexStatus, IndexError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(IndexStatus::default()),
        Err(e) => return Err(status_error(path, &e)),
    };
    serde_json::from_str(&contents).map_err(|e| status_error(path, &e))
}

/// Builds a status error for a path.
fn status_error(path: &Path, error: &dyn Error) -> IndexError {
    IndexError::Status {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}

impl ReadinessStore for FileReadinessStore {
    fn read(&self) -> IndexStatus {
        self.status.lock().clone()
    }

    fn set_ready(&self, kind: &str, version: u32, ready: bool) {
        self.status.lock().set_ready(kind, version, ready);
    }

    fn save(&self) -> Result<(), IndexError> {
        let status = self.status.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| status_error(&self.path, &e))?;
        }
        let json = serde_json::to_string_pretty(&*status).map_err(|e| status_error(&self.path, &e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| status_error(&tmp, &e))?;
        fs::rename(&tmp, &self.path).map_err(|e| status_error(&self.path, &e))?;
        Ok(())
    }
}

/// Readiness metadata kept in memory.
#[derive(Debug, Default)]
pub struct MemoryReadinessStore {
    /// Current metadata.
    status: Mutex<IndexStatus>,
    /// Number of successful saves.
    saves: AtomicUsize,
}

impl MemoryReadinessStore {
    /// Creates a store holding `status`.
    pub fn with_status(status: IndexStatus) -> Self {
        Self {
            status: Mutex::new(status),
            saves: AtomicUsize::new(0),
        }
    }

    /// Returns how many times the store was saved.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ReadinessStore for MemoryReadinessStore {
    fn read(&self) -> IndexStatus {
        self.status.lock().clone()
    }

    fn set_ready(&self, kind: &str, version: u32, ready: bool) {
        self.status.lock().set_ready(kind, version, ready);
    }

    fn save(&self) -> Result<(), IndexError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = FileReadinessStore::open(temp.path()).unwrap();
        assert_eq!(store.read(), IndexStatus::default());
        assert!(!store.read().is_ready("changes", 1));
    }

    #[test]
    fn save_and_reload() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("index");
        let store = FileReadinessStore::open(&dir).unwrap();
        store.set_ready("changes", 3, true);
        store.set_ready("changes", 4, false);
        store.save().unwrap();

        let reloaded = FileReadinessStore::open(&dir).unwrap().read();
        assert!(reloaded.is_ready("changes", 3));
        assert!(!reloaded.is_ready("changes", 4));
        assert_eq!(reloaded.versions("changes").len(), 2);
        assert!(!dir.join("index_status.json.tmp").exists());
    }

    #[test]
    fn file_format() {
        let temp = TempDir::new().unwrap();
        let store = FileReadinessStore::open(temp.path()).unwrap();
        store.set_ready("changes", 3, true);
        store.save().unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["changes"]["3"]["ready"], serde_json::Value::Bool(true));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(STATUS_FILENAME), "{ not json").unwrap();
        let err = FileReadinessStore::open(temp.path()).unwrap_err();
        assert!(matches!(err, IndexError::Status { .. }));
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryReadinessStore::default();
        store.set_ready("changes", 1, true);
        store.save().unwrap();
        assert_eq!(store.save_count(), 1);
        assert!(store.read().is_ready("changes", 1));
    }
}
