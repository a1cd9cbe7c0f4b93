//! Throwaway site directories for unit tests.

use std::{fs, path::Path};

use tempfile::TempDir;

use crate::{CONFIG_FILENAME, Config};

/// A temporary site directory, removed on drop.
pub struct Site(TempDir);

impl Site {
    /// A site with no files.
    pub fn empty() -> Self {
        Self(tempfile::tempdir().unwrap())
    }

    /// A site whose `revdex.toml` holds `config`.
    pub fn with_config(config: &str) -> Self {
        let site = Self::empty();
        site.put(CONFIG_FILENAME, config);
        site
    }

    /// Site root.
    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Writes `content` to `rel`, creating parent directories.
    pub fn put(&self, rel: &str, content: &str) {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Loads the site's configuration.
    pub fn load(&self) -> Config {
        Config::load(self.path()).unwrap()
    }
}
