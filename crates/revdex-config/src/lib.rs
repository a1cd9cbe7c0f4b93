//! Configuration system for revdex.
//!
//! A site is a directory holding a `revdex.toml` file, the repository exports
//! under `data/`, and the index directory. Every setting is optional; a site
//! without a config file runs on defaults.

#![warn(missing_docs)]

mod error;
mod parse;
#[cfg(test)]
mod test_support;
mod validate;

use std::path::{Path, PathBuf};

pub use error::ConfigError;
pub use parse::{RawBatchSettings, RawConfig, RawIndexSettings, RawQuerySettings, UnknownKeys};
use serde::Serialize;
pub use validate::ConfigWarning;
use validate::validate_config;

/// Name of the configuration file inside a site directory.
pub const CONFIG_FILENAME: &str = "revdex.toml";

/// Resolved configuration for one site.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Index settings.
    pub index: IndexSettings,
    /// Query limits.
    pub query: QuerySettings,
    /// Batch indexer settings.
    pub batch: BatchSettings,
    /// Site directory the configuration was loaded for.
    pub site: PathBuf,
    /// Dotted names of keys in the file that no setting reads.
    pub unknown_keys: Vec<String>,
}

impl Config {
    /// Loads `revdex.toml` from a site directory.
    ///
    /// Returns the defaults (rooted at `site`) if the file does not exist.
    pub fn load(site: &Path) -> Result<Self, ConfigError> {
        let path = site.join(CONFIG_FILENAME);
        if !path.exists() {
            return Ok(Self {
                site: site.to_path_buf(),
                ..Self::default()
            });
        }
        let raw = RawConfig::read(&path)?;
        Ok(Self::from_raw(raw, site))
    }

    /// Applies defaults to a parsed configuration.
    pub fn from_raw(raw: RawConfig, site: &Path) -> Self {
        let unknown_keys = raw.unknown_keys();
        let index = raw.index.unwrap_or_default();
        let query = raw.query.unwrap_or_default();
        let batch = raw.batch.unwrap_or_default();

        let index_defaults = IndexSettings::default();
        let query_defaults = QuerySettings::default();

        Self {
            index: IndexSettings {
                online_upgrade: index.online_upgrade.unwrap_or(index_defaults.online_upgrade),
                backend: index.backend.unwrap_or(index_defaults.backend),
                path: index.path.unwrap_or(index_defaults.path),
            },
            query: QuerySettings {
                max_limit: positive_or(query.max_limit, query_defaults.max_limit),
                max_pages: positive_or(query.max_pages, query_defaults.max_pages),
                max_terms: positive_or(query.max_terms, query_defaults.max_terms),
            },
            batch: BatchSettings {
                threads: batch.threads.unwrap_or_default(),
            },
            site: site.to_path_buf(),
            unknown_keys,
        }
    }

    /// Returns the absolute index directory.
    pub fn index_dir(&self) -> PathBuf {
        let path = Path::new(&self.index.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.site.join(path)
        }
    }

    /// Returns the directory holding per-project repository exports.
    pub fn data_dir(&self) -> PathBuf {
        self.site.join("data")
    }

    /// Validates the configuration and returns any warnings.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        validate_config(self)
    }

    /// Serializes the effective settings to TOML format.
    pub fn settings_to_toml(&self) -> Result<String, toml::ser::Error> {
        let serializable = SerializableSettings {
            index: &self.index,
            query: &self.query,
            batch: &self.batch,
        };
        toml::to_string_pretty(&serializable)
    }
}

/// Returns `value` if it is set and non-zero, otherwise `default`.
fn positive_or(value: Option<usize>, default: usize) -> usize {
    value.filter(|v| *v > 0).unwrap_or(default)
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// On-disk Tantivy indexes.
    Tantivy,
    /// Process-local in-memory indexes.
    Memory,
}

impl BackendKind {
    /// Parses a backend name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "tantivy" => Some(Self::Tantivy),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Index settings.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSettings {
    /// Whether newer schema versions are rebuilt in the background at startup.
    pub online_upgrade: bool,
    /// Storage backend name.
    pub backend: String,
    /// Index directory, relative to the site unless absolute.
    pub path: String,
}

impl IndexSettings {
    /// Returns the configured backend, falling back to Tantivy for unknown names.
    pub fn backend_kind(&self) -> BackendKind {
        BackendKind::parse(&self.backend).unwrap_or(BackendKind::Tantivy)
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            online_upgrade: true,
            backend: String::from("tantivy"),
            path: String::from("index"),
        }
    }
}

/// Query limits.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySettings {
    /// Largest page a query may request.
    pub max_limit: usize,
    /// Pages an AND source may scan.
    pub max_pages: usize,
    /// Leaf predicates a single query may contain.
    pub max_terms: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_limit: 500,
            max_pages: 100,
            max_terms: 500,
        }
    }
}

/// Batch indexer settings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSettings {
    /// Worker threads; zero means one per CPU.
    pub threads: usize,
}

impl BatchSettings {
    /// Returns the number of worker threads to start.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

/// Internal struct for TOML serialization of settings.
#[derive(Serialize)]
struct SerializableSettings<'a> {
    /// Index settings.
    index: &'a IndexSettings,
    /// Query limits.
    query: &'a QuerySettings,
    /// Batch indexer settings.
    batch: &'a BatchSettings,
}
