//! Raw settings as written in `revdex.toml`.
//!
//! Every field is optional so that defaults can be applied afterwards.
//! Keys revdex does not read are kept per section so validation can name
//! them.

use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;
use toml::Value;

use crate::ConfigError;

/// Keys in one table that no setting claims, with their values.
pub type UnknownKeys = BTreeMap<String, Value>;

/// The whole file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[index]`
    pub index: Option<RawIndexSettings>,
    /// `[query]`
    pub query: Option<RawQuerySettings>,
    /// `[batch]`
    pub batch: Option<RawBatchSettings>,
    /// Unrecognised top-level keys and tables.
    #[serde(flatten)]
    pub unknown: UnknownKeys,
}

/// `[index]`: where indexes live and how versions are upgraded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawIndexSettings {
    /// Rebuild a newer schema version in the background at startup.
    pub online_upgrade: Option<bool>,
    /// `tantivy` or `memory`.
    pub backend: Option<String>,
    /// Index directory, relative to the site.
    pub path: Option<String>,
    /// Unrecognised keys.
    #[serde(flatten)]
    pub unknown: UnknownKeys,
}

/// `[query]`: per-query limits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawQuerySettings {
    /// Largest page a query may request.
    pub max_limit: Option<usize>,
    /// Pages an AND source may scan.
    pub max_pages: Option<usize>,
    /// Leaf predicates a query may contain.
    pub max_terms: Option<usize>,
    /// Unrecognised keys.
    #[serde(flatten)]
    pub unknown: UnknownKeys,
}

/// `[batch]`: offline reindexing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBatchSettings {
    /// Worker threads; zero means one per CPU.
    pub threads: Option<usize>,
    /// Unrecognised keys.
    #[serde(flatten)]
    pub unknown: UnknownKeys,
}

impl RawConfig {
    /// Reads and parses the file at `path`.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parses TOML text; `origin` names the file in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Toml {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Returns the dotted names of all unrecognised keys, sorted.
    pub fn unknown_keys(&self) -> Vec<String> {
        let sections = [
            ("index", self.index.as_ref().map(|s| &s.unknown)),
            ("query", self.query.as_ref().map(|s| &s.unknown)),
            ("batch", self.batch.as_ref().map(|s| &s.unknown)),
        ];
        let mut keys: Vec<String> = self.unknown.keys().cloned().collect();
        for (section, unknown) in sections {
            keys.extend(
                unknown
                    .into_iter()
                    .flat_map(BTreeMap::keys)
                    .map(|key| format!("{section}.{key}")),
            );
        }
        keys.sort();
        keys
    }
}
