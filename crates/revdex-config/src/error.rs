//! Errors raised while loading a site's `revdex.toml`.

use std::{io, path::PathBuf};

use thiserror::Error;
use toml::de;

/// A configuration file that could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The file is not valid TOML, or a setting has the wrong type.
    #[error("invalid configuration in {path}: {source}")]
    Toml {
        /// Configuration file.
        path: PathBuf,
        /// Error reported by the TOML reader, with line and column.
        source: de::Error,
    },
}
