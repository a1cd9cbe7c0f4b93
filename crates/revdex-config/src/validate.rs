//! Configuration validation.
//!
//! Validates a loaded configuration and reports warnings for potential issues.

use std::fmt;

use crate::{BackendKind, Config};

/// Thread counts above this multiple of the CPU count are reported.
const THREAD_OVERSUBSCRIPTION: usize = 4;

/// A non-fatal warning about the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The backend name is not recognised; Tantivy is used instead.
    UnknownBackend {
        /// The configured name.
        backend: String,
    },
    /// The index path exists but is not a directory.
    IndexPathNotDirectory {
        /// The offending path.
        path: String,
    },
    /// More page scans are allowed than results can ever be returned.
    PagesExceedLimit {
        /// Configured page cap.
        max_pages: usize,
        /// Configured result cap.
        max_limit: usize,
    },
    /// A key in the file is not a revdex setting.
    UnknownKey {
        /// Dotted key name, such as `index.colour`.
        key: String,
    },
    /// The batch pool is much larger than the machine.
    ExcessiveThreads {
        /// Configured threads.
        threads: usize,
        /// Available CPUs.
        cpus: usize,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownBackend { backend } => {
                write!(f, "unknown index backend '{backend}', using tantivy")
            }
            Self::IndexPathNotDirectory { path } => {
                write!(f, "index path is not a directory: {path}")
            }
            Self::PagesExceedLimit {
                max_pages,
                max_limit,
            } => write!(
                f,
                "query.max_pages ({max_pages}) is larger than query.max_limit ({max_limit})"
            ),
            Self::UnknownKey { key } => write!(f, "unknown setting '{key}' is ignored"),
            Self::ExcessiveThreads { threads, cpus } => {
                write!(f, "batch.threads ({threads}) is far above the {cpus} available CPUs")
            }
        }
    }
}

/// Validates the configuration and returns any warnings.
pub fn validate_config(config: &Config) -> Vec<ConfigWarning> {
    let mut warnings: Vec<ConfigWarning> = config
        .unknown_keys
        .iter()
        .map(|key| ConfigWarning::UnknownKey { key: key.clone() })
        .collect();

    if BackendKind::parse(&config.index.backend).is_none() {
        warnings.push(ConfigWarning::UnknownBackend {
            backend: config.index.backend.clone(),
        });
    }

    let index_dir = config.index_dir();
    if index_dir.exists() && !index_dir.is_dir() {
        warnings.push(ConfigWarning::IndexPathNotDirectory {
            path: index_dir.display().to_string(),
        });
    }

    if config.query.max_pages > config.query.max_limit {
        warnings.push(ConfigWarning::PagesExceedLimit {
            max_pages: config.query.max_pages,
            max_limit: config.query.max_limit,
        });
    }

    let cpus = num_cpus::get();
    if config.batch.threads > cpus * THREAD_OVERSUBSCRIPTION {
        warnings.push(ConfigWarning::ExcessiveThreads {
            threads: config.batch.threads,
            cpus,
        });
    }

    warnings
}
