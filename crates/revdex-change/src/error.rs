//! Error types for the change document kind.

use std::{io, path::PathBuf};

use revdex_index::{IndexError, QueryParseError, SchemaError};
use revdex_query::QueryError;
use thiserror::Error;

/// Errors raised while building change queries or loading exports.
#[derive(Debug, Error)]
pub enum ChangeError {
    /// The query text is not valid syntax.
    #[error(transparent)]
    Syntax(#[from] QueryError),

    /// The query text contains no terms.
    #[error("empty query")]
    EmptyQuery,

    /// The query cannot be bound to the change schema.
    #[error(transparent)]
    Query(#[from] QueryParseError),

    /// A change schema is invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// An index operation failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// An export file or directory could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// An export file is not valid JSON for its format.
    #[error("invalid export {path}: {source}")]
    Export {
        /// Export file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl From<ChangeError> for IndexError {
    fn from(err: ChangeError) -> Self {
        match err {
            ChangeError::Index(inner) => inner,
            ChangeError::Query(inner) => Self::Query(inner),
            ChangeError::Read { path, source } => Self::repository(
                path.display().to_string(),
                format!("failed to read export: {source}"),
            ),
            ChangeError::Export { path, source } => Self::repository(
                path.display().to_string(),
                format!("invalid export: {source}"),
            ),
            other => Self::Invariant(other.to_string()),
        }
    }
}
