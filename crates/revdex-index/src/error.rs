//! Error types for the revdex-index crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors raised by index management, reindexing and storage backends.
#[derive(Debug, Error)]
pub enum IndexError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to open or create an index directory.
    #[error("failed to open index at {path}: {message}")]
    OpenIndex {
        /// Path to the index directory.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// The storage backend rejected an operation.
    #[error("index backend error: {0}")]
    Backend(String),

    /// The readiness metadata could not be read or written.
    #[error("failed to access index status at {path}: {message}")]
    Status {
        /// Path to the status file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A schema definition is malformed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A schema version was requested that is not registered.
    #[error("unknown schema version {version} for index {name}")]
    SchemaNotFound {
        /// Index kind name.
        name: String,
        /// Requested version.
        version: u32,
    },

    /// No schema versions are registered for an index kind.
    #[error("no schema versions registered for index {name}")]
    NoSchema {
        /// Index kind name.
        name: String,
    },

    /// A write index with the same version was registered twice.
    #[error("index version {version} is already registered as a write index")]
    DuplicateVersion {
        /// Offending version.
        version: u32,
    },

    /// No version of an index kind is ready to serve queries.
    #[error("no ready version of index {name}; run `revdex reindex` to build one offline")]
    NoReadyVersion {
        /// Index kind name.
        name: String,
    },

    /// An online reindex is already in flight for this index kind.
    #[error("reindexer for index {name} is already running")]
    ReindexerAlreadyRunning {
        /// Index kind name.
        name: String,
    },

    /// The named index kind is not managed.
    #[error("unknown index {name}")]
    UnknownIndex {
        /// Index kind name.
        name: String,
    },

    /// A reindex target is not registered as a write index.
    #[error("version {version} of index {name} is not a write index")]
    MissingWriteIndex {
        /// Index kind name.
        name: String,
        /// Target version.
        version: u32,
    },

    /// An internal invariant was violated.
    #[error("index invariant violated: {0}")]
    Invariant(String),

    /// The batch worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// A batch worker panicked while indexing a repository.
    #[error("batch worker panicked while indexing repository {repository}")]
    WorkerPanicked {
        /// Repository being indexed.
        repository: String,
    },

    /// A repository does not exist.
    #[error("repository not found: {name}")]
    RepositoryNotFound {
        /// Repository name.
        name: String,
    },

    /// A repository could not be read.
    #[error("repository {name}: {message}")]
    Repository {
        /// Repository name.
        name: String,
        /// Error message.
        message: String,
    },

    /// An offline rebuild targeted a version the live collection uses.
    #[error("index {name} version {version} is in use; rebuild it online instead")]
    VersionInUse {
        /// Index kind name.
        name: String,
        /// Index version.
        version: u32,
    },

    /// The index has been closed.
    #[error("index {name} version {version} is closed")]
    Closed {
        /// Index kind name.
        name: String,
        /// Index version.
        version: u32,
    },

    /// A query was rejected.
    #[error(transparent)]
    Query(#[from] QueryParseError),
}

impl IndexError {
    /// Creates an `OpenIndex` error from a path and Tantivy error.
    pub(crate) fn open_index(path: PathBuf, source: &tantivy::TantivyError) -> Self {
        Self::OpenIndex {
            path,
            message: source.to_string(),
        }
    }

    /// Creates a `Backend` error from a Tantivy error.
    pub(crate) fn backend(source: &tantivy::TantivyError) -> Self {
        Self::Backend(source.to_string())
    }

    /// Creates a `Repository` error.
    pub fn repository(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Repository {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Errors in a schema definition.
///
/// These are programming errors in a field registry and are fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A field name is not lowercase snake_case.
    #[error("invalid field name {name:?}: must match [a-z0-9_]+")]
    InvalidFieldName {
        /// Offending name.
        name: String,
    },

    /// An integer range field was declared repeatable.
    #[error("integer range field {name} cannot be repeatable")]
    RepeatableRange {
        /// Field name.
        name: String,
    },

    /// Two fields share a name.
    #[error("duplicate field {name}")]
    DuplicateField {
        /// Field name.
        name: String,
    },

    /// A schema version is zero.
    #[error("schema versions must be positive")]
    InvalidVersion,

    /// Versions are not strictly increasing in registration order.
    #[error("schema version {version} registered after version {previous}")]
    VersionOrder {
        /// Previously registered version.
        previous: u32,
        /// Offending version.
        version: u32,
    },
}

/// Query-time errors surfaced to the caller as a rejected query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryParseError {
    /// A predicate value could not be parsed for its field.
    #[error("invalid value {value:?} for {field}: {reason}")]
    InvalidValue {
        /// Field or operator name.
        field: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The field is not part of the index schema.
    #[error("field {field} is not supported by this index version")]
    UnknownField {
        /// Field name.
        field: String,
    },

    /// The query used an operator nobody understands.
    #[error("unsupported operator {operator:?}")]
    UnknownOperator {
        /// Operator name.
        operator: String,
    },

    /// The query has more leaf predicates than allowed.
    #[error("query has {count} terms, the limit is {max}")]
    TooManyTerms {
        /// Leaf predicates in the query.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The backend cannot evaluate a predicate.
    #[error("unsupported predicate: {predicate}")]
    Unsupported {
        /// Rendered predicate.
        predicate: String,
    },

    /// No part of the query can be answered by the index.
    #[error("query {query} cannot be answered by the index")]
    NotIndexable {
        /// Rendered query.
        query: String,
    },

    /// The requested page size is zero.
    #[error("limit must be positive")]
    InvalidLimit,
}
