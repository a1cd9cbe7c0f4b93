//! Storage backend contract.

use std::sync::Arc;

use crate::{
    IndexError,
    document::Document,
    error::QueryParseError,
    predicate::Predicate,
    schema::SchemaRef,
    source::{DataSource, QueryOptions},
};

/// One schema version of a document index.
///
/// Implementations must be safe to call from many threads at once.
pub trait Index<D: Document>: Send + Sync {
    /// Returns the schema this index was built against.
    fn schema(&self) -> SchemaRef<D>;

    /// Returns the schema version.
    fn version(&self) -> u32 {
        self.schema().version()
    }

    /// Inserts a document, replacing any document with the same key.
    fn replace(&self, doc: &D) -> Result<(), IndexError>;

    /// Deletes the document with this key.
    fn delete(&self, key: &D::Key) -> Result<(), IndexError>;

    /// Deletes every document.
    fn delete_all(&self) -> Result<(), IndexError>;

    /// Stages later writes instead of making each one visible on return.
    ///
    /// Staged writes become visible together at the next [`Index::flush`].
    /// Backends that apply writes immediately ignore this.
    fn defer_commits(&self) {}

    /// Makes staged writes visible and ends a [`Index::defer_commits`] section.
    fn flush(&self) -> Result<(), IndexError> {
        Ok(())
    }

    /// Builds a source for a predicate tree.
    ///
    /// Fails if the tree contains a predicate this index cannot evaluate.
    fn get_source(
        &self,
        predicate: &Predicate<D>,
        options: &QueryOptions,
    ) -> Result<Arc<dyn DataSource<D>>, QueryParseError>;

    /// Records in the readiness metadata whether this version is complete.
    fn mark_ready(&self, ready: bool) -> Result<(), IndexError>;

    /// Releases the index; later writes fail.
    fn close(&self);
}

/// Shared handle to an index.
pub type IndexRef<D> = Arc<dyn Index<D>>;

/// Opens indexes for one document kind.
pub trait IndexFactory<D: Document>: Send + Sync {
    /// Opens or creates the index for a schema version.
    fn create(&self, schema: SchemaRef<D>) -> Result<IndexRef<D>, IndexError>;

    /// Returns true if data for this version exists.
    fn version_exists(&self, version: u32) -> bool;
}
