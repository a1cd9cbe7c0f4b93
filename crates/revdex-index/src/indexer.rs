//! Live document updates.
//!
//! Every change to a document is written to all write indexes of its kind, so
//! a version being rebuilt in the background never misses an update.

use std::sync::Arc;

use log::{debug, error};

use crate::{collection::IndexCollection, document::Document};

/// Fans document updates out to every write index.
pub struct DocumentIndexer<D: Document> {
    /// Indexes of the document kind.
    collection: Arc<IndexCollection<D>>,
}

impl<D: Document> DocumentIndexer<D> {
    /// Creates an indexer for a collection.
    pub fn new(collection: Arc<IndexCollection<D>>) -> Self {
        Self { collection }
    }

    /// Writes a document to every write index.
    ///
    /// A failing index is logged and skipped; the remaining indexes still
    /// receive the update. Returns the number of indexes that failed.
    pub fn index(&self, doc: &D) -> usize {
        let key = doc.key();
        let mut failed = 0;
        for index in self.collection.write_indexes() {
            if let Err(e) = index.replace(doc) {
                error!(
                    "failed to index {key} in {} version {}: {e}",
                    self.collection.name(),
                    index.version()
                );
                failed += 1;
            }
        }
        debug!("indexed {key} in {}", self.collection.name());
        failed
    }

    /// Removes a document from every write index.
    ///
    /// Failures are handled as in [`DocumentIndexer::index`].
    pub fn delete(&self, key: &D::Key) -> usize {
        let mut failed = 0;
        for index in self.collection.write_indexes() {
            if let Err(e) = index.delete(key) {
                error!(
                    "failed to delete {key} from {} version {}: {e}",
                    self.collection.name(),
                    index.version()
                );
                failed += 1;
            }
        }
        failed
    }
}
