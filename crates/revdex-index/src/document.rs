//! The indexed unit.

use std::{
    fmt::{Debug, Display},
    hash::Hash,
};

/// A document stored in a secondary index.
///
/// Documents are identified by a stable key. Query results are ordered by key,
/// newest (largest) first.
pub trait Document: Clone + Send + Sync + 'static {
    /// Stable identity of a document.
    type Key: Clone + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static;

    /// Returns this document's key.
    fn key(&self) -> Self::Key;
}
