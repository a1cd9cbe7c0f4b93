//! Versioned secondary indexes for revdex.
//!
//! This crate provides:
//! - Typed field definitions and versioned schemas ([`FieldDef`], [`Schema`],
//!   [`SchemaDefinitions`])
//! - Boolean predicate trees evaluated locally or by an index ([`Predicate`])
//! - The rewriter that splits a tree into indexed and local parts
//!   ([`IndexRewriter`]) and the source connectives that read from it
//! - The live set of search and write indexes per document kind
//!   ([`IndexCollection`]) and the version lifecycle around it
//!   ([`VersionManager`], [`OnlineReindexer`])
//! - Parallel rebuilds from repositories ([`BatchIndexer`])
//! - In-memory and Tantivy backends
//!
//! # Example
//!
//! ```ignore
//! use revdex_index::{IndexCollection, QueryOptions, QueryProcessor};
//!
//! let collection = Arc::new(IndexCollection::new("changes"));
//! let processor = QueryProcessor::new(collection, QueryOptions::default());
//! let page = processor.query(&predicate, 0, 25)?;
//! ```

#![warn(missing_docs)]

mod batch;
mod collection;
mod document;
mod error;
mod field;
mod index;
mod indexer;
mod memory;
mod predicate;
mod processor;
mod reindexer;
mod rewrite;
mod schema;
mod source;
mod status;
mod store;
#[cfg(test)]
mod test_support;
mod versions;

pub use batch::{
    BatchIndexer, BatchProgress, BatchResult, DocumentLoader, FileDiff, ObjectId,
    ProgressReporter, Repository, RepositoryProvider, RevWalk, SilentReporter, SiteIndexer, Task,
};
pub use collection::IndexCollection;
pub use document::Document;
pub use error::{IndexError, QueryParseError, SchemaError};
pub use field::{FieldBuilder, FieldCarrier, FieldDef, FieldType, FieldValue, split_full_text};
pub use index::{Index, IndexFactory, IndexRef};
pub use indexer::DocumentIndexer;
pub use memory::{MemoryIndex, MemoryIndexFactory};
pub use predicate::{IndexPredicate, IndexedQuery, LocalPredicate, Predicate, Relation};
pub use processor::{QueryProcessor, QueryResult};
pub use reindexer::{OnlineReindexer, ReindexHandle};
pub use rewrite::IndexRewriter;
pub use schema::{Schema, SchemaDefinitions, SchemaRef};
pub use source::{
    DEFAULT_MAX_LIMIT, DEFAULT_MAX_PAGES, DEFAULT_MAX_TERMS, DataSource, QueryOptions, read_source,
};
pub use status::{
    FileReadinessStore, IndexStatus, MemoryReadinessStore, ReadinessStore, STATUS_FILENAME,
    VersionStatus,
};
pub use store::{REVDEX_TOKENIZER, TantivyIndex, TantivyIndexFactory, build_analyzer, version_dir};
pub use versions::{IndexDefinition, VersionInfo, VersionManager};
