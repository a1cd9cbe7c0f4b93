//! In-memory index backend.
//!
//! Keeps documents in a sorted map and answers predicates by scanning it.
//! Used by tests and by the `memory` backend setting for small sites.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{
    IndexError,
    document::Document,
    error::QueryParseError,
    index::{Index, IndexFactory, IndexRef},
    predicate::Predicate,
    schema::SchemaRef,
    source::{DataSource, QueryOptions},
    status::ReadinessStore,
};

/// Documents keyed for descending iteration.
type DocumentMap<D> = BTreeMap<<D as Document>::Key, D>;

/// One index version held in memory.
pub struct MemoryIndex<D: Document> {
    /// Document kind name, used for readiness metadata.
    name: String,
    /// Schema of this version.
    schema: SchemaRef<D>,
    /// Indexed documents.
    docs: Arc<RwLock<DocumentMap<D>>>,
    /// Readiness metadata.
    status: Arc<dyn ReadinessStore>,
    /// Set once the index is closed.
    closed: AtomicBool,
}

impl<D: Document> MemoryIndex<D> {
    /// Creates an empty index.
    pub fn new(name: impl Into<String>, schema: SchemaRef<D>, status: Arc<dyn ReadinessStore>) -> Self {
        Self {
            name: name.into(),
            schema,
            docs: Arc::new(RwLock::new(BTreeMap::new())),
            status,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the number of documents.
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    /// Returns true if the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Returns true once the index was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fails if the index was closed.
    fn ensure_open(&self) -> Result<(), IndexError> {
        if self.is_closed() {
            return Err(IndexError::Closed {
                name: self.name.clone(),
                version: self.schema.version(),
            });
        }
        Ok(())
    }

    /// Checks that every leaf of a tree is a field of this schema.
    fn validate(&self, predicate: &Predicate<D>) -> Result<(), QueryParseError> {
        match predicate {
            Predicate::And(children) | Predicate::Or(children) => {
                children.iter().try_for_each(|c| self.validate(c))
            }
            Predicate::Not(child) => self.validate(child),
            Predicate::Field(p) => {
                if self.schema.has_field(p.field().name()) {
                    Ok(())
                } else {
                    Err(QueryParseError::UnknownField {
                        field: p.field().name().to_string(),
                    })
                }
            }
            Predicate::Local(_)
            | Predicate::Indexed(_)
            | Predicate::AndSource(_)
            | Predicate::OrSource(_) => Err(QueryParseError::Unsupported {
                predicate: predicate.to_string(),
            }),
        }
    }
}

impl<D: Document> Index<D> for MemoryIndex<D> {
    fn schema(&self) -> SchemaRef<D> {
        Arc::clone(&self.schema)
    }

    fn replace(&self, doc: &D) -> Result<(), IndexError> {
        self.ensure_open()?;
        self.docs.write().insert(doc.key(), doc.clone());
        Ok(())
    }

    fn delete(&self, key: &D::Key) -> Result<(), IndexError> {
        self.ensure_open()?;
        self.docs.write().remove(key);
        Ok(())
    }

    fn delete_all(&self) -> Result<(), IndexError> {
        self.ensure_open()?;
        self.docs.write().clear();
        Ok(())
    }

    fn get_source(
        &self,
        predicate: &Predicate<D>,
        _options: &QueryOptions,
    ) -> Result<Arc<dyn DataSource<D>>, QueryParseError> {
        self.validate(predicate)?;
        Ok(Arc::new(MemorySource {
            docs: Arc::clone(&self.docs),
            predicate: predicate.clone(),
        }))
    }

    fn mark_ready(&self, ready: bool) -> Result<(), IndexError> {
        self.status.set_ready(&self.name, self.schema.version(), ready);
        self.status.save()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Scans an in-memory index for one predicate.
struct MemorySource<D: Document> {
    /// Shared document map of the index.
    docs: Arc<RwLock<DocumentMap<D>>>,
    /// Predicate to filter by.
    predicate: Predicate<D>,
}

impl<D: Document> DataSource<D> for MemorySource<D> {
    fn cardinality(&self) -> usize {
        self.docs
            .read()
            .values()
            .filter(|doc| self.predicate.matches(doc))
            .count()
    }

    fn read(&self, skip: usize, limit: usize) -> Result<Vec<D>, IndexError> {
        Ok(self
            .docs
            .read()
            .values()
            .rev()
            .filter(|doc| self.predicate.matches(doc))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Creates in-memory indexes, remembering every version it created.
pub struct MemoryIndexFactory<D: Document> {
    /// Document kind name.
    name: String,
    /// Readiness metadata shared by all versions.
    status: Arc<dyn ReadinessStore>,
    /// Indexes created so far.
    created: Mutex<BTreeMap<u32, Arc<MemoryIndex<D>>>>,
}

impl<D: Document> MemoryIndexFactory<D> {
    /// Creates a factory for a document kind.
    pub fn new(name: impl Into<String>, status: Arc<dyn ReadinessStore>) -> Self {
        Self {
            name: name.into(),
            status,
            created: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the index created for a version.
    pub fn created(&self, version: u32) -> Option<Arc<MemoryIndex<D>>> {
        self.created.lock().get(&version).cloned()
    }
}

impl<D: Document> IndexFactory<D> for MemoryIndexFactory<D> {
    fn create(&self, schema: SchemaRef<D>) -> Result<IndexRef<D>, IndexError> {
        let version = schema.version();
        let mut created = self.created.lock();
        let docs = match created.get(&version) {
            Some(existing) if !existing.is_closed() => return Ok(existing.clone()),
            Some(existing) => Arc::clone(&existing.docs),
            None => Arc::default(),
        };
        let index = Arc::new(MemoryIndex {
            docs,
            ..MemoryIndex::new(self.name.clone(), schema, Arc::clone(&self.status))
        });
        created.insert(version, Arc::clone(&index));
        Ok(index)
    }

    fn version_exists(&self, version: u32) -> bool {
        self.created.lock().contains_key(&version)
    }
}
