//! Tantivy index backend.
//!
//! Each schema version of a document kind lives in its own Tantivy index at
//! `<index dir>/<kind>_<version:04>`. Documents are written with their schema
//! fields for querying plus the whole document as JSON, which is what reads
//! return. Every write is committed before it returns, so it is visible to the
//! next query, except inside a [`Index::defer_commits`] section: there writes
//! from many threads are staged on the shared writer and committed together by
//! [`Index::flush`].
//!
//! Keys must convert to `i64` without changing their order; results are paged
//! by that number.

mod analyzer;
mod compile;
mod schema;

use std::{
    collections::BTreeMap,
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

pub use analyzer::{REVDEX_TOKENIZER, build_analyzer};
use log::debug;
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, de::DeserializeOwned};
use tantivy::{
    DocAddress, Index as TantivyIndexHandle, IndexReader, IndexWriter, Order, ReloadPolicy,
    Searcher, TantivyDocument, TantivyError, Term,
    collector::{Count, TopDocs},
    directory::MmapDirectory,
    query::Query,
    schema::{Field, Value},
};

use self::{
    compile::QueryCompiler,
    schema::{ORDER_FIELD, StoreSchema},
};
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

/// Heap size for each index writer (50 MB).
const WRITER_HEAP_SIZE: usize = 50_000_000;

/// Returns the directory of one index version.
pub fn version_dir(root: &Path, kind: &str, version: u32) -> PathBuf {
    root.join(format!("{kind}_{version:04}"))
}

/// One schema version stored in a Tantivy index.
pub struct TantivyIndex<D: Document> {
    /// Document kind name.
    name: String,
    /// Document schema.
    schema: SchemaRef<D>,
    /// Tantivy field handles.
    store: StoreSchema,
    /// Index directory.
    path: PathBuf,
    /// Reader shared by all sources.
    reader: IndexReader,
    /// Writer; `None` once closed. Writes share it, commits take it.
    writer: RwLock<Option<IndexWriter>>,
    /// Open [`Index::defer_commits`] sections.
    deferred: AtomicUsize,
    /// Readiness metadata.
    status: Arc<dyn ReadinessStore>,
}

impl<D> TantivyIndex<D>
where
    D: Document + Serialize + DeserializeOwned,
    D::Key: Into<i64>,
{
    /// Opens or creates the index for a schema version under `root`.
    pub fn open(
        root: &Path,
        name: &str,
        schema: SchemaRef<D>,
        status: Arc<dyn ReadinessStore>,
    ) -> Result<Self, IndexError> {
        let path = version_dir(root, name, schema.version());
        let store = StoreSchema::new(&schema)?;

        fs::create_dir_all(&path)?;
        let dir = MmapDirectory::open(&path).map_err(|e| {
            let err: TantivyError = e.into();
            IndexError::open_index(path.clone(), &err)
        })?;
        let index = TantivyIndexHandle::open_or_create(dir, store.schema().clone())
            .map_err(|e| IndexError::open_index(path.clone(), &e))?;
        index
            .tokenizers()
            .register(REVDEX_TOKENIZER, build_analyzer()?);

        let writer = index
            .writer(WRITER_HEAP_SIZE)
            .map_err(|e| IndexError::open_index(path.clone(), &e))?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::open_index(path.clone(), &e))?;

        Ok(Self {
            name: name.to_string(),
            schema,
            store,
            path,
            reader,
            writer: RwLock::new(Some(writer)),
            deferred: AtomicUsize::new(0),
            status,
        })
    }

    /// Returns the index directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true until the index is closed.
    pub fn is_open(&self) -> bool {
        self.writer.read().is_some()
    }

    /// Returns the error for writes after close.
    fn closed(&self) -> IndexError {
        IndexError::Closed {
            name: self.name.clone(),
            version: self.schema.version(),
        }
    }

    /// Runs `op` against the open writer and commits unless commits are
    /// deferred.
    fn write<F>(&self, op: F) -> Result<(), IndexError>
    where
        F: FnOnce(&IndexWriter) -> Result<(), IndexError>,
    {
        {
            let guard = self.writer.read();
            let writer = guard.as_ref().ok_or_else(|| self.closed())?;
            op(writer)?;
        }
        if self.deferred.load(Ordering::Acquire) == 0 {
            self.commit()?;
        }
        Ok(())
    }

    /// Commits staged writes and reloads the reader.
    fn commit(&self) -> Result<(), IndexError> {
        let mut guard = self.writer.write();
        let writer = guard.as_mut().ok_or_else(|| self.closed())?;
        writer.commit().map_err(|e| IndexError::backend(&e))?;
        self.reader.reload().map_err(|e| IndexError::backend(&e))
    }

    /// Converts a document to its Tantivy form.
    fn to_tantivy(&self, doc: &D) -> Result<TantivyDocument, IndexError> {
        let mut out = TantivyDocument::new();
        let key = doc.key();
        out.add_text(self.store.key, key.to_string());
        out.add_i64(self.store.order, key.into());
        let json = serde_json::to_string(doc)
            .map_err(|e| IndexError::Backend(format!("failed to serialize document: {e}")))?;
        out.add_text(self.store.doc, json);
        for (def, values) in self.schema.build_fields(doc) {
            if let Some((field, _)) = self.store.field(def.name()) {
                for value in &values {
                    self.store.add_value(&mut out, field, value);
                }
            }
        }
        Ok(out)
    }
}

impl<D> Index<D> for TantivyIndex<D>
where
    D: Document + Serialize + DeserializeOwned,
    D::Key: Into<i64>,
{
    fn schema(&self) -> SchemaRef<D> {
        Arc::clone(&self.schema)
    }

    fn replace(&self, doc: &D) -> Result<(), IndexError> {
        let key = Term::from_field_text(self.store.key, &doc.key().to_string());
        let converted = self.to_tantivy(doc)?;
        self.write(|writer| {
            writer.delete_term(key);
            writer
                .add_document(converted)
                .map_err(|e| IndexError::backend(&e))?;
            Ok(())
        })
    }

    fn delete(&self, key: &D::Key) -> Result<(), IndexError> {
        let term = Term::from_field_text(self.store.key, &key.to_string());
        self.write(|writer| {
            writer.delete_term(term);
            Ok(())
        })
    }

    fn delete_all(&self) -> Result<(), IndexError> {
        self.write(|writer| {
            writer
                .delete_all_documents()
                .map_err(|e| IndexError::backend(&e))?;
            Ok(())
        })
    }

    fn defer_commits(&self) {
        self.deferred.fetch_add(1, Ordering::AcqRel);
    }

    fn flush(&self) -> Result<(), IndexError> {
        let ended = self
            .deferred
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if ended.is_err() {
            debug!(
                "flushing {} version {} outside a deferred section",
                self.name,
                self.schema.version()
            );
        }
        self.commit()
    }

    fn get_source(
        &self,
        predicate: &Predicate<D>,
        _options: &QueryOptions,
    ) -> Result<Arc<dyn DataSource<D>>, QueryParseError> {
        let query = QueryCompiler::new(&self.store).compile(predicate)?;
        Ok(Arc::new(TantivySource {
            reader: self.reader.clone(),
            query,
            doc_field: self.store.doc,
            marker: PhantomData,
        }))
    }

    fn mark_ready(&self, ready: bool) -> Result<(), IndexError> {
        self.status.set_ready(&self.name, self.schema.version(), ready);
        self.status.save()
    }

    /// Staged writes not yet flushed are discarded.
    fn close(&self) {
        self.writer.write().take();
    }
}

/// Documents matching one compiled query, newest key first.
struct TantivySource<D> {
    /// Reader of the index.
    reader: IndexReader,
    /// Compiled predicate.
    query: Box<dyn Query>,
    /// Field holding the serialized document.
    doc_field: Field,
    /// Document type.
    marker: PhantomData<fn() -> D>,
}

impl<D> TantivySource<D>
where
    D: Document + DeserializeOwned,
{
    /// Loads the stored document at `address`.
    fn load(&self, searcher: &Searcher, address: DocAddress) -> Result<D, IndexError> {
        let stored: TantivyDocument = searcher
            .doc(address)
            .map_err(|e| IndexError::backend(&e))?;
        let json = stored
            .get_first(self.doc_field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| IndexError::Backend("stored document is missing".to_string()))?;
        serde_json::from_str(json)
            .map_err(|e| IndexError::Backend(format!("failed to read stored document: {e}")))
    }
}

impl<D> DataSource<D> for TantivySource<D>
where
    D: Document + DeserializeOwned,
{
    fn cardinality(&self) -> usize {
        self.reader
            .searcher()
            .search(self.query.as_ref(), &Count)
            .unwrap_or(0)
    }

    fn read(&self, skip: usize, limit: usize) -> Result<Vec<D>, IndexError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let page = TopDocs::with_limit(limit)
            .and_offset(skip)
            .order_by_fast_field::<i64>(ORDER_FIELD, Order::Desc);
        let hits = searcher
            .search(self.query.as_ref(), &page)
            .map_err(|e| IndexError::backend(&e))?;
        hits.into_iter()
            .map(|(_, address)| self.load(&searcher, address))
            .collect()
    }
}

/// Opens Tantivy indexes for one document kind.
pub struct TantivyIndexFactory<D: Document> {
    /// Index root directory.
    root: PathBuf,
    /// Document kind name.
    name: String,
    /// Readiness metadata shared by all versions.
    status: Arc<dyn ReadinessStore>,
    /// Open indexes; a directory admits one writer at a time.
    open: Mutex<BTreeMap<u32, Arc<TantivyIndex<D>>>>,
}

impl<D: Document> TantivyIndexFactory<D> {
    /// Creates a factory for indexes under `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        status: Arc<dyn ReadinessStore>,
    ) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            status,
            open: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<D> IndexFactory<D> for TantivyIndexFactory<D>
where
    D: Document + Serialize + DeserializeOwned,
    D::Key: Into<i64>,
{
    fn create(&self, schema: SchemaRef<D>) -> Result<IndexRef<D>, IndexError> {
        let version = schema.version();
        let mut open = self.open.lock();
        if let Some(index) = open.get(&version).filter(|i| i.is_open()) {
            return Ok(Arc::clone(index) as IndexRef<D>);
        }
        let index = Arc::new(TantivyIndex::open(
            &self.root,
            &self.name,
            schema,
            Arc::clone(&self.status),
        )?);
        open.insert(version, Arc::clone(&index));
        Ok(index)
    }

    fn version_exists(&self, version: u32) -> bool {
        version_dir(&self.root, &self.name, version)
            .join("meta.json")
            .exists()
    }
}
