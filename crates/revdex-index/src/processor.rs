//! Query execution against the search index.

use std::sync::Arc;

use crate::{
    IndexError,
    collection::IndexCollection,
    document::Document,
    error::QueryParseError,
    predicate::Predicate,
    rewrite::IndexRewriter,
    source::{QueryOptions, read_source},
};

/// One page of query results.
#[derive(Debug, Clone)]
pub struct QueryResult<D> {
    /// Matching documents, largest key first.
    pub documents: Vec<D>,
    /// True if more results follow this page.
    pub more: bool,
    /// The rewritten plan that was executed.
    pub plan: String,
}

/// Runs predicate trees against a collection's search index.
pub struct QueryProcessor<D: Document> {
    /// Indexes of the document kind.
    collection: Arc<IndexCollection<D>>,
    /// Configured limits.
    options: QueryOptions,
}

impl<D: Document> QueryProcessor<D> {
    /// Creates a processor with configured limits.
    pub fn new(collection: Arc<IndexCollection<D>>, options: QueryOptions) -> Self {
        Self {
            collection,
            options,
        }
    }

    /// Returns the configured limits.
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Returns one page of documents matching `predicate`.
    ///
    /// `limit` is clamped to the configured maximum. The query is rejected if
    /// it has too many terms or no part of it can be read from the index.
    pub fn query(
        &self,
        predicate: &Predicate<D>,
        start: usize,
        limit: usize,
    ) -> Result<QueryResult<D>, IndexError> {
        let count = predicate.leaf_count();
        if count > self.options.max_terms {
            return Err(QueryParseError::TooManyTerms {
                count,
                max: self.options.max_terms,
            }
            .into());
        }
        if limit == 0 {
            return Err(QueryParseError::InvalidLimit.into());
        }
        let limit = limit.min(self.options.max_limit);
        let options = self.options.with_page(start, limit);

        let index = self
            .collection
            .search_index()
            .ok_or_else(|| IndexError::UnknownIndex {
                name: self.collection.name().to_string(),
            })?;
        let plan = IndexRewriter::new(&index, &options).rewrite(predicate)?;
        if !plan.is_source() {
            return Err(QueryParseError::NotIndexable {
                query: predicate.to_string(),
            }
            .into());
        }

        let mut documents = read_source(&plan, start, limit + 1, options.max_pages)?;
        let more = documents.len() > limit;
        documents.truncate(limit);
        Ok(QueryResult {
            documents,
            more,
            plan: plan.to_string(),
        })
    }
}
