//! Reading documents from rewritten predicate trees.
//!
//! Backends return a [`DataSource`] for each subtree they answer. The
//! connectives above those subtrees are read here: an `AndSource` pages
//! through its cheapest source child and filters locally, an `OrSource` reads
//! every child concurrently and merges the results without duplicates.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;

use crate::{IndexError, document::Document, error::QueryParseError, predicate::Predicate};

/// Default largest page a query may request.
pub const DEFAULT_MAX_LIMIT: usize = 500;

/// Default number of pages an AND source scans.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Default number of leaf predicates per query.
pub const DEFAULT_MAX_TERMS: usize = 500;

/// Documents matching one indexed subtree.
///
/// Results are ordered by key, largest first.
pub trait DataSource<D: Document>: Send + Sync {
    /// Estimated number of matching documents.
    fn cardinality(&self) -> usize;

    /// Reads up to `limit` documents after skipping `skip`.
    fn read(&self, skip: usize, limit: usize) -> Result<Vec<D>, IndexError>;
}

/// Paging and limits for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Results to skip.
    pub start: usize,
    /// Results to return.
    pub limit: usize,
    /// Largest permitted `limit`.
    pub max_limit: usize,
    /// Pages an AND source may scan.
    pub max_pages: usize,
    /// Leaf predicates a query may contain.
    pub max_terms: usize,
    /// Stored fields the caller needs; empty means all.
    pub fields: BTreeSet<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            start: 0,
            limit: DEFAULT_MAX_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            max_pages: DEFAULT_MAX_PAGES,
            max_terms: DEFAULT_MAX_TERMS,
            fields: BTreeSet::new(),
        }
    }
}

impl QueryOptions {
    /// Creates options from configured limits; zero selects the default.
    pub fn new(max_limit: usize, max_pages: usize, max_terms: usize) -> Self {
        let or_default = |value: usize, default: usize| if value == 0 { default } else { value };
        let max_limit = or_default(max_limit, DEFAULT_MAX_LIMIT);
        Self {
            start: 0,
            limit: max_limit,
            max_limit,
            max_pages: or_default(max_pages, DEFAULT_MAX_PAGES),
            max_terms: or_default(max_terms, DEFAULT_MAX_TERMS),
            fields: BTreeSet::new(),
        }
    }

    /// Returns a copy for a single page of results.
    pub fn with_page(&self, start: usize, limit: usize) -> Self {
        Self {
            start,
            limit,
            ..self.clone()
        }
    }

    /// Returns a copy restricted to the named stored fields.
    pub fn with_fields<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }
}

/// Reads a page of documents from a rewritten predicate tree.
///
/// Fails with [`QueryParseError::NotIndexable`] if `plan` is not a source.
pub fn read_source<D: Document>(
    plan: &Predicate<D>,
    skip: usize,
    limit: usize,
    max_pages: usize,
) -> Result<Vec<D>, IndexError> {
    match plan {
        Predicate::Indexed(query) => query.source().read(skip, limit),
        Predicate::AndSource(children) if plan.is_source() => {
            read_and(children, skip, limit, max_pages)
        }
        Predicate::OrSource(children) if plan.is_source() => {
            read_or(children, skip, limit, max_pages)
        }
        _ => Err(QueryParseError::NotIndexable {
            query: plan.to_string(),
        }
        .into()),
    }
}

/// Reads from the cheapest source child, filtering by the others.
fn read_and<D: Document>(
    children: &[Predicate<D>],
    skip: usize,
    limit: usize,
    max_pages: usize,
) -> Result<Vec<D>, IndexError> {
    let Some(driver) = children
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_source())
        .min_by_key(|(_, c)| c.cardinality().unwrap_or(usize::MAX))
        .map(|(i, _)| i)
    else {
        return Ok(Vec::new());
    };
    let filters: Vec<&Predicate<D>> = children
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != driver)
        .map(|(_, c)| c)
        .collect();

    let wanted = skip.saturating_add(limit);
    let page = wanted.max(1);
    let mut matched = Vec::new();
    let mut offset = 0;
    for _ in 0..max_pages.max(1) {
        let batch = read_source(&children[driver], offset, page, max_pages)?;
        let read = batch.len();
        matched.extend(
            batch
                .into_iter()
                .filter(|doc| filters.iter().all(|f| f.matches(doc))),
        );
        if matched.len() >= wanted || read < page {
            break;
        }
        offset += read;
    }
    Ok(matched.into_iter().skip(skip).take(limit).collect())
}

/// Reads every child concurrently and merges by key.
fn read_or<D: Document>(
    children: &[Predicate<D>],
    skip: usize,
    limit: usize,
    max_pages: usize,
) -> Result<Vec<D>, IndexError> {
    let wanted = skip.saturating_add(limit);
    let batches: Vec<Vec<D>> = children
        .par_iter()
        .map(|child| read_source(child, 0, wanted, max_pages))
        .collect::<Result<_, _>>()?;

    let mut merged = BTreeMap::new();
    for doc in batches.into_iter().flatten() {
        merged.entry(doc.key()).or_insert(doc);
    }
    Ok(merged.into_values().rev().skip(skip).take(limit).collect())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn options_default_zero_limits() {
        let options = QueryOptions::new(0, 7, 0);
        assert_eq!(options.max_limit, DEFAULT_MAX_LIMIT);
        assert_eq!(options.max_pages, 7);
        assert_eq!(options.max_terms, DEFAULT_MAX_TERMS);
        assert_eq!(options.limit, DEFAULT_MAX_LIMIT);
    }

    #[test]
    fn options_paging_keeps_limits() {
        let options = QueryOptions::new(20, 3, 9).with_page(5, 10).with_fields(["project"]);
        assert_eq!(options.start, 5);
        assert_eq!(options.limit, 10);
        assert_eq!(options.max_limit, 20);
        assert!(options.fields.contains("project"));
    }
}
