//! Boolean predicate trees.
//!
//! A [`Predicate`] is an immutable expression tree over documents. Leaves are
//! either [`IndexPredicate`]s bound to a schema field, which an index backend
//! may answer, or [`LocalPredicate`]s that can only be evaluated against a
//! loaded document. The rewriter adds three more node kinds: [`IndexedQuery`]
//! wraps a subtree delegated to a backend, and `AndSource`/`OrSource` are the
//! connectives that read from such subtrees.

mod leaf;

use std::{fmt, slice, sync::Arc};

pub(crate) use leaf::LeafKind;
pub use leaf::{IndexPredicate, Relation};

use crate::{
    document::Document,
    error::QueryParseError,
    field::FieldDef,
    index::IndexRef,
    source::DataSource,
};

/// A predicate evaluated only against loaded documents.
pub trait LocalPredicate<D>: Send + Sync {
    /// Returns true if the document matches.
    fn matches(&self, doc: &D) -> bool;

    /// Relative evaluation cost.
    fn cost(&self) -> u32 {
        1
    }

    /// Renders the predicate in query syntax.
    fn describe(&self) -> String;
}

/// A subtree answered by an index backend.
pub struct IndexedQuery<D: Document> {
    /// Index that produced the source.
    index: IndexRef<D>,
    /// The delegated subtree.
    predicate: Box<Predicate<D>>,
    /// Backend source for the subtree.
    source: Arc<dyn DataSource<D>>,
}

impl<D: Document> Clone for IndexedQuery<D> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            predicate: self.predicate.clone(),
            source: Arc::clone(&self.source),
        }
    }
}

impl<D: Document> IndexedQuery<D> {
    /// Wraps a subtree and the source a backend built for it.
    pub fn new(index: IndexRef<D>, predicate: Predicate<D>, source: Arc<dyn DataSource<D>>) -> Self {
        Self {
            index,
            predicate: Box::new(predicate),
            source,
        }
    }

    /// Returns the delegated subtree.
    pub fn predicate(&self) -> &Predicate<D> {
        &self.predicate
    }

    /// Returns the backend source.
    pub fn source(&self) -> &Arc<dyn DataSource<D>> {
        &self.source
    }

    /// Returns the version of the index answering the subtree.
    pub fn version(&self) -> u32 {
        self.index.version()
    }
}

/// A boolean expression over documents.
pub enum Predicate<D: Document> {
    /// All children match.
    And(Vec<Self>),
    /// Any child matches.
    Or(Vec<Self>),
    /// The child does not match.
    Not(Box<Self>),
    /// Field predicate a backend can answer.
    Field(IndexPredicate<D>),
    /// Predicate evaluated locally.
    Local(Arc<dyn LocalPredicate<D>>),
    /// Subtree answered by a backend.
    Indexed(IndexedQuery<D>),
    /// Conjunction reading from its cheapest source child.
    AndSource(Vec<Self>),
    /// Deduplicating union of source children.
    OrSource(Vec<Self>),
}

impl<D: Document> Clone for Predicate<D> {
    fn clone(&self) -> Self {
        match self {
            Self::And(children) => Self::And(children.clone()),
            Self::Or(children) => Self::Or(children.clone()),
            Self::Not(child) => Self::Not(child.clone()),
            Self::Field(p) => Self::Field(p.clone()),
            Self::Local(p) => Self::Local(Arc::clone(p)),
            Self::Indexed(q) => Self::Indexed(q.clone()),
            Self::AndSource(children) => Self::AndSource(children.clone()),
            Self::OrSource(children) => Self::OrSource(children.clone()),
        }
    }
}

impl<D: Document> Predicate<D> {
    /// Creates a conjunction, flattening nested conjunctions.
    pub fn and(children: Vec<Self>) -> Self {
        let mut flat: Vec<Self> = children
            .into_iter()
            .flat_map(|c| match c {
                Self::And(inner) => inner,
                other => vec![other],
            })
            .collect();
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Self::And(flat)
        }
    }

    /// Creates a disjunction, flattening nested disjunctions.
    pub fn or(children: Vec<Self>) -> Self {
        let mut flat: Vec<Self> = children
            .into_iter()
            .flat_map(|c| match c {
                Self::Or(inner) => inner,
                other => vec![other],
            })
            .collect();
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Self::Or(flat)
        }
    }

    /// Negates a predicate.
    pub fn not(child: Self) -> Self {
        Self::Not(Box::new(child))
    }

    /// Creates a field predicate named after the field.
    pub fn field(field: &Arc<FieldDef<D>>, value: &str) -> Result<Self, QueryParseError> {
        IndexPredicate::new(field, value).map(Self::Field)
    }

    /// Wraps a local predicate.
    pub fn local(predicate: impl LocalPredicate<D> + 'static) -> Self {
        Self::Local(Arc::new(predicate))
    }

    /// Returns the children of a connective.
    pub fn children(&self) -> &[Self] {
        match self {
            Self::And(c) | Self::Or(c) | Self::AndSource(c) | Self::OrSource(c) => c,
            Self::Not(c) => slice::from_ref(c.as_ref()),
            Self::Field(_) | Self::Local(_) | Self::Indexed(_) => &[],
        }
    }

    /// Evaluates the predicate against a loaded document.
    ///
    /// Conjunctions evaluate their cheapest children first.
    pub fn matches(&self, doc: &D) -> bool {
        match self {
            Self::And(children) | Self::AndSource(children) => {
                let mut ordered: Vec<&Self> = children.iter().collect();
                ordered.sort_by_key(|c| c.cost());
                ordered.into_iter().all(|c| c.matches(doc))
            }
            Self::Or(children) | Self::OrSource(children) => children.iter().any(|c| c.matches(doc)),
            Self::Not(child) => !child.matches(doc),
            Self::Field(p) => p.matches(doc),
            Self::Local(p) => p.matches(doc),
            Self::Indexed(q) => q.predicate.matches(doc),
        }
    }

    /// Relative evaluation cost, used to order conjunctions.
    pub fn cost(&self) -> u32 {
        match self {
            Self::And(children)
            | Self::Or(children)
            | Self::AndSource(children)
            | Self::OrSource(children) => children.iter().map(Self::cost).sum(),
            Self::Not(child) => child.cost(),
            Self::Field(p) => p.cost(),
            Self::Local(p) => p.cost(),
            Self::Indexed(_) => 0,
        }
    }

    /// Estimated number of results, for nodes backed by a source.
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            Self::Indexed(q) => Some(q.source.cardinality()),
            Self::AndSource(children) => children.iter().filter_map(Self::cardinality).min(),
            Self::OrSource(children) => children
                .iter()
                .map(Self::cardinality)
                .sum::<Option<usize>>(),
            _ => None,
        }
    }

    /// Counts leaf predicates, looking through indexed subtrees.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Field(_) | Self::Local(_) => 1,
            Self::Indexed(q) => q.predicate.leaf_count(),
            _ => self.children().iter().map(Self::leaf_count).sum(),
        }
    }

    /// Returns true if documents can be read from this node.
    pub fn is_source(&self) -> bool {
        match self {
            Self::Indexed(_) => true,
            Self::AndSource(children) => children.iter().any(Self::is_source),
            Self::OrSource(children) => !children.is_empty() && children.iter().all(Self::is_source),
            _ => false,
        }
    }

    /// Writes children joined by a separator.
    fn fmt_joined(f: &mut fmt::Formatter<'_>, children: &[Self], sep: &str) -> fmt::Result {
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            write!(f, "{child}")?;
        }
        Ok(())
    }
}

impl<D: Document> fmt::Display for Predicate<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(children) => {
                f.write_str("(")?;
                Self::fmt_joined(f, children, " AND ")?;
                f.write_str(")")
            }
            Self::Or(children) => {
                f.write_str("(")?;
                Self::fmt_joined(f, children, " OR ")?;
                f.write_str(")")
            }
            Self::Not(child) => write!(f, "NOT {child}"),
            Self::Field(p) => write!(f, "{p}"),
            Self::Local(p) => f.write_str(&p.describe()),
            Self::Indexed(q) => write!(f, "index[v{}]({})", q.version(), q.predicate),
            Self::AndSource(children) => {
                f.write_str("AndSource(")?;
                Self::fmt_joined(f, children, ", ")?;
                f.write_str(")")
            }
            Self::OrSource(children) => {
                f.write_str("OrSource(")?;
                Self::fmt_joined(f, children, ", ")?;
                f.write_str(")")
            }
        }
    }
}

impl<D: Document> fmt::Debug for Predicate<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
