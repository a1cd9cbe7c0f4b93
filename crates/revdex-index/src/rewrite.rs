//! Index rewriting.
//!
//! [`IndexRewriter`] turns a predicate tree into an equivalent plan in which
//! every maximal subtree the index can answer is replaced by one
//! [`Predicate::Indexed`] node. Connectives mixing indexed and local children
//! become `AndSource`/`OrSource` nodes that read from their indexed children
//! and filter by the rest.
//!
//! Classification runs bottom-up. A field predicate known to the schema is
//! *indexed*, any other leaf is *opaque*. A connective whose children are all
//! indexed is itself indexed and left for its parent to wrap; one whose
//! children are all opaque stays opaque. When indexed and other children are
//! mixed, the indexed ones are grouped under a single wrapper placed at the
//! first indexed child's position.

use std::slice;

use crate::{
    IndexError,
    document::Document,
    index::IndexRef,
    predicate::{IndexedQuery, Predicate},
    source::QueryOptions,
};

/// Classification of a rewritten subtree.
enum Rewritten<D: Document> {
    /// The index can answer the whole subtree as is.
    Indexed,
    /// Nothing in the subtree can be answered by the index.
    Opaque,
    /// The subtree was rewritten into this plan.
    Mixed(Predicate<D>),
}

/// Which connective a node is.
#[derive(Clone, Copy)]
enum Connective {
    /// Conjunction.
    And,
    /// Disjunction.
    Or,
    /// Negation.
    Not,
}

impl Connective {
    /// Rebuilds a plain connective over `children`.
    fn plain<D: Document>(self, mut children: Vec<Predicate<D>>) -> Predicate<D> {
        match self {
            Self::And => Predicate::And(children),
            Self::Or => Predicate::Or(children),
            Self::Not => Predicate::Not(Box::new(children.remove(0))),
        }
    }

    /// Rebuilds the connective over rewritten children.
    fn source<D: Document>(self, mut children: Vec<Predicate<D>>) -> Predicate<D> {
        match self {
            Self::And => Predicate::AndSource(children),
            Self::Or => Predicate::OrSource(children),
            Self::Not => Predicate::Not(Box::new(children.remove(0))),
        }
    }
}

/// Rewrites predicate trees against one index.
pub struct IndexRewriter<'a, D: Document> {
    /// Index whose schema decides what is indexable.
    index: &'a IndexRef<D>,
    /// Options passed to the index when building sources.
    options: &'a QueryOptions,
}

impl<'a, D: Document> IndexRewriter<'a, D> {
    /// Creates a rewriter for `index`.
    pub fn new(index: &'a IndexRef<D>, options: &'a QueryOptions) -> Self {
        Self { index, options }
    }

    /// Rewrites a predicate tree into an execution plan.
    ///
    /// Opaque trees are returned unchanged. Rewriting an already rewritten
    /// plan leaves its indexed nodes in place.
    pub fn rewrite(&self, predicate: &Predicate<D>) -> Result<Predicate<D>, IndexError> {
        match self.classify(predicate)? {
            Rewritten::Indexed => self.wrap(predicate.clone()),
            Rewritten::Opaque => Ok(predicate.clone()),
            Rewritten::Mixed(plan) => Ok(plan),
        }
    }

    /// Classifies a subtree, rewriting mixed connectives.
    fn classify(&self, predicate: &Predicate<D>) -> Result<Rewritten<D>, IndexError> {
        match predicate {
            Predicate::Field(p) => {
                if self.index.schema().has_field(p.field().name()) {
                    Ok(Rewritten::Indexed)
                } else {
                    Ok(Rewritten::Opaque)
                }
            }
            Predicate::Local(_) => Ok(Rewritten::Opaque),
            Predicate::Indexed(_) | Predicate::AndSource(_) | Predicate::OrSource(_) => {
                Ok(Rewritten::Mixed(predicate.clone()))
            }
            Predicate::And(children) => self.classify_connective(Connective::And, children),
            Predicate::Or(children) => self.classify_connective(Connective::Or, children),
            Predicate::Not(child) => {
                self.classify_connective(Connective::Not, slice::from_ref(child.as_ref()))
            }
        }
    }

    /// Classifies a connective from its children.
    fn classify_connective(
        &self,
        connective: Connective,
        children: &[Predicate<D>],
    ) -> Result<Rewritten<D>, IndexError> {
        let results = children
            .iter()
            .map(|c| self.classify(c))
            .collect::<Result<Vec<_>, _>>()?;

        let indexed = results
            .iter()
            .filter(|r| matches!(r, Rewritten::Indexed))
            .count();
        let opaque = results
            .iter()
            .filter(|r| matches!(r, Rewritten::Opaque))
            .count();
        let total = results.len();

        if indexed == total {
            return Ok(Rewritten::Indexed);
        }
        if opaque == total {
            return Ok(Rewritten::Opaque);
        }
        if indexed == 0 {
            let rebuilt = children
                .iter()
                .zip(results)
                .map(|(original, result)| match result {
                    Rewritten::Mixed(plan) => plan,
                    Rewritten::Indexed | Rewritten::Opaque => original.clone(),
                })
                .collect();
            return Ok(Rewritten::Mixed(connective.source(rebuilt)));
        }

        let group: Vec<Predicate<D>> = children
            .iter()
            .zip(&results)
            .filter(|(_, r)| matches!(r, Rewritten::Indexed))
            .map(|(c, _)| c.clone())
            .collect();
        let mut wrapped = Some(match <[Predicate<D>; 1]>::try_from(group) {
            Ok([single]) => self.wrap(single)?,
            Err(group) => self.wrap(connective.plain(group))?,
        });

        let mut rebuilt = Vec::with_capacity(total - indexed + 1);
        for (original, result) in children.iter().zip(results) {
            match result {
                Rewritten::Indexed => {
                    if let Some(node) = wrapped.take() {
                        rebuilt.push(node);
                    }
                }
                Rewritten::Opaque => rebuilt.push(original.clone()),
                Rewritten::Mixed(plan) => rebuilt.push(plan),
            }
        }
        Ok(Rewritten::Mixed(connective.source(rebuilt)))
    }

    /// Delegates a fully indexable subtree to the index.
    ///
    /// A rejection here means the schema claimed a field the backend cannot
    /// query, which is an invariant violation.
    fn wrap(&self, predicate: Predicate<D>) -> Result<Predicate<D>, IndexError> {
        let source = self
            .index
            .get_source(&predicate, self.options)
            .map_err(|e| {
                IndexError::Invariant(format!(
                    "index version {} rejected indexable predicate {predicate}: {e}",
                    self.index.version()
                ))
            })?;
        Ok(Predicate::Indexed(IndexedQuery::new(
            self.index.clone(),
            predicate,
            source,
        )))
    }
}
