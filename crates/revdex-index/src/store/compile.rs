//! Predicate compiler.
//!
//! Compiles predicate trees into Tantivy queries. Only plain connectives and
//! field predicates compile; anything else is rejected as unsupported.

use std::{ops::Bound, time::SystemTime};

use tantivy::{
    Term,
    query::{AllQuery, BooleanQuery, Occur, Query, RangeQuery, RegexQuery, TermQuery},
    schema::{Field, IndexRecordOption},
};

use super::schema::{StoreSchema, to_nanos};
use crate::{
    document::Document,
    error::QueryParseError,
    field::FieldType,
    predicate::{IndexPredicate, LeafKind, Predicate},
};

/// Compiles predicates against one store schema.
pub struct QueryCompiler<'a> {
    /// Field handles.
    schema: &'a StoreSchema,
}

impl<'a> QueryCompiler<'a> {
    /// Creates a compiler.
    pub fn new(schema: &'a StoreSchema) -> Self {
        Self { schema }
    }

    /// Compiles a predicate tree.
    pub fn compile<D: Document>(
        &self,
        predicate: &Predicate<D>,
    ) -> Result<Box<dyn Query>, QueryParseError> {
        match predicate {
            Predicate::And(children) => {
                let clauses = children
                    .iter()
                    .map(|c| self.compile_clause(c, Occur::Must))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Box::new(Self::with_base(clauses)))
            }
            Predicate::Or(children) => {
                let clauses = children
                    .iter()
                    .map(|c| Ok((Occur::Should, self.compile(c)?)))
                    .collect::<Result<Vec<_>, QueryParseError>>()?;
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
            Predicate::Not(child) => {
                let clauses = vec![(Occur::MustNot, self.compile(child)?)];
                Ok(Box::new(Self::with_base(clauses)))
            }
            Predicate::Field(p) => self.compile_field(p),
            Predicate::Local(_)
            | Predicate::Indexed(_)
            | Predicate::AndSource(_)
            | Predicate::OrSource(_) => Err(QueryParseError::Unsupported {
                predicate: predicate.to_string(),
            }),
        }
    }

    /// Compiles a conjunct, turning negations into `MustNot` clauses.
    fn compile_clause<D: Document>(
        &self,
        predicate: &Predicate<D>,
        occur: Occur,
    ) -> Result<(Occur, Box<dyn Query>), QueryParseError> {
        match predicate {
            Predicate::Not(child) => Ok((Occur::MustNot, self.compile(child)?)),
            other => Ok((occur, self.compile(other)?)),
        }
    }

    /// Adds a match-all clause when every clause is negative.
    fn with_base(mut clauses: Vec<(Occur, Box<dyn Query>)>) -> BooleanQuery {
        if clauses.iter().all(|(occur, _)| *occur == Occur::MustNot) {
            clauses.insert(0, (Occur::Must, Box::new(AllQuery)));
        }
        BooleanQuery::new(clauses)
    }

    /// Compiles a field predicate.
    fn compile_field<D>(&self, p: &IndexPredicate<D>) -> Result<Box<dyn Query>, QueryParseError> {
        let name = p.field().name();
        let (field, field_type) =
            self.schema
                .field(name)
                .ok_or_else(|| QueryParseError::UnknownField {
                    field: name.to_string(),
                })?;

        match (p.kind(), field_type) {
            (LeafKind::Text, FieldType::Exact) => Ok(term_query(Term::from_field_text(field, p.value()))),
            (LeafKind::Text, FieldType::Prefix) => prefix_query(field, p.value()),
            (LeafKind::Tokens(tokens), _) => {
                let clauses = tokens
                    .iter()
                    .map(|t| (Occur::Should, term_query(Term::from_field_text(field, t))))
                    .collect();
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
            (LeafKind::Number(Some(n)), _) => Ok(term_query(Term::from_field_i64(field, *n))),
            (LeafKind::Number(None), _) => Ok(Box::new(BooleanQuery::new(Vec::new()))),
            (LeafKind::IntegerRange { min, max, .. }, _) => Ok(Box::new(RangeQuery::new_i64_bounds(
                name.to_string(),
                Bound::Included(i64::from(*min)),
                Bound::Included(i64::from(*max)),
            ))),
            (LeafKind::TimestampRange { min, max }, _) => {
                let bound = |t: &Option<SystemTime>| match t {
                    Some(t) => Bound::Included(to_nanos(*t)),
                    None => Bound::Unbounded,
                };
                Ok(Box::new(RangeQuery::new_i64_bounds(
                    name.to_string(),
                    bound(min),
                    bound(max),
                )))
            }
            (LeafKind::Text, _) => Err(QueryParseError::Unsupported {
                predicate: p.to_string(),
            }),
        }
    }
}

/// Builds an exact term query.
fn term_query(term: Term) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

/// Builds a query matching values that start with `prefix`.
fn prefix_query(field: Field, prefix: &str) -> Result<Box<dyn Query>, QueryParseError> {
    let pattern = format!("{}.*", regex::escape(prefix));
    RegexQuery::from_pattern(&pattern, field)
        .map(|q| Box::new(q) as Box<dyn Query>)
        .map_err(|e| QueryParseError::InvalidValue {
            field: "prefix".to_string(),
            value: prefix.to_string(),
            reason: e.to_string(),
        })
}
