//! Leaf predicates bound to a schema field.

use std::{collections::BTreeSet, fmt, sync::Arc, time::SystemTime};

use crate::{
    error::QueryParseError,
    field::{FieldDef, FieldType, FieldValue, split_full_text},
};

/// Relational operator of an integer range predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `=`, the default.
    Equal,
}

impl Relation {
    /// Splits an optional relation prefix off a value.
    fn split(value: &str) -> (Self, &str) {
        let trimmed = value.trim_start();
        for (prefix, relation) in [
            (">=", Self::GreaterOrEqual),
            ("<=", Self::LessOrEqual),
            (">", Self::Greater),
            ("<", Self::Less),
            ("=", Self::Equal),
        ] {
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                return (relation, rest.trim_start());
            }
        }
        (Self::Equal, trimmed)
    }

    /// Returns the closed bounds implied by comparing against `value`.
    ///
    /// Bounds saturate at the type limits: `> i32::MAX` yields `i32::MAX`.
    fn bounds(self, value: i32) -> (i32, i32) {
        match self {
            Self::Equal => (value, value),
            Self::Greater => (value.saturating_add(1), i32::MAX),
            Self::GreaterOrEqual => (value, i32::MAX),
            Self::Less => (i32::MIN, value.saturating_sub(1)),
            Self::LessOrEqual => (i32::MIN, value),
        }
    }
}

/// Pre-parsed form of a leaf predicate's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LeafKind {
    /// String equality or prefix, depending on the field type.
    Text,
    /// Full-text token set.
    Tokens(BTreeSet<String>),
    /// Integer equality; `None` if the value did not parse and never matches.
    Number(Option<i64>),
    /// Closed integer range.
    IntegerRange {
        /// Parsed relation.
        relation: Relation,
        /// Inclusive lower bound.
        min: i32,
        /// Inclusive upper bound.
        max: i32,
    },
    /// Closed timestamp range; a missing bound is open.
    TimestampRange {
        /// Inclusive lower bound.
        min: Option<SystemTime>,
        /// Inclusive upper bound.
        max: Option<SystemTime>,
    },
}

/// A predicate on one schema field.
pub struct IndexPredicate<D> {
    /// The field this predicate reads.
    field: Arc<FieldDef<D>>,
    /// Operator name used for display.
    operator: String,
    /// Value as written in the query.
    value: String,
    /// Parsed form of `value`.
    kind: LeafKind,
}

impl<D> Clone for IndexPredicate<D> {
    fn clone(&self) -> Self {
        Self {
            field: Arc::clone(&self.field),
            operator: self.operator.clone(),
            value: self.value.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl<D> IndexPredicate<D> {
    /// Creates a predicate named after its field.
    pub fn new(field: &Arc<FieldDef<D>>, value: &str) -> Result<Self, QueryParseError> {
        Self::with_operator(field, field.name(), value)
    }

    /// Creates a predicate with an explicit operator name.
    ///
    /// Integer range values are parsed here, so malformed ranges are rejected
    /// before the query runs. Timestamp fields need
    /// [`IndexPredicate::timestamp_range`] and stored-only fields cannot be
    /// queried at all.
    pub fn with_operator(
        field: &Arc<FieldDef<D>>,
        operator: &str,
        value: &str,
    ) -> Result<Self, QueryParseError> {
        let kind = match field.field_type() {
            FieldType::Exact | FieldType::Prefix => LeafKind::Text,
            FieldType::FullText => LeafKind::Tokens(split_full_text(value)),
            FieldType::Integer => LeafKind::Number(value.trim().parse::<i32>().ok().map(i64::from)),
            FieldType::Long => LeafKind::Number(value.trim().parse::<i64>().ok()),
            FieldType::IntegerRange => parse_range(operator, value)?,
            FieldType::Timestamp | FieldType::StoredOnly => {
                return Err(QueryParseError::Unsupported {
                    predicate: format!("{operator}:{value}"),
                });
            }
        };
        Ok(Self {
            field: Arc::clone(field),
            operator: operator.to_string(),
            value: value.to_string(),
            kind,
        })
    }

    /// Creates a range predicate on a timestamp field.
    pub fn timestamp_range(
        field: &Arc<FieldDef<D>>,
        operator: &str,
        value: &str,
        min: Option<SystemTime>,
        max: Option<SystemTime>,
    ) -> Result<Self, QueryParseError> {
        if field.field_type() != FieldType::Timestamp {
            return Err(QueryParseError::Unsupported {
                predicate: format!("{operator}:{value}"),
            });
        }
        Ok(Self {
            field: Arc::clone(field),
            operator: operator.to_string(),
            value: value.to_string(),
            kind: LeafKind::TimestampRange { min, max },
        })
    }

    /// Returns the field definition.
    pub fn field(&self) -> &FieldDef<D> {
        &self.field
    }

    /// Returns the operator name.
    pub fn operator(&self) -> &str {
        &self.operator
    }

    /// Returns the value as written.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the parsed value.
    pub(crate) fn kind(&self) -> &LeafKind {
        &self.kind
    }

    /// Returns the relation of an integer range predicate.
    pub fn relation(&self) -> Option<Relation> {
        match self.kind {
            LeafKind::IntegerRange { relation, .. } => Some(relation),
            _ => None,
        }
    }

    /// Returns the inclusive lower bound of an integer range predicate.
    pub fn minimum_value(&self) -> Option<i32> {
        match self.kind {
            LeafKind::IntegerRange { min, .. } => Some(min),
            _ => None,
        }
    }

    /// Returns the inclusive upper bound of an integer range predicate.
    pub fn maximum_value(&self) -> Option<i32> {
        match self.kind {
            LeafKind::IntegerRange { max, .. } => Some(max),
            _ => None,
        }
    }

    /// Returns the local evaluation cost.
    pub fn cost(&self) -> u32 {
        self.field.field_type().cost()
    }

    /// Returns true if any of the document's values for this field match.
    pub fn matches(&self, doc: &D) -> bool {
        self.field
            .values(doc)
            .iter()
            .any(|value| self.matches_value(value))
    }

    /// Matches one extracted value.
    fn matches_value(&self, value: &FieldValue) -> bool {
        match (&self.kind, value) {
            (LeafKind::Text, FieldValue::Text(text)) => match self.field.field_type() {
                FieldType::Prefix => text.starts_with(&self.value),
                _ => *text == self.value,
            },
            (LeafKind::Tokens(query), FieldValue::Text(text)) => {
                let tokens = split_full_text(text);
                !query.is_disjoint(&tokens)
            }
            (LeafKind::Number(expected), value) => {
                expected.is_some() && value.as_i64() == *expected
            }
            (LeafKind::IntegerRange { min, max, .. }, FieldValue::Integer(v)) => {
                (*min..=*max).contains(v)
            }
            (LeafKind::TimestampRange { min, max }, FieldValue::Timestamp(t)) => {
                min.is_none_or(|m| *t >= m) && max.is_none_or(|m| *t <= m)
            }
            _ => false,
        }
    }
}

impl<D> fmt::Display for IndexPredicate<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.chars().any(char::is_whitespace) {
            write!(f, "{}:\"{}\"", self.operator, self.value)
        } else {
            write!(f, "{}:{}", self.operator, self.value)
        }
    }
}

/// Parses an integer range value with an optional relation prefix.
fn parse_range(operator: &str, value: &str) -> Result<LeafKind, QueryParseError> {
    let (relation, number) = Relation::split(value);
    let parsed = number
        .parse::<i32>()
        .map_err(|e| QueryParseError::InvalidValue {
            field: operator.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })?;
    let (min, max) = relation.bounds(parsed);
    Ok(LeafKind::IntegerRange { relation, min, max })
}
