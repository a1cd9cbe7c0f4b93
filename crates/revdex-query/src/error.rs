//! Syntax errors in review queries.

use std::{error, fmt};

use thiserror::Error;

/// The specific problem found in a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryErrorKind {
    /// A `"` phrase runs to the end of the query.
    #[error("quoted phrase is never closed")]
    UnterminatedQuote,

    /// A `{` exact value runs to the end of the query.
    #[error("'{{' value is never closed")]
    UnterminatedBrace,

    /// A `"..."` or `{...}` value holds nothing.
    #[error("quoted value is empty")]
    EmptyValue,

    /// A `(` has no matching `)`.
    #[error("group is never closed")]
    UnclosedGroup,

    /// A `(` is directly followed by `)`.
    #[error("group is empty")]
    EmptyGroup,

    /// A `)` has no matching `(`.
    #[error("')' closes no group")]
    StrayClose,

    /// `AND` or `OR` appears where a term must start.
    #[error("{keyword} needs a term before it")]
    DanglingKeyword {
        /// The keyword as written in the query language.
        keyword: &'static str,
    },

    /// An operator is followed by whitespace, `)` or nothing.
    #[error("operator '{operator}:' has no value")]
    MissingValue {
        /// Operator name.
        operator: String,
    },

    /// The query stops after a keyword or negation.
    #[error("query ends where a term was expected")]
    UnexpectedEnd,
}

impl QueryErrorKind {
    /// Returns a short fix-up hint for the person who wrote the query.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::UnterminatedQuote => "close the phrase with \", e.g. message:\"fix the build\"",
            Self::UnterminatedBrace => "close the value with }, e.g. project:{tools/gerrit}",
            Self::EmptyValue => "put at least one word between the quotes",
            Self::UnclosedGroup => "add ) to close the group",
            Self::EmptyGroup => "put at least one term inside the parentheses",
            Self::StrayClose => "remove the ) or add the ( it belongs to",
            Self::DanglingKeyword { .. } => "join two terms, e.g. owner:alice OR owner:bob",
            Self::MissingValue { .. } => "write the value right after the colon, e.g. status:open",
            Self::UnexpectedEnd => "finish the query with a term, or drop the trailing keyword",
        }
    }
}

/// A query that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// What went wrong.
    pub kind: QueryErrorKind,
    /// Byte offset of the offending token in `query`.
    pub offset: usize,
    /// The full query text.
    pub query: String,
}

impl QueryError {
    /// Creates an error at `offset` of `query`.
    pub fn new(kind: QueryErrorKind, offset: usize, query: &str) -> Self {
        Self {
            kind,
            offset: offset.min(query.len()),
            query: query.to_owned(),
        }
    }

    /// Returns the 1-based character column of the offending token.
    pub fn column(&self) -> usize {
        self.query
            .get(..self.offset)
            .map_or(self.offset, |head| head.chars().count())
            + 1
    }

    /// Renders the query with a caret under the problem and a hint.
    pub fn context(&self) -> String {
        let pad = " ".repeat(self.column() - 1);
        format!(
            "  {}\n  {pad}^\nhint: {}",
            self.query,
            self.kind.hint()
        )
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (column {})", self.kind, self.column())
    }
}

impl error::Error for QueryError {}
