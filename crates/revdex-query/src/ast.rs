//! Parsed query expressions, before they are bound to a document kind.

use std::fmt;

use crate::lexer::{is_boundary, keyword};

/// A parsed query expression.
///
/// `Display` writes the expression back as query text that parses to the
/// same tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryExpr {
    /// A value with no operator, or an exact `{...}` value.
    Term(String),

    /// The words of a `"..."` phrase.
    Phrase(Vec<String>),

    /// Matches what the inner expression does not.
    Not(Box<Self>),

    /// Every child must match.
    And(Vec<Self>),

    /// At least one child must match.
    Or(Vec<Self>),

    /// A value scoped to an operator, such as `status:open`.
    Field {
        /// Lowercased operator name.
        name: String,
        /// The operator's value.
        expr: Box<Self>,
    },
}

impl QueryExpr {
    /// Joins `exprs` with AND. Nested ANDs are merged and a single child is
    /// returned as is.
    pub fn and(exprs: Vec<Self>) -> Self {
        let split = |expr: Self| match expr {
            Self::And(children) => Ok(children),
            other => Err(other),
        };
        Self::join(exprs, split, Self::And)
    }

    /// Joins `exprs` with OR, merging nested ORs.
    pub fn or(exprs: Vec<Self>) -> Self {
        let split = |expr: Self| match expr {
            Self::Or(children) => Ok(children),
            other => Err(other),
        };
        Self::join(exprs, split, Self::Or)
    }

    /// Shared body of [`Self::and`] and [`Self::or`].
    fn join(
        exprs: Vec<Self>,
        split: impl Fn(Self) -> Result<Vec<Self>, Self>,
        build: impl FnOnce(Vec<Self>) -> Self,
    ) -> Self {
        let mut flat = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match split(expr) {
                Ok(children) => flat.extend(children),
                Err(leaf) => flat.push(leaf),
            }
        }
        match <[Self; 1]>::try_from(flat) {
            Ok([only]) => only,
            Err(flat) => build(flat),
        }
    }

    /// Creates `name:value`.
    pub fn field(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            expr: Box::new(Self::Term(value.into())),
        }
    }

    /// Applies operator `name` to every unscoped value in `self`.
    ///
    /// This is how `owner:(alice OR bob)` becomes
    /// `owner:alice OR owner:bob`. Values that already carry an operator are
    /// left alone.
    pub fn scoped(self, name: &str) -> Self {
        match self {
            value @ (Self::Term(_) | Self::Phrase(_)) => Self::Field {
                name: name.to_owned(),
                expr: Box::new(value),
            },
            Self::Not(inner) => Self::Not(Box::new(inner.scoped(name))),
            Self::And(children) => {
                Self::and(children.into_iter().map(|c| c.scoped(name)).collect())
            }
            Self::Or(children) => Self::or(children.into_iter().map(|c| c.scoped(name)).collect()),
            field @ Self::Field { .. } => field,
        }
    }

    /// Writes `self`, wrapping multi-child connectives in parentheses when
    /// `nested`.
    fn write(&self, f: &mut fmt::Formatter<'_>, nested: bool) -> fmt::Result {
        match self {
            Self::Term(value) => write_value(f, value, false),
            Self::Phrase(words) => write!(f, "\"{}\"", words.join(" ")),
            Self::Not(inner) => {
                f.write_str("-")?;
                inner.write(f, true)
            }
            Self::And(children) => write_joined(f, children, " ", nested),
            Self::Or(children) => write_joined(f, children, " OR ", nested),
            Self::Field { name, expr } => {
                write!(f, "{name}:")?;
                match expr.as_ref() {
                    Self::Term(value) => write_value(f, value, true),
                    other => other.write(f, true),
                }
            }
        }
    }
}

/// Writes children separated by `sep`.
fn write_joined(
    f: &mut fmt::Formatter<'_>,
    children: &[QueryExpr],
    sep: &str,
    nested: bool,
) -> fmt::Result {
    let group = nested && children.len() > 1;
    if group {
        f.write_str("(")?;
    }
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        child.write(f, true)?;
    }
    if group {
        f.write_str(")")?;
    }
    Ok(())
}

/// Writes a value bare when it reads back unchanged, otherwise in braces.
fn write_value(f: &mut fmt::Formatter<'_>, value: &str, after_operator: bool) -> fmt::Result {
    let bare = !value.is_empty()
        && !value.contains(is_boundary)
        && (after_operator
            || !(value.starts_with('-') || value.contains(':') || keyword(value).is_some()));
    if bare {
        f.write_str(value)
    } else {
        write!(f, "{{{value}}}")
    }
}

impl fmt::Display for QueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, false)
    }
}
