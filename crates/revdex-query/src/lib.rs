//! Query language for revdex change search.
//!
//! - **Operators**: `status:open`, `project:tools/gerrit`
//! - **Bare terms**: `I8473b95934`, left to the caller to interpret
//! - **Phrases**: `message:"fix the build"`
//! - **Exact values**: `project:{tools plugins}`, kept verbatim
//! - **Negation**: `-is:reviewed` or `NOT is:reviewed`
//! - **Conjunction**: adjacent terms, or `AND`
//! - **Disjunction**: `owner:alice OR owner:bob`
//! - **Grouping**: `(a b) OR (c d)`, and `owner:(alice OR bob)`
//!
//! Keywords are upper case; `or` is an ordinary word. An operator value runs
//! to the next whitespace or parenthesis, so `before:2024-01-01T10:00:00`
//! and `added:>=10` are single values.
//!
//! # Example
//!
//! ```
//! use revdex_query::{QueryExpr, parse};
//!
//! let expr = parse("owner:(alice OR bob) -is:reviewed").unwrap().unwrap();
//! assert!(matches!(expr, QueryExpr::And(_)));
//! assert_eq!(expr.to_string(), "(owner:alice OR owner:bob) -is:reviewed");
//! ```

#![warn(missing_docs)]

mod ast;
mod error;
mod lexer;
mod parser;

pub use ast::QueryExpr;
pub use error::{QueryError, QueryErrorKind};
pub use lexer::{Token, TokenKind, tokenize};
pub use parser::parse;
