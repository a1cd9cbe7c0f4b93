//! The change document kind for revdex.
//!
//! This crate binds the generic index machinery to code review changes:
//! - The [`Change`] document and its status
//! - Indexed fields and schema versions ([`change_schemas`])
//! - Binding of query text to change predicates ([`ChangeQueryBuilder`])
//! - JSON exports as repositories and document loader for batch
//!   rebuilds ([`ExportSite`])

#![warn(missing_docs)]

mod change;
mod error;
mod export;
pub mod fields;
mod query;
#[cfg(test)]
mod test_support;

pub use change::{Change, ChangeStatus};
pub use error::ChangeError;
pub use export::{DATA_DIR, ExportSite, ProjectExport};
pub use fields::{CHANGES, change_schemas};
pub use query::ChangeQueryBuilder;
