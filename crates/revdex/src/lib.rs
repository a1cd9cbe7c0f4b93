//! revdex: a secondary index for code review changes.
//!
//! Keeps one index per schema version of the change document, decides which
//! version serves searches and which ones receive writes, and rebuilds newer
//! versions from repository exports while the older version keeps serving.

#![warn(missing_docs)]

pub mod cli;
