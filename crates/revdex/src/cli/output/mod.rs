//! Rendering and JSON serialization for CLI output.

use std::process::ExitCode;

use comfy_table::{Cell, Table, presets::UTF8_FULL_CONDENSED};
use revdex_change::Change;
use revdex_index::{BatchProgress, BatchResult, IndexError, ProgressReporter, VersionInfo};
use serde::Serialize;

/// ANSI escape sequences.
mod colors {
    /// Bold text.
    pub const BOLD: &str = "\x1b[1m";
    /// Dimmed text.
    pub const DIM: &str = "\x1b[2m";
    /// Yellow text.
    pub const YELLOW: &str = "\x1b[33m";
    /// Resets all attributes.
    pub const RESET: &str = "\x1b[0m";
}

/// Formats text as a subheader (bold).
pub fn subheader(text: &str) -> String {
    format!("{}{}{}", colors::BOLD, text, colors::RESET)
}

/// Formats text as dimmed/less important.
pub fn dim(text: &str) -> String {
    format!("{}{}{}", colors::DIM, text, colors::RESET)
}

/// Formats text as a warning (yellow).
pub fn warning(text: &str) -> String {
    format!("{}{}{}", colors::YELLOW, text, colors::RESET)
}

/// Prints per-repository batch progress to stderr.
///
/// Per-document failures are already logged by the batch indexer.
pub struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_document(&self, _progress: &BatchProgress) {}

    fn on_document_error(&self, _key: &str, _error: &IndexError) {}

    fn on_repository_done(&self, name: &str, progress: &BatchProgress) {
        let repositories = match progress.repositories.total() {
            Some(total) => format!("{}/{total}", progress.repositories.done()),
            None => progress.repositories.done().to_string(),
        };
        eprintln!(
            "{}",
            dim(&format!(
                "[{repositories}] {name}: {} indexed, {} failed so far",
                progress.documents.done(),
                progress.failed.done()
            ))
        );
    }

    fn on_complete(&self, _result: &BatchResult) {}
}

/// Formats the outcome of a rebuild.
pub fn describe_batch(version: u32, result: &BatchResult) -> String {
    format!(
        "version {version}: {} indexed, {} failed in {:.1}s",
        result.done,
        result.failed,
        result.elapsed.as_secs_f64()
    )
}

/// Returns a check mark for set flags.
fn flag(set: bool) -> &'static str {
    if set { "✓" } else { "" }
}

/// Renders the versions of one kind as a table.
pub fn versions_table(versions: &[VersionInfo]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        "Version", "Ready", "Exists", "Search", "Write", "Release",
    ]);
    for info in versions {
        table.add_row(vec![
            Cell::new(info.version),
            Cell::new(flag(info.ready)),
            Cell::new(flag(info.exists)),
            Cell::new(flag(info.search)),
            Cell::new(flag(info.write)),
            Cell::new(flag(info.release)),
        ]);
    }
    table
}

/// Returns the first line of a change message.
fn subject(change: &Change) -> &str {
    change.message.lines().next().unwrap_or_default()
}

/// Renders a page of changes as a table.
pub fn changes_table(changes: &[Change]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        "ID", "Status", "Project", "Branch", "Owner", "Updated", "Subject",
    ]);
    for change in changes {
        let branch = change
            .branch
            .strip_prefix("refs/heads/")
            .unwrap_or(&change.branch);
        table.add_row(vec![
            Cell::new(change.id),
            Cell::new(change.status),
            Cell::new(&change.project),
            Cell::new(branch),
            Cell::new(&change.owner),
            Cell::new(change.updated.format("%Y-%m-%d %H:%M")),
            Cell::new(subject(change)),
        ]);
    }
    table
}

/// JSON output for `revdex search`.
#[derive(Serialize)]
struct JsonSearchOutput<'a> {
    /// The query text.
    query: &'a str,
    /// Index of the first returned change among all matches.
    start: usize,
    /// True if more changes follow this page.
    more: bool,
    /// Matching changes, newest id first.
    changes: &'a [Change],
}

/// Prints a page of search results as JSON.
pub fn print_json_results(query: &str, start: usize, more: bool, changes: &[Change]) -> ExitCode {
    let output = JsonSearchOutput {
        query,
        start,
        more,
        changes,
    };
    match serde_json::to_string_pretty(&output) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: failed to serialize JSON: {e}");
            ExitCode::FAILURE
        }
    }
}
