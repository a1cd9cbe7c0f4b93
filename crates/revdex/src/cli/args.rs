//! Clap argument definitions for the `revdex` CLI.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

/// Results per page when `-n` is not given.
pub const DEFAULT_LIMIT: usize = 25;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "revdex")]
#[command(about = "Secondary index for code review changes")]
pub struct Cli {
    /// Site directory holding revdex.toml, data/ and the index
    #[arg(short = 's', long, global = true, default_value = ".")]
    pub site: PathBuf,

    /// Log more detail (-v for debug output)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments for `revdex reindex`.
#[derive(Args, Debug, Clone, Default)]
pub struct ReindexCommand {
    /// Schema version to rebuild [default: newest]
    #[arg(long)]
    pub version: Option<u32>,
}

/// Arguments for `revdex upgrade`.
#[derive(Args, Debug, Clone, Default)]
pub struct UpgradeCommand {
    /// Rebuild even if the newest version already serves searches
    #[arg(long)]
    pub force: bool,
}

/// Arguments for `revdex search`.
#[derive(Args, Debug, Clone)]
pub struct SearchCommand {
    /// Query terms, joined with spaces
    #[arg(required = true)]
    pub query: Vec<String>,

    /// Maximum changes to return
    #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,

    /// Number of matching changes to skip
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Print the executed query plan
    #[arg(long)]
    pub explain: bool,
}

impl SearchCommand {
    /// Returns the query text.
    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }
}

/// Supported `revdex` subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show schema versions and which ones serve searches and writes
    Status,

    /// Rebuild one index version offline and mark it ready
    Reindex(ReindexCommand),

    /// Rebuild the newest version while the current one keeps serving
    Upgrade(UpgradeCommand),

    /// Promote the newest write version without rebuilding it
    Activate,

    /// Search changes
    Search(SearchCommand),
}
