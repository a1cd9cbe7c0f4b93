//! Command implementations and dispatch.

pub mod activate;
pub mod reindex;
pub mod search;
pub mod status;
pub mod upgrade;

use std::process::ExitCode;

use super::{args::Commands, context::CommandContext};

/// Dispatches to the selected subcommand.
pub fn run(command: &Commands, ctx: &CommandContext) -> ExitCode {
    match command {
        Commands::Status => status::run(ctx),
        Commands::Reindex(cmd) => reindex::run(ctx, cmd),
        Commands::Upgrade(cmd) => upgrade::run(ctx, cmd),
        Commands::Activate => activate::run(ctx),
        Commands::Search(cmd) => search::run(ctx, cmd),
    }
}
