//! Command-line interface for the `revdex` change index.

use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use revdex::cli::{CommandContext, args::Cli, commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = match CommandContext::load(&cli.site) {
        Ok(ctx) => ctx,
        Err(code) => return code,
    };
    commands::run(&cli.command, &ctx)
}

/// Sends `log` output to stderr; `RUST_LOG` overrides the default filter.
fn init_logging(verbose: u8) {
    let level = if verbose > 0 { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}
