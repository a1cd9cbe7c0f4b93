//! Implementation of `revdex reindex`.

use std::process::ExitCode;

use crate::cli::{
    args::ReindexCommand,
    context::{CommandContext, OpenMode, fail},
    output::{describe_batch, warning},
};

/// Rebuilds one version of every index from the site's exports.
///
/// A version is marked ready only if no repository failed as a whole.
pub fn run(ctx: &CommandContext, cmd: &ReindexCommand) -> ExitCode {
    let indexes = match ctx.open(OpenMode::Offline) {
        Ok(indexes) => indexes,
        Err(code) => return code,
    };

    let mut code = ExitCode::SUCCESS;
    for name in indexes.manager.names() {
        let (version, result) = match indexes.manager.reindex_offline(name, cmd.version) {
            Ok(outcome) => outcome,
            Err(e) => return fail(&format!("failed to reindex {name}"), &e),
        };
        println!("{name} {}", describe_batch(version, &result));
        if !result.success {
            println!(
                "{}",
                warning(&format!("{name} version {version} was not marked ready"))
            );
            code = ExitCode::FAILURE;
        }
    }
    code
}
