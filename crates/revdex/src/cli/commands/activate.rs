//! Implementation of `revdex activate`.

use std::process::ExitCode;

use crate::cli::{
    context::{CommandContext, OpenMode, fail},
    output::versions_table,
};

/// Promotes the newest write version of every index without rebuilding it.
pub fn run(ctx: &CommandContext) -> ExitCode {
    let indexes = match ctx.open(OpenMode::Upgrade) {
        Ok(indexes) => indexes,
        Err(code) => return code,
    };

    let mut code = ExitCode::SUCCESS;
    for name in indexes.manager.names() {
        if let Err(e) = indexes.manager.activate_latest_index(name) {
            code = fail(&format!("failed to activate {name}"), &e);
            continue;
        }
        match indexes.manager.versions(name) {
            Ok(versions) => println!("{}", versions_table(&versions)),
            Err(e) => code = fail("failed to read versions", &e),
        }
    }
    indexes.manager.stop();
    code
}
