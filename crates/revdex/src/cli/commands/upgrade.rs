//! Implementation of `revdex upgrade`.

use std::process::ExitCode;

use revdex_index::{IndexError, VersionManager};

use crate::cli::{
    args::UpgradeCommand,
    context::{CommandContext, OpenMode, fail},
    output::{dim, warning},
};

/// Rebuilds the newest version of every index while the current one serves.
///
/// Waits for the rebuild; on success the new version serves searches and the
/// old one is marked not ready.
pub fn run(ctx: &CommandContext, cmd: &UpgradeCommand) -> ExitCode {
    let indexes = match ctx.open(OpenMode::Upgrade) {
        Ok(indexes) => indexes,
        Err(code) => return code,
    };

    let mut code = ExitCode::SUCCESS;
    for name in indexes.manager.names() {
        match upgrade(&indexes.manager, name, cmd.force) {
            Ok(true) => {}
            Ok(false) => code = ExitCode::FAILURE,
            Err(e) => {
                code = fail(&format!("failed to upgrade {name}"), &e);
            }
        }
    }
    indexes.manager.stop();
    code
}

/// Upgrades one kind; returns false if the rebuild failed.
fn upgrade(
    manager: &VersionManager,
    name: &str,
    force: bool,
) -> Result<bool, IndexError> {
    if !manager.start_reindexer(name, force)? {
        println!("{}", dim(&format!("{name} already searches its newest version")));
        return Ok(true);
    }
    match manager.wait_for_reindexer(name)? {
        Some(true) => {
            let search = manager
                .versions(name)?
                .into_iter()
                .find(|v| v.search)
                .map(|v| v.version);
            if let Some(version) = search {
                println!("{name} now searches version {version}");
            }
            Ok(true)
        }
        Some(false) => {
            println!(
                "{}",
                warning(&format!("{name} rebuild failed; the previous version keeps serving"))
            );
            Ok(false)
        }
        None => Ok(true),
    }
}
