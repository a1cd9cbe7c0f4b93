//! Implementation of `revdex status`.

use std::process::ExitCode;

use revdex_config::{BackendKind, ConfigWarning};
use revdex_index::IndexError;

use crate::cli::{
    context::{CommandContext, OpenMode, fail},
    output::{dim, subheader, versions_table, warning},
};

/// Shows the site, its configuration warnings, and every index version.
pub fn run(ctx: &CommandContext) -> ExitCode {
    let config = &ctx.config;
    println!("{}", subheader("Site:"));
    println!("   {}", ctx.site.display());
    println!(
        "   {}",
        dim(&format!(
            "index {} ({})",
            config.index_dir().display(),
            config.index.backend
        ))
    );
    println!();

    let indexes = match ctx.open(OpenMode::Offline) {
        Ok(indexes) => indexes,
        Err(code) => return code,
    };
    if indexes.backend == BackendKind::Memory {
        println!("{}", dim("The memory backend keeps no index data between runs."));
        println!();
    }
    let started = match indexes.manager.start() {
        Ok(()) => true,
        Err(IndexError::NoReadyVersion { name }) => {
            println!("{}", warning(&format!("No ready version of {name}.")));
            println!("Run {} to build one.", subheader("revdex reindex"));
            println!();
            false
        }
        Err(e) => return fail("failed to start indexes", &e),
    };

    for name in indexes.manager.names() {
        let versions = match indexes.manager.versions(name) {
            Ok(versions) => versions,
            Err(e) => return fail("failed to read versions", &e),
        };
        println!("{}", subheader(&format!("Index {name}:")));
        println!("{}", versions_table(&versions));
        println!();
    }
    if started {
        indexes.manager.stop();
    }

    let warnings = config.validate();
    if warnings.is_empty() {
        return ExitCode::SUCCESS;
    }
    println!("{}", subheader(&format!("Warnings ({}):", warnings.len())));
    for w in &warnings {
        println!("   {}", warning(&w.to_string()));
    }
    println!();
    print_hints(&warnings);
    ExitCode::FAILURE
}

/// Prints hints for resolving common warnings.
fn print_hints(warnings: &[ConfigWarning]) {
    for w in warnings {
        match w {
            ConfigWarning::UnknownBackend { .. } => {
                println!("{}", dim("Hint: [index] backend is \"tantivy\" or \"memory\""));
            }
            ConfigWarning::ExcessiveThreads { .. } => {
                println!("{}", dim("Hint: set [batch] threads = 0 to use one per CPU"));
            }
            _ => {}
        }
    }
}
