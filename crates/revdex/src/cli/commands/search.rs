//! Implementation of `revdex search`.

use std::{process::ExitCode, sync::Arc};

use revdex_change::{Change, ChangeError, ChangeQueryBuilder};
use revdex_index::{IndexCollection, QueryProcessor};

use crate::cli::{
    args::SearchCommand,
    context::{CommandContext, OpenMode, fail},
    output::{changes_table, dim, print_json_results, subheader},
};

/// Searches the change index and prints one page of results.
pub fn run(ctx: &CommandContext, cmd: &SearchCommand) -> ExitCode {
    let indexes = match ctx.open(OpenMode::Serve) {
        Ok(indexes) => indexes,
        Err(code) => return code,
    };
    let code = search(ctx, cmd, &indexes.changes);
    indexes.manager.stop();
    code
}

/// Runs the query against the search index of the change collection.
fn search(
    ctx: &CommandContext,
    cmd: &SearchCommand,
    changes: &Arc<IndexCollection<Change>>,
) -> ExitCode {
    let Some(index) = changes.search_index() else {
        eprintln!("error: no search index is open");
        return ExitCode::FAILURE;
    };
    let query = cmd.query_text();
    let predicate = match ChangeQueryBuilder::new(index.schema()).parse(&query) {
        Ok(predicate) => predicate,
        Err(ChangeError::Syntax(e)) => {
            eprintln!("error: invalid query: {e}");
            eprintln!("{}", e.context());
            return ExitCode::FAILURE;
        }
        Err(e) => return fail("invalid query", &e),
    };

    let processor = QueryProcessor::new(Arc::clone(changes), ctx.query_options());
    let result = match processor.query(&predicate, cmd.start, cmd.limit) {
        Ok(result) => result,
        Err(e) => return fail("search failed", &e),
    };

    if cmd.json {
        return print_json_results(&query, cmd.start, result.more, &result.documents);
    }
    if cmd.explain {
        println!("{}", subheader("Plan:"));
        println!("   {}", result.plan);
        println!();
    }

    if result.documents.is_empty() {
        println!("{}", dim("No matching changes."));
        return ExitCode::SUCCESS;
    }
    println!("{}", changes_table(&result.documents));
    if result.more {
        let next = cmd.start + result.documents.len();
        println!(
            "{}",
            dim(&format!("More changes match; use --start {next} for the next page."))
        );
    }
    ExitCode::SUCCESS
}
