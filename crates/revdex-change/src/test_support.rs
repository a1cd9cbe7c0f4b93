//! Shared fixtures for unit tests.

use std::{fs, path::Path};

use chrono::{TimeZone, Utc};

use crate::{
    change::{Change, ChangeStatus},
    export::DATA_DIR,
};

/// An open change with no files, updated at 2024-03-01.
pub fn change(id: i32, project: &str) -> Change {
    Change {
        id,
        change_id: format!("I{id:04x}"),
        project: project.to_string(),
        branch: "refs/heads/main".to_string(),
        topic: None,
        owner: "alice".to_string(),
        reviewers: Vec::new(),
        hashtags: Vec::new(),
        status: ChangeStatus::New,
        message: String::new(),
        comments: Vec::new(),
        unresolved: 0,
        updated: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        revisions: vec![format!("c{id}")],
        reviewed: false,
        files: Vec::new(),
        added: 0,
        deleted: 0,
    }
}

/// Builds a change; `day` is the day of March 2024 it was last updated.
#[allow(clippy::too_many_arguments)]
fn sample(
    id: i32,
    project: &str,
    owner: &str,
    status: ChangeStatus,
    message: &str,
    file: &str,
    added: i32,
    day: u32,
) -> Change {
    Change {
        owner: owner.to_string(),
        status,
        message: message.to_string(),
        files: vec![file.to_string()],
        added,
        updated: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
        ..change(id, project)
    }
}

/// Seven changes across three projects.
pub fn sample_changes() -> Vec<Change> {
    use ChangeStatus::{Abandoned, Merged, New};

    let mut changes = vec![
        sample(1, "tools", "alice", New, "Fix crash in parser", "src/parser.rs", 10, 1),
        sample(2, "tools", "bob", Merged, "Add feature flag", "src/flags.rs", 20, 2),
        sample(3, "core", "carol", New, "fix typo", "README.md", 1, 3),
        sample(4, "core", "alice", Abandoned, "Refactor lexer", "src/lexer.rs", 150, 4),
        sample(5, "core", "bob", Merged, "docs: update guide", "docs/guide.md", 5, 5),
        sample(6, "tools", "dave", New, "fix build on windows", "build.rs", 3, 6),
        sample(7, "web", "alice", Merged, "New landing page", "index.html", 40, 7),
    ];
    changes[1].reviewed = true;
    changes[6].reviewed = true;
    changes[2].hashtags = vec!["Bug".to_string()];
    changes[5].hashtags = vec!["bug".to_string(), "ci".to_string()];
    changes[5].topic = Some("windows".to_string());
    changes
}

/// Writes `<site>/data/<project>.json`.
pub fn write_export(site: &Path, project: &str, json: &str) {
    let dir = site.join(DATA_DIR);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{project}.json")), json).unwrap();
}
