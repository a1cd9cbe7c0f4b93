//! The change document.

use std::{collections::BTreeSet, fmt, time::SystemTime};

use chrono::{DateTime, Utc};
use revdex_index::Document;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Open for review.
    New,
    /// Submitted to its branch.
    Merged,
    /// Closed without submitting.
    Abandoned,
}

impl ChangeStatus {
    /// Returns the indexed form of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Merged => "merged",
            Self::Abandoned => "abandoned",
        }
    }

    /// Returns true if the change is still open.
    pub fn is_open(self) -> bool {
        self == Self::New
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A code review change.
///
/// `files`, `added` and `deleted` describe the current revision. They are
/// filled in from the commit when the change is loaded for indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Legacy numeric id.
    pub id: i32,
    /// Change-Id key, `I` followed by hex digits.
    pub change_id: String,
    /// Project containing the change.
    pub project: String,
    /// Destination ref, e.g. `refs/heads/main`.
    pub branch: String,
    /// Optional topic.
    #[serde(default)]
    pub topic: Option<String>,
    /// Owner account name.
    pub owner: String,
    /// Reviewer account names.
    #[serde(default)]
    pub reviewers: Vec<String>,
    /// Hashtags in their original case.
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Lifecycle state.
    pub status: ChangeStatus,
    /// Commit message of the current revision.
    pub message: String,
    /// Review comment bodies.
    #[serde(default)]
    pub comments: Vec<String>,
    /// Unresolved comment threads.
    #[serde(default)]
    pub unresolved: i32,
    /// Last update.
    pub updated: DateTime<Utc>,
    /// Commit of each patch set, oldest first.
    pub revisions: Vec<String>,
    /// Whether the owner marked the change reviewed.
    #[serde(default)]
    pub reviewed: bool,
    /// Paths touched by the current revision.
    #[serde(default)]
    pub files: Vec<String>,
    /// Lines added by the current revision.
    #[serde(default)]
    pub added: i32,
    /// Lines deleted by the current revision.
    #[serde(default)]
    pub deleted: i32,
}

impl Change {
    /// Returns the commit of the newest patch set.
    pub fn current_revision(&self) -> Option<&str> {
        self.revisions.last().map(String::as_str)
    }

    /// Returns every path component of the touched files.
    pub fn file_parts(&self) -> BTreeSet<String> {
        self.files
            .iter()
            .flat_map(|path| path.split('/'))
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Returns lines added plus lines deleted.
    pub fn delta(&self) -> i32 {
        self.added.saturating_add(self.deleted)
    }

    /// Returns the last update as a system time.
    pub fn updated_time(&self) -> SystemTime {
        self.updated.into()
    }

    /// Returns the topic if it is set and non-empty.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref().filter(|t| !t.is_empty())
    }
}

impl Document for Change {
    type Key = i32;

    fn key(&self) -> i32 {
        self.id
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::change;

    #[test]
    fn file_parts_skip_empty_components() {
        let mut c = change(1, "tools");
        c.files = vec!["src/lib.rs".into(), "/docs//guide.md".into()];
        let parts: Vec<String> = c.file_parts().into_iter().collect();
        assert_eq!(parts, vec!["docs", "guide.md", "lib.rs", "src"]);
    }

    #[test]
    fn status_round_trips_lowercase() {
        let json = serde_json::to_string(&ChangeStatus::Abandoned).unwrap();
        assert_eq!(json, "\"abandoned\"");
        assert!(ChangeStatus::New.is_open());
        assert!(!ChangeStatus::Merged.is_open());
    }

    #[test]
    fn empty_topic_is_none() {
        let mut c = change(1, "tools");
        c.topic = Some(String::new());
        assert_eq!(c.topic(), None);
        c.topic = Some("release".into());
        assert_eq!(c.topic(), Some("release"));
    }
}
