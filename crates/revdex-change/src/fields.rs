//! Indexed fields and schema versions of changes.
//!
//! Version 1 is the original field set. Version 2 adds `filepart`. Version 3
//! adds `unresolved` and the case-preserving hashtag copy; it has not shipped
//! in a release yet.

use revdex_index::{FieldDef, Schema, SchemaDefinitions, SchemaError};

use crate::change::Change;

/// Name of the change document kind.
pub const CHANGES: &str = "changes";

/// Legacy numeric id.
pub const LEGACY_ID: &str = "legacy_id";
/// Change-Id key, prefix-matched.
pub const CHANGE_ID: &str = "change";
/// Canonical status.
pub const STATUS: &str = "status";
/// Project name.
pub const PROJECT: &str = "project";
/// Project name, prefix-matched.
pub const PROJECTS: &str = "projects";
/// Destination ref.
pub const REF: &str = "ref";
/// Topic.
pub const TOPIC: &str = "topic";
/// Last update time.
pub const UPDATED: &str = "updated";
/// Touched file paths.
pub const FILE: &str = "file";
/// Components of touched file paths.
pub const FILE_PART: &str = "filepart";
/// Lowercased hashtags.
pub const HASHTAG: &str = "hashtag";
/// Hashtags in original case.
pub const HASHTAG_CASE_AWARE: &str = "_hashtag";
/// Owner.
pub const OWNER: &str = "owner";
/// Reviewers.
pub const REVIEWER: &str = "reviewer";
/// Patch set commits, prefix-matched.
pub const COMMIT: &str = "commit";
/// Commit message.
pub const MESSAGE: &str = "message";
/// Review comments.
pub const COMMENT: &str = "comment";
/// Lines added.
pub const ADDED: &str = "added";
/// Lines deleted.
pub const DELETED: &str = "deleted";
/// Lines added plus deleted.
pub const DELTA: &str = "delta";
/// Unresolved comment threads.
pub const UNRESOLVED: &str = "unresolved";

/// Fields present since version 1.
fn base_fields() -> Vec<FieldDef<Change>> {
    vec![
        FieldDef::integer(LEGACY_ID).stored().build(|c: &Change| Some(c.id)),
        FieldDef::prefix(CHANGE_ID).build(|c: &Change| Some(c.change_id.clone())),
        FieldDef::exact(STATUS).build(|c: &Change| Some(c.status.as_str().to_string())),
        FieldDef::exact(PROJECT)
            .stored()
            .build(|c: &Change| Some(c.project.clone())),
        FieldDef::prefix(PROJECTS).build(|c: &Change| Some(c.project.clone())),
        FieldDef::exact(REF).build(|c: &Change| Some(c.branch.clone())),
        FieldDef::exact(TOPIC).build(|c: &Change| c.topic().map(str::to_string)),
        FieldDef::timestamp(UPDATED)
            .stored()
            .build(|c: &Change| Some(c.updated_time())),
        FieldDef::exact(FILE).build_repeatable(|c: &Change| c.files.clone()),
        FieldDef::exact(HASHTAG).build_repeatable(|c: &Change| {
            let mut tags: Vec<String> = c.hashtags.iter().map(|t| t.to_lowercase()).collect();
            tags.sort();
            tags.dedup();
            tags
        }),
        FieldDef::exact(OWNER).build(|c: &Change| Some(c.owner.clone())),
        FieldDef::exact(REVIEWER)
            .stored()
            .build_repeatable(|c: &Change| c.reviewers.clone()),
        FieldDef::prefix(COMMIT).build_repeatable(|c: &Change| c.revisions.clone()),
        FieldDef::full_text(MESSAGE).build(|c: &Change| Some(c.message.clone())),
        FieldDef::full_text(COMMENT).build_repeatable(|c: &Change| c.comments.clone()),
        FieldDef::integer_range(ADDED).build(|c: &Change| Some(c.added)),
        FieldDef::integer_range(DELETED).build(|c: &Change| Some(c.deleted)),
        FieldDef::integer_range(DELTA).build(|c: &Change| Some(c.delta())),
    ]
}

/// Builds one schema version.
fn schema(version: u32) -> Result<Schema<Change>, SchemaError> {
    let mut fields = base_fields();
    if version >= 2 {
        fields.push(
            FieldDef::exact(FILE_PART)
                .build_repeatable(|c: &Change| c.file_parts().into_iter().collect()),
        );
    }
    if version >= 3 {
        fields.push(FieldDef::integer_range(UNRESOLVED).build(|c: &Change| Some(c.unresolved)));
        fields.push(
            FieldDef::stored_only(HASHTAG_CASE_AWARE)
                .build_repeatable(|c: &Change| c.hashtags.clone()),
        );
    }
    Ok(Schema::new(version, fields)?.with_release(version < 3))
}

/// Returns every schema version of changes, oldest first.
pub fn change_schemas() -> Result<SchemaDefinitions<Change>, SchemaError> {
    SchemaDefinitions::new(CHANGES, vec![schema(1)?, schema(2)?, schema(3)?])
}
