//! Binding of parsed queries to change predicates.
//!
//! [`ChangeQueryBuilder`] turns a [`QueryExpr`] into a predicate tree over the
//! fields of one change schema. Operators map to schema fields; a few
//! (`is:reviewed`, `has:topic`, `file:^regex`) have no field and are
//! evaluated on loaded changes instead.
//!
//! An operator whose field is missing from the schema is rejected, naming
//! the field, so queries fail rather than silently match nothing while a
//! newer schema version is still being built.

use std::{sync::Arc, time::SystemTime};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use revdex_index::{
    FieldDef, IndexPredicate, LocalPredicate, Predicate, QueryParseError, SchemaRef,
    split_full_text,
};
use revdex_query::{QueryExpr, parse};

use crate::{ChangeError, change::Change, fields};

/// Prefix added to bare branch names.
const BRANCH_PREFIX: &str = "refs/heads/";

/// Minimum length of a bare term treated as a commit prefix.
const MIN_COMMIT_PREFIX: usize = 4;

/// Builds change predicates against one schema version.
pub struct ChangeQueryBuilder {
    /// Schema the predicates are bound to.
    schema: SchemaRef<Change>,
}

impl ChangeQueryBuilder {
    /// Creates a builder for `schema`, usually the current search schema.
    pub fn new(schema: SchemaRef<Change>) -> Self {
        Self { schema }
    }

    /// Parses query text and builds its predicate.
    pub fn parse(&self, query: &str) -> Result<Predicate<Change>, ChangeError> {
        let expr = parse(query)?.ok_or(ChangeError::EmptyQuery)?;
        Ok(self.build(&expr)?)
    }

    /// Builds the predicate of a parsed expression.
    pub fn build(&self, expr: &QueryExpr) -> Result<Predicate<Change>, QueryParseError> {
        match expr {
            QueryExpr::Term(value) => self.default_field(value),
            QueryExpr::Phrase(words) => self.all_words(fields::MESSAGE, &words.join(" ")),
            QueryExpr::Not(inner) => Ok(Predicate::not(self.build(inner)?)),
            QueryExpr::And(children) => Ok(Predicate::and(self.build_all(children)?)),
            QueryExpr::Or(children) => Ok(Predicate::or(self.build_all(children)?)),
            QueryExpr::Field { name, expr } => self.scoped(name, expr),
        }
    }

    /// Builds every child expression.
    fn build_all(&self, exprs: &[QueryExpr]) -> Result<Vec<Predicate<Change>>, QueryParseError> {
        exprs.iter().map(|e| self.build(e)).collect()
    }

    /// Applies an operator to every value of its expression.
    fn scoped(&self, name: &str, expr: &QueryExpr) -> Result<Predicate<Change>, QueryParseError> {
        match expr {
            QueryExpr::Term(value) => self.operator(name, value),
            QueryExpr::Phrase(words) => self.operator(name, &words.join(" ")),
            QueryExpr::Not(inner) => Ok(Predicate::not(self.scoped(name, inner)?)),
            QueryExpr::And(children) => Ok(Predicate::and(
                children
                    .iter()
                    .map(|c| self.scoped(name, c))
                    .collect::<Result<_, _>>()?,
            )),
            QueryExpr::Or(children) => Ok(Predicate::or(
                children
                    .iter()
                    .map(|c| self.scoped(name, c))
                    .collect::<Result<_, _>>()?,
            )),
            QueryExpr::Field { .. } => Err(QueryParseError::InvalidValue {
                field: name.to_string(),
                value: expr.to_string(),
                reason: "operators cannot be nested".to_string(),
            }),
        }
    }

    /// Builds the predicate of one `operator:value` pair.
    fn operator(&self, name: &str, value: &str) -> Result<Predicate<Change>, QueryParseError> {
        match name {
            "status" => self.status(value),
            "is" => self.is(value),
            "has" => match value {
                "topic" => Ok(Predicate::local(HasTopic)),
                _ => Err(invalid(name, value, "expected topic")),
            },
            "project" => self.exact(fields::PROJECT, value),
            "projects" => self.exact(fields::PROJECTS, value),
            "branch" if !value.starts_with("refs/") => {
                self.exact(fields::REF, &format!("{BRANCH_PREFIX}{value}"))
            }
            "branch" | "ref" => self.exact(fields::REF, value),
            "topic" => self.exact(fields::TOPIC, value),
            "owner" => self.exact(fields::OWNER, value),
            "reviewer" => self.exact(fields::REVIEWER, value),
            "hashtag" => self.exact(fields::HASHTAG, &value.to_lowercase()),
            "file" if value.starts_with('^') => Ok(Predicate::local(FileRegex::new(value)?)),
            "file" => self.exact(fields::FILE, value),
            "filepart" => self.exact(fields::FILE_PART, value),
            "commit" => self.exact(fields::COMMIT, &value.to_lowercase()),
            "change" => self.change(value),
            "message" => self.all_words(fields::MESSAGE, value),
            "comment" => self.all_words(fields::COMMENT, value),
            "added" | "deleted" | "delta" | "unresolved" => {
                let def = self.def(name)?;
                Ok(Predicate::Field(IndexPredicate::with_operator(def, name, value)?))
            }
            "before" => self.timestamp(name, value, None, Some(parse_time(name, value)?)),
            "after" => self.timestamp(name, value, Some(parse_time(name, value)?), None),
            _ => Err(QueryParseError::UnknownOperator {
                operator: name.to_string(),
            }),
        }
    }

    /// Looks up a field of the schema.
    fn def(&self, name: &str) -> Result<&Arc<FieldDef<Change>>, QueryParseError> {
        self.schema
            .field(name)
            .ok_or_else(|| QueryParseError::UnknownField {
                field: name.to_string(),
            })
    }

    /// An exact or prefix match on a field.
    fn exact(&self, field: &str, value: &str) -> Result<Predicate<Change>, QueryParseError> {
        Predicate::field(self.def(field)?, value)
    }

    /// Requires every word of `value` in a full-text field.
    fn all_words(&self, field: &str, value: &str) -> Result<Predicate<Change>, QueryParseError> {
        let def = self.def(field)?;
        let words = split_full_text(value);
        if words.is_empty() {
            return Err(invalid(field, value, "no searchable words"));
        }
        let predicates = words
            .iter()
            .map(|w| Predicate::field(def, w))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Predicate::and(predicates))
    }

    /// Status names, including the `open` and `closed` groups.
    fn status(&self, value: &str) -> Result<Predicate<Change>, QueryParseError> {
        match value.to_lowercase().as_str() {
            "open" | "pending" | "new" => self.exact(fields::STATUS, "new"),
            "closed" => Ok(Predicate::or(vec![
                self.exact(fields::STATUS, "merged")?,
                self.exact(fields::STATUS, "abandoned")?,
            ])),
            status @ ("merged" | "abandoned") => self.exact(fields::STATUS, status),
            _ => Err(invalid("status", value, "unknown status")),
        }
    }

    /// `is:` accepts statuses and `reviewed`.
    fn is(&self, value: &str) -> Result<Predicate<Change>, QueryParseError> {
        match value {
            "reviewed" => Ok(Predicate::local(IsReviewed)),
            _ => self.status(value),
        }
    }

    /// A legacy id or a Change-Id prefix.
    fn change(&self, value: &str) -> Result<Predicate<Change>, QueryParseError> {
        if is_number(value) {
            self.exact(fields::LEGACY_ID, value)
        } else if let Some(hex) = change_id_prefix(value) {
            self.exact(fields::CHANGE_ID, &format!("I{hex}"))
        } else {
            Err(invalid("change", value, "expected a number or Change-Id"))
        }
    }

    /// A range on the last update time.
    fn timestamp(
        &self,
        name: &str,
        value: &str,
        min: Option<SystemTime>,
        max: Option<SystemTime>,
    ) -> Result<Predicate<Change>, QueryParseError> {
        let def = self.def(fields::UPDATED)?;
        IndexPredicate::timestamp_range(def, name, value, min, max).map(Predicate::Field)
    }

    /// Interprets a bare term.
    ///
    /// Numbers are legacy ids, `I` followed by hex is a Change-Id, other hex
    /// strings are commit prefixes. Anything else is matched against the
    /// message, comments, files and project.
    fn default_field(&self, value: &str) -> Result<Predicate<Change>, QueryParseError> {
        if is_number(value) {
            return self.exact(fields::LEGACY_ID, value);
        }
        if let Some(hex) = change_id_prefix(value) {
            return self.exact(fields::CHANGE_ID, &format!("I{hex}"));
        }
        if value.len() >= MIN_COMMIT_PREFIX && is_hex(value) {
            return self.exact(fields::COMMIT, &value.to_lowercase());
        }

        let mut any = Vec::new();
        if !split_full_text(value).is_empty() {
            any.push(self.all_words(fields::MESSAGE, value)?);
            any.push(self.all_words(fields::COMMENT, value)?);
        }
        any.push(self.exact(fields::FILE, value)?);
        any.push(self.exact(fields::PROJECT, value)?);
        Ok(Predicate::or(any))
    }
}

/// Builds an invalid-value error.
fn invalid(field: &str, value: &str, reason: &str) -> QueryParseError {
    QueryParseError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// True for a non-empty run of ASCII digits.
fn is_number(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

/// True for a non-empty run of hex digits.
fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Returns the lowercased hex part of a Change-Id prefix like `I8473b95`.
fn change_id_prefix(value: &str) -> Option<String> {
    let hex = value.strip_prefix(['I', 'i'])?;
    is_hex(hex).then(|| hex.to_lowercase())
}

/// Parses a UTC date or date and time.
fn parse_time(name: &str, value: &str) -> Result<SystemTime, QueryParseError> {
    let trimmed = value.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(time) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(time.and_utc().into());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc().into())
        .map_err(|e| invalid(name, value, &e.to_string()))
}

/// Changes the owner marked reviewed.
struct IsReviewed;

impl LocalPredicate<Change> for IsReviewed {
    fn matches(&self, doc: &Change) -> bool {
        doc.reviewed
    }

    fn describe(&self) -> String {
        "is:reviewed".to_string()
    }
}

/// Changes with a non-empty topic.
struct HasTopic;

impl LocalPredicate<Change> for HasTopic {
    fn matches(&self, doc: &Change) -> bool {
        doc.topic().is_some()
    }

    fn describe(&self) -> String {
        "has:topic".to_string()
    }
}

/// Changes touching a file that matches a regular expression.
struct FileRegex {
    /// Pattern, anchored at the start of the path.
    regex: Regex,
}

impl FileRegex {
    /// Compiles a `^`-anchored pattern.
    fn new(pattern: &str) -> Result<Self, QueryParseError> {
        let regex = Regex::new(pattern).map_err(|e| invalid("file", pattern, &e.to_string()))?;
        Ok(Self { regex })
    }
}

impl LocalPredicate<Change> for FileRegex {
    fn matches(&self, doc: &Change) -> bool {
        doc.files.iter().any(|f| self.regex.is_match(f))
    }

    fn cost(&self) -> u32 {
        5
    }

    fn describe(&self) -> String {
        format!("file:{}", self.regex.as_str())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        fields::change_schemas,
        test_support::{change, sample_changes},
    };

    fn builder(version: u32) -> ChangeQueryBuilder {
        ChangeQueryBuilder::new(change_schemas().unwrap().get(version).unwrap())
    }

    fn matching(query: &str) -> Vec<i32> {
        let predicate = builder(3).parse(query).unwrap();
        sample_changes()
            .iter()
            .filter(|c| predicate.matches(c))
            .map(|c| c.id)
            .collect()
    }

    #[test]
    fn operators_bind_to_fields() {
        assert_eq!(builder(3).parse("owner:alice").unwrap().to_string(), "owner:alice");
        assert_eq!(
            builder(3).parse("branch:main").unwrap().to_string(),
            "ref:refs/heads/main"
        );
        assert_eq!(
            builder(3).parse("status:closed").unwrap().to_string(),
            "(status:merged OR status:abandoned)"
        );
        assert_eq!(builder(3).parse("12").unwrap().to_string(), "legacy_id:12");
        assert_eq!(builder(3).parse("Iabcd12").unwrap().to_string(), "change:Iabcd12");
        assert_eq!(builder(3).parse("DEADBEEF").unwrap().to_string(), "commit:deadbeef");
    }

    #[test]
    fn queries_match_changes() {
        assert_eq!(matching("status:open project:tools"), vec![1, 6]);
        assert_eq!(matching("owner:alice -status:merged"), vec![1, 4]);
        assert_eq!(matching("hashtag:BUG"), vec![3, 6]);
        assert_eq!(matching("file:^docs/"), vec![5]);
        assert_eq!(matching("filepart:parser.rs"), vec![1]);
        assert_eq!(matching("added:>100"), vec![4]);
        assert_eq!(matching("is:reviewed"), vec![2, 7]);
        assert_eq!(matching("has:topic"), vec![6]);
        assert_eq!(matching("crash"), vec![1]);
        assert_eq!(matching("message:\"fix build\""), vec![6]);
        assert_eq!(matching("owner:(alice OR dave) status:open"), vec![1, 6]);
        assert_eq!(matching("after:2024-03-04"), vec![4, 5, 6, 7]);
        assert_eq!(matching("before:\"2024-03-02 12:00:00\""), vec![1, 2]);
    }

    #[test]
    fn fields_missing_from_schema_are_named() {
        let err = builder(1).parse("filepart:src").unwrap_err();
        assert!(
            matches!(&err, ChangeError::Query(QueryParseError::UnknownField { field }) if field == "filepart"),
            "{err}"
        );
        assert!(builder(2).parse("unresolved:>0").is_err());
        assert!(builder(3).parse("unresolved:>0").is_ok());
    }

    #[test]
    fn invalid_values_are_rejected() {
        for query in [
            "status:sleeping",
            "added:lots",
            "after:yesterday",
            "has:owner",
            "file:{^(}",
            "change:xyz",
            "nosuch:value",
        ] {
            assert!(
                matches!(builder(3).parse(query), Err(ChangeError::Query(_))),
                "{query}"
            );
        }
        assert!(matches!(builder(3).parse("   "), Err(ChangeError::EmptyQuery)));
    }

    #[test]
    fn local_predicates_describe_themselves() {
        let mut c = change(1, "tools");
        c.reviewed = true;
        let p = builder(3).parse("is:reviewed").unwrap();
        assert!(p.matches(&c));
        assert_eq!(p.to_string(), "is:reviewed");
    }
}
