//! Field registry entries.
//!
//! A [`FieldDef`] binds a field name to a [`FieldType`] and a typed extractor.
//! Definitions are built through per-type builders so the extractor's carrier
//! type is checked at compile time:
//!
//! ```
//! use revdex_index::FieldDef;
//!
//! #[derive(Clone)]
//! struct Doc {
//!     project: String,
//!     reviewers: Vec<String>,
//! }
//!
//! let project = FieldDef::exact("project")
//!     .stored()
//!     .build(|d: &Doc| Some(d.project.clone()));
//! let reviewer = FieldDef::exact("reviewer").build_repeatable(|d: &Doc| d.reviewers.clone());
//! assert!(project.is_stored());
//! assert!(reviewer.is_repeatable());
//! ```

use std::{collections::BTreeSet, fmt, marker::PhantomData, sync::Arc, time::SystemTime};

/// Semantic type of a field.
///
/// Determines which query operators apply and how a predicate on the field is
/// matched locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// 32-bit integer, matched by equality.
    Integer,
    /// 32-bit integer, matched by relational ranges.
    IntegerRange,
    /// 64-bit integer, matched by equality.
    Long,
    /// Point in time, matched by ranges.
    Timestamp,
    /// String, matched by equality.
    Exact,
    /// String, matched by prefix.
    Prefix,
    /// Tokenized text, matched by token intersection.
    FullText,
    /// Opaque stored payload, never matched.
    StoredOnly,
}

impl FieldType {
    /// Returns a lowercase name for display.
    pub fn name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::IntegerRange => "integer_range",
            Self::Long => "long",
            Self::Timestamp => "timestamp",
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::FullText => "full_text",
            Self::StoredOnly => "stored_only",
        }
    }

    /// Relative cost of matching a predicate on this type locally.
    pub fn cost(self) -> u32 {
        match self {
            Self::Integer | Self::Long | Self::Exact => 1,
            Self::IntegerRange | Self::Timestamp | Self::Prefix => 2,
            Self::FullText => 3,
            Self::StoredOnly => 5,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single extracted field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Carrier for `Integer` and `IntegerRange` fields.
    Integer(i32),
    /// Carrier for `Long` fields.
    Long(i64),
    /// Carrier for `Timestamp` fields.
    Timestamp(SystemTime),
    /// Carrier for string-typed fields.
    Text(String),
}

impl FieldValue {
    /// Returns the string value, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric value widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the timestamp, if this is a timestamp value.
    pub fn as_timestamp(&self) -> Option<SystemTime> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

/// Types that can be extracted into a field.
pub trait FieldCarrier: Sized + 'static {
    /// Wraps the value.
    fn into_value(self) -> FieldValue;
}

impl FieldCarrier for i32 {
    fn into_value(self) -> FieldValue {
        FieldValue::Integer(self)
    }
}

impl FieldCarrier for i64 {
    fn into_value(self) -> FieldValue {
        FieldValue::Long(self)
    }
}

impl FieldCarrier for SystemTime {
    fn into_value(self) -> FieldValue {
        FieldValue::Timestamp(self)
    }
}

impl FieldCarrier for String {
    fn into_value(self) -> FieldValue {
        FieldValue::Text(self)
    }
}

/// Extraction function from a document to field values.
type Extractor<D> = Arc<dyn Fn(&D) -> Vec<FieldValue> + Send + Sync>;

/// A named, typed field and its extractor.
pub struct FieldDef<D> {
    /// Field name, lowercase snake_case.
    name: String,
    /// Semantic type.
    field_type: FieldType,
    /// Whether backends keep the value for retrieval.
    stored: bool,
    /// Whether the extractor yields a sequence.
    repeatable: bool,
    /// Value extractor.
    extractor: Extractor<D>,
}

impl<D> Clone for FieldDef<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            field_type: self.field_type,
            stored: self.stored,
            repeatable: self.repeatable,
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl<D> fmt::Debug for FieldDef<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("stored", &self.stored)
            .field("repeatable", &self.repeatable)
            .finish_non_exhaustive()
    }
}

impl<D> FieldDef<D> {
    /// Starts an exact-match string field.
    pub fn exact(name: impl Into<String>) -> FieldBuilder<D, String>
    where
        D: 'static,
    {
        FieldBuilder::new(name, FieldType::Exact)
    }

    /// Starts a prefix-match string field.
    pub fn prefix(name: impl Into<String>) -> FieldBuilder<D, String>
    where
        D: 'static,
    {
        FieldBuilder::new(name, FieldType::Prefix)
    }

    /// Starts a tokenized text field.
    pub fn full_text(name: impl Into<String>) -> FieldBuilder<D, String>
    where
        D: 'static,
    {
        FieldBuilder::new(name, FieldType::FullText)
    }

    /// Starts a stored-only payload field.
    pub fn stored_only(name: impl Into<String>) -> FieldBuilder<D, String>
    where
        D: 'static,
    {
        FieldBuilder::new(name, FieldType::StoredOnly).stored()
    }

    /// Starts an integer equality field.
    pub fn integer(name: impl Into<String>) -> FieldBuilder<D, i32>
    where
        D: 'static,
    {
        FieldBuilder::new(name, FieldType::Integer)
    }

    /// Starts an integer range field.
    pub fn integer_range(name: impl Into<String>) -> FieldBuilder<D, i32>
    where
        D: 'static,
    {
        FieldBuilder::new(name, FieldType::IntegerRange)
    }

    /// Starts a 64-bit integer field.
    pub fn long(name: impl Into<String>) -> FieldBuilder<D, i64>
    where
        D: 'static,
    {
        FieldBuilder::new(name, FieldType::Long)
    }

    /// Starts a timestamp field.
    pub fn timestamp(name: impl Into<String>) -> FieldBuilder<D, SystemTime>
    where
        D: 'static,
    {
        FieldBuilder::new(name, FieldType::Timestamp)
    }


    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns true if backends store the value.
    pub fn is_stored(&self) -> bool {
        self.stored
    }

    /// Returns true if the field holds a sequence of values.
    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    /// Extracts the field's values from a document.
    ///
    /// Missing data yields an empty vector.
    pub fn values(&self, doc: &D) -> Vec<FieldValue> {
        (self.extractor)(doc)
    }
}

/// Builder for a [`FieldDef`] with carrier type `T`.
pub struct FieldBuilder<D, T> {
    /// Field name.
    name: String,
    /// Semantic type.
    field_type: FieldType,
    /// Whether the value is stored.
    stored: bool,
    /// Binds the document and carrier types.
    marker: PhantomData<fn(&D) -> T>,
}

impl<D: 'static, T: FieldCarrier> FieldBuilder<D, T> {
    /// Creates a builder.
    fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            stored: false,
            marker: PhantomData,
        }
    }

    /// Marks the field as stored.
    pub fn stored(mut self) -> Self {
        self.stored = true;
        self
    }

    /// Finishes a single-valued field.
    pub fn build<F>(self, extract: F) -> FieldDef<D>
    where
        F: Fn(&D) -> Option<T> + Send + Sync + 'static,
    {
        self.finish(
            false,
            Arc::new(move |doc: &D| extract(doc).map(T::into_value).into_iter().collect()),
        )
    }

    /// Finishes a repeatable field.
    pub fn build_repeatable<F>(self, extract: F) -> FieldDef<D>
    where
        F: Fn(&D) -> Vec<T> + Send + Sync + 'static,
    {
        self.finish(
            true,
            Arc::new(move |doc: &D| extract(doc).into_iter().map(T::into_value).collect()),
        )
    }

    /// Assembles the definition.
    fn finish(self, repeatable: bool, extractor: Extractor<D>) -> FieldDef<D> {
        FieldDef {
            name: self.name,
            field_type: self.field_type,
            stored: self.stored,
            repeatable,
            extractor,
        }
    }
}

/// Returns true if `c` separates full-text tokens.
fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '.' | '-' | '_' | '\\' | '/')
}

/// Splits text into lowercase tokens.
///
/// Runs of whitespace and `,.-_\/` separate tokens; empty tokens are dropped.
/// Index backends tokenize full-text fields the same way.
pub fn split_full_text(text: &str) -> BTreeSet<String> {
    text.split(is_separator)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
