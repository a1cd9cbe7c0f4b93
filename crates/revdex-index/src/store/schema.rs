//! Mapping from a document schema to a Tantivy schema.
//!
//! Every schema field becomes one Tantivy field of the same name:
//! - Integer, integer range and long fields are indexed `i64` fields
//! - Timestamps are indexed `i64` nanoseconds since the epoch
//! - Exact and prefix fields are untokenized strings
//! - Full-text fields use the revdex tokenizer
//! - Stored-only fields are stored and not indexed
//!
//! Reserved fields hold the document key, used for replacement and deletion,
//! the key as an `i64` fast field that orders results, and the whole document
//! serialized as JSON.

use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

use tantivy::{
    TantivyDocument,
    schema::{
        Field, IndexRecordOption, NumericOptions, STORED, STRING, Schema as TantivySchema,
        TextFieldIndexing, TextOptions,
    },
};

use super::analyzer::REVDEX_TOKENIZER;
use crate::{
    IndexError,
    field::{FieldType, FieldValue},
    schema::Schema,
};

/// Reserved field holding the document key.
pub const KEY_FIELD: &str = "_revdex_key";

/// Reserved fast field ordering results by key.
pub const ORDER_FIELD: &str = "_revdex_order";

/// Reserved field holding the serialized document.
pub const DOC_FIELD: &str = "_revdex_doc";

/// Names no schema field may use.
const RESERVED: [&str; 3] = [KEY_FIELD, ORDER_FIELD, DOC_FIELD];

/// A Tantivy schema with handles to every field.
#[derive(Debug, Clone)]
pub struct StoreSchema {
    /// The Tantivy schema.
    schema: TantivySchema,
    /// Document key.
    pub key: Field,
    /// Key as a sortable number.
    pub order: Field,
    /// Serialized document.
    pub doc: Field,
    /// Schema fields by name.
    fields: BTreeMap<String, (Field, FieldType)>,
}

impl StoreSchema {
    /// Builds the Tantivy schema for a document schema.
    pub fn new<D>(source: &Schema<D>) -> Result<Self, IndexError> {
        let mut builder = TantivySchema::builder();
        let key = builder.add_text_field(KEY_FIELD, STRING | STORED);
        let order = builder.add_i64_field(ORDER_FIELD, NumericOptions::default().set_fast());
        let doc = builder.add_text_field(DOC_FIELD, STORED);

        let mut fields = BTreeMap::new();
        for def in source.fields() {
            let name = def.name();
            if RESERVED.contains(&name) {
                return Err(IndexError::Invariant(format!(
                    "field name {name} is reserved by the index store"
                )));
            }
            let field = match def.field_type() {
                FieldType::Integer
                | FieldType::IntegerRange
                | FieldType::Long
                | FieldType::Timestamp => {
                    let mut options = NumericOptions::default().set_indexed().set_fast();
                    if def.is_stored() {
                        options = options.set_stored();
                    }
                    builder.add_i64_field(name, options)
                }
                FieldType::Exact | FieldType::Prefix => {
                    let mut options: TextOptions = STRING;
                    if def.is_stored() {
                        options = options.set_stored();
                    }
                    builder.add_text_field(name, options)
                }
                FieldType::FullText => {
                    let mut options = TextOptions::default().set_indexing_options(
                        TextFieldIndexing::default()
                            .set_tokenizer(REVDEX_TOKENIZER)
                            .set_index_option(IndexRecordOption::Basic),
                    );
                    if def.is_stored() {
                        options = options.set_stored();
                    }
                    builder.add_text_field(name, options)
                }
                FieldType::StoredOnly => builder.add_text_field(name, STORED),
            };
            fields.insert(name.to_string(), (field, def.field_type()));
        }

        Ok(Self {
            schema: builder.build(),
            key,
            order,
            doc,
            fields,
        })
    }

    /// Returns the Tantivy schema.
    pub fn schema(&self) -> &TantivySchema {
        &self.schema
    }

    /// Returns the handle and type of a schema field.
    pub fn field(&self, name: &str) -> Option<(Field, FieldType)> {
        self.fields.get(name).copied()
    }

    /// Adds one field value to a Tantivy document.
    pub fn add_value(&self, doc: &mut TantivyDocument, field: Field, value: &FieldValue) {
        match value {
            FieldValue::Integer(v) => doc.add_i64(field, i64::from(*v)),
            FieldValue::Long(v) => doc.add_i64(field, *v),
            FieldValue::Timestamp(t) => doc.add_i64(field, to_nanos(*t)),
            FieldValue::Text(s) => doc.add_text(field, s),
        }
    }
}

/// Converts a timestamp to nanoseconds since the epoch.
///
/// Index range queries then compare at the same precision as local
/// matching. Times outside the `i64` range saturate.
pub fn to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos()).map_or(i64::MIN, |n| -n),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tantivy::schema::FieldType as StoreFieldType;

    use super::*;
    use crate::{field::FieldDef, test_support::item_schema};

    #[test]
    fn maps_every_field() {
        let store = StoreSchema::new(&item_schema(2)).unwrap();
        assert_eq!(store.field("id").map(|(_, t)| t), Some(FieldType::Integer));
        assert_eq!(store.field("message").map(|(_, t)| t), Some(FieldType::FullText));
        assert_eq!(store.field("hashtag").map(|(_, t)| t), Some(FieldType::Exact));
        assert!(store.field("missing").is_none());
        assert!(store.schema().get_field(KEY_FIELD).is_ok());
        assert!(store.schema().get_field(ORDER_FIELD).is_ok());
        assert!(store.schema().get_field(DOC_FIELD).is_ok());
    }

    #[test]
    fn reserved_names_are_rejected() {
        #[derive(Clone)]
        struct Doc;
        let schema = Schema::new(
            1,
            vec![FieldDef::exact(KEY_FIELD).build(|_: &Doc| None::<String>)],
        )
        .unwrap();
        assert!(matches!(
            StoreSchema::new(&schema),
            Err(IndexError::Invariant(_))
        ));
    }

    #[test]
    fn timestamps_keep_sub_second_precision() {
        let early = UNIX_EPOCH - Duration::from_secs(90);
        assert_eq!(to_nanos(early), -90_000_000_000);
        let late = UNIX_EPOCH + Duration::from_millis(100_500);
        assert_eq!(to_nanos(late), 100_500_000_000);
        let far = UNIX_EPOCH + Duration::from_secs(10_000_000_000_000);
        assert_eq!(to_nanos(far), i64::MAX);
    }

    #[test]
    fn timestamps_are_numeric_fields() {
        let schema = Schema::new(
            1,
            vec![FieldDef::timestamp("at").build(|_: &()| None::<SystemTime>)],
        )
        .unwrap();
        let store = StoreSchema::new(&schema).unwrap();
        let (field, field_type) = store.field("at").unwrap();
        assert_eq!(field_type, FieldType::Timestamp);
        assert!(matches!(
            store.schema().get_field_entry(field).field_type(),
            StoreFieldType::I64(_)
        ));
    }
}
