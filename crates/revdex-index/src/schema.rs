//! Versioned schemas.
//!
//! A [`Schema`] is an immutable set of field definitions with a version
//! number. [`SchemaDefinitions`] holds the ordered version history of one
//! document kind, registered explicitly in ascending order.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    IndexError,
    error::SchemaError,
    field::{FieldDef, FieldType, FieldValue},
};

/// Shared handle to a schema.
pub type SchemaRef<D> = Arc<Schema<D>>;

/// An immutable, versioned set of fields.
pub struct Schema<D> {
    /// Positive version number.
    version: u32,
    /// Whether this version has shipped in a release.
    release: bool,
    /// Fields keyed by name.
    fields: BTreeMap<String, Arc<FieldDef<D>>>,
}

impl<D> Schema<D> {
    /// Creates a schema, validating its fields.
    ///
    /// Field names must match `[a-z0-9_]+`, integer range fields must not be
    /// repeatable and names must be unique.
    pub fn new(version: u32, fields: Vec<FieldDef<D>>) -> Result<Self, SchemaError> {
        if version == 0 {
            return Err(SchemaError::InvalidVersion);
        }
        let mut map = BTreeMap::new();
        for field in fields {
            let name = field.name().to_string();
            if !is_valid_field_name(&name) {
                return Err(SchemaError::InvalidFieldName { name });
            }
            if field.field_type() == FieldType::IntegerRange && field.is_repeatable() {
                return Err(SchemaError::RepeatableRange { name });
            }
            if map.contains_key(&name) {
                return Err(SchemaError::DuplicateField { name });
            }
            map.insert(name, Arc::new(field));
        }
        Ok(Self {
            version,
            release: true,
            fields: map,
        })
    }

    /// Sets whether this version is part of a release.
    pub fn with_release(mut self, release: bool) -> Self {
        self.release = release;
        self
    }

    /// Returns the version number.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Returns true if this version has shipped in a release.
    pub fn is_release(&self) -> bool {
        self.release
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Arc<FieldDef<D>>> {
        self.fields.get(name)
    }

    /// Returns true if the schema has a field with this name.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldDef<D>>> {
        self.fields.values()
    }

    /// Extracts every field with at least one value from a document.
    pub fn build_fields<'a>(&'a self, doc: &D) -> Vec<(&'a FieldDef<D>, Vec<FieldValue>)> {
        self.fields
            .values()
            .filter_map(|field| {
                let values = field.values(doc);
                (!values.is_empty()).then_some((field.as_ref(), values))
            })
            .collect()
    }

    /// Returns the names of stored fields.
    pub fn stored_fields(&self) -> Vec<&str> {
        self.fields
            .values()
            .filter(|f| f.is_stored())
            .map(|f| f.name())
            .collect()
    }
}

/// Returns true if `name` is non-empty lowercase snake_case.
fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// The ordered schema history of one document kind.
pub struct SchemaDefinitions<D> {
    /// Document kind name, e.g. `changes`.
    name: String,
    /// Schemas keyed by version.
    schemas: BTreeMap<u32, SchemaRef<D>>,
}

impl<D> SchemaDefinitions<D> {
    /// Registers schemas in ascending version order.
    ///
    /// Gaps between versions are allowed; duplicates and descending versions
    /// are rejected.
    pub fn new(name: impl Into<String>, schemas: Vec<Schema<D>>) -> Result<Self, SchemaError> {
        let mut map = BTreeMap::new();
        let mut previous = 0;
        for schema in schemas {
            if schema.version() <= previous {
                return Err(SchemaError::VersionOrder {
                    previous,
                    version: schema.version(),
                });
            }
            previous = schema.version();
            map.insert(schema.version(), Arc::new(schema));
        }
        Ok(Self {
            name: name.into(),
            schemas: map,
        })
    }

    /// Returns the document kind name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the schema for a version.
    pub fn get(&self, version: u32) -> Result<SchemaRef<D>, IndexError> {
        self.schemas
            .get(&version)
            .cloned()
            .ok_or_else(|| IndexError::SchemaNotFound {
                name: self.name.clone(),
                version,
            })
    }

    /// Returns the newest schema.
    pub fn latest(&self) -> Result<SchemaRef<D>, IndexError> {
        self.schemas
            .values()
            .next_back()
            .cloned()
            .ok_or_else(|| IndexError::NoSchema {
                name: self.name.clone(),
            })
    }

    /// Returns all registered versions in ascending order.
    pub fn versions(&self) -> Vec<u32> {
        self.schemas.keys().copied().collect()
    }

    /// Iterates schemas from newest to oldest.
    pub fn newest_first(&self) -> impl Iterator<Item = &SchemaRef<D>> {
        self.schemas.values().rev()
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Clone)]
    struct Doc {
        project: String,
        counts: Vec<i32>,
    }

    fn project() -> FieldDef<Doc> {
        FieldDef::exact("project")
            .stored()
            .build(|d: &Doc| Some(d.project.clone()))
    }

    fn schema(version: u32) -> Schema<Doc> {
        Schema::new(version, vec![project()]).unwrap()
    }

    #[test]
    fn rejects_invalid_names() {
        for name in ["Project", "", "pro-ject", "a b"] {
            let field = FieldDef::exact(name).build(|d: &Doc| Some(d.project.clone()));
            assert!(matches!(
                Schema::new(1, vec![field]),
                Err(SchemaError::InvalidFieldName { .. })
            ));
        }
    }

    #[test]
    fn rejects_repeatable_range() {
        let field = FieldDef::integer_range("count").build_repeatable(|d: &Doc| d.counts.clone());
        assert_eq!(
            Schema::new(1, vec![field]).err(),
            Some(SchemaError::RepeatableRange {
                name: "count".into()
            })
        );
    }

    #[test]
    fn rejects_duplicate_fields() {
        assert_eq!(
            Schema::new(1, vec![project(), project()]).err(),
            Some(SchemaError::DuplicateField {
                name: "project".into()
            })
        );
    }

    #[test]
    fn rejects_zero_version() {
        assert_eq!(
            Schema::<Doc>::new(0, vec![]).err(),
            Some(SchemaError::InvalidVersion)
        );
    }

    #[test]
    fn build_fields_skips_empty() {
        let counts = FieldDef::integer("count").build_repeatable(|d: &Doc| d.counts.clone());
        let schema = Schema::new(1, vec![project(), counts]).unwrap();
        let doc = Doc {
            project: "tools".into(),
            counts: vec![],
        };
        let built = schema.build_fields(&doc);
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].0.name(), "project");
        assert_eq!(schema.stored_fields(), vec!["project"]);
    }

    #[test]
    fn definitions_lookup() {
        let defs = SchemaDefinitions::new("docs", vec![schema(1), schema(3)]).unwrap();
        assert_eq!(defs.versions(), vec![1, 3]);
        assert_eq!(defs.latest().unwrap().version(), 3);
        assert_eq!(defs.get(1).unwrap().version(), 1);
        assert!(matches!(
            defs.get(2),
            Err(IndexError::SchemaNotFound { version: 2, .. })
        ));
        let newest: Vec<u32> = defs.newest_first().map(|s| s.version()).collect();
        assert_eq!(newest, vec![3, 1]);
    }

    #[test]
    fn definitions_reject_out_of_order() {
        let err = SchemaDefinitions::new("docs", vec![schema(2), schema(2)]).err();
        assert_eq!(
            err,
            Some(SchemaError::VersionOrder {
                previous: 2,
                version: 2
            })
        );
        assert!(SchemaDefinitions::new("docs", vec![schema(3), schema(1)]).is_err());
    }

    #[test]
    fn empty_definitions_have_no_latest() {
        let defs = SchemaDefinitions::<Doc>::new("docs", vec![]).unwrap();
        assert!(matches!(defs.latest(), Err(IndexError::NoSchema { .. })));
    }
}
