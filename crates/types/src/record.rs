//! Untyped records and declared field schemas
//!
//! A [`RawRecord`] is the dynamically-typed unit that loaders produce and the
//! engine consumes. Typed record structs declare their fields once through
//! [`SchemaRecord`], which lets the engine move values between the two
//! representations without runtime type inspection.

use crate::errors::{Result, TypesError};
use crate::value::{FieldType, FieldValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered mapping from unique field name to scalar value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: IndexMap<String, FieldValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: IndexMap::with_capacity(capacity),
        }
    }

    /// Builder-style insert
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Add or replace a field, returning the previous value
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.fields.insert(name.into(), value.into())
    }

    /// Rewrite an existing field in place
    ///
    /// Returns `false` and leaves the record untouched when the field does not exist.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> bool {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, FieldValue)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RawRecord {
    type Item = (String, FieldValue);
    type IntoIter = indexmap::map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// One declared field of a schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// Whether the engine may write this field back into the typed record
    pub writable: bool,
}

/// Declared, ordered field layout of a record type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: Vec<FieldDef>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a writable field
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            writable: true,
        });
        self
    }

    /// Declare a field the engine must not write back
    pub fn read_only(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            field_type,
            writable: false,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_writable(&self, name: &str) -> bool {
        self.get(name).map(|f| f.writable).unwrap_or(false)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A strongly-typed record with a declared schema
///
/// Implementors expose their fields by name so that untyped processing can be
/// applied to them field by field.
pub trait SchemaRecord: Send + 'static {
    /// The declared field layout, identical for every instance
    fn schema() -> FieldSchema
    where
        Self: Sized;

    /// Read one declared field
    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Write one declared, writable field
    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<()>;

    /// Project this record onto an untyped [`RawRecord`] in schema order
    fn to_raw(&self) -> RawRecord
    where
        Self: Sized,
    {
        Self::schema()
            .fields()
            .iter()
            .filter_map(|def| self.field(&def.name).map(|v| (def.name.clone(), v)))
            .collect()
    }
}

impl SchemaRecord for RawRecord {
    fn schema() -> FieldSchema {
        FieldSchema::new()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        self.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> Result<()> {
        if self.set(name, value) {
            Ok(())
        } else {
            Err(TypesError::UnknownField(name.to_string()))
        }
    }

    fn to_raw(&self) -> RawRecord {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_only_rewrites_existing_fields() {
        let mut record = RawRecord::new().with_field("price", 10i64);
        assert!(record.set("price", 12i64));
        assert!(!record.set("quantity", 3i64));
        assert_eq!(record.get("price"), Some(&FieldValue::Int(12)));
        assert!(!record.contains("quantity"));
    }

    #[test]
    fn test_field_order_is_preserved() {
        let record = RawRecord::new()
            .with_field("b", 1i64)
            .with_field("a", 2i64)
            .with_field("c", 3i64);
        let names: Vec<_> = record.field_names().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_schema_declaration() {
        let schema = FieldSchema::new()
            .field("price", FieldType::Decimal)
            .read_only("id", FieldType::Int);
        assert_eq!(schema.len(), 2);
        assert!(schema.is_writable("price"));
        assert!(!schema.is_writable("id"));
        assert!(!schema.is_writable("missing"));
    }

    #[test]
    fn test_raw_record_set_field_unknown() {
        let mut record = RawRecord::new();
        let err = record.set_field("nope", FieldValue::Null).unwrap_err();
        assert!(matches!(err, TypesError::UnknownField(name) if name == "nope"));
    }
}
