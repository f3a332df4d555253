//! Loaded records and the relation fields grafted onto them.

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::filter::FilterValue;
use crate::traits::Row;

/// A field of a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A column value.
    Value(FilterValue),
    /// A single related record, or none.
    One(Option<Box<Record>>),
    /// Related records.
    Many(Vec<Record>),
}

impl Field {
    /// The column value, if this is one.
    pub fn as_value(&self) -> Option<&FilterValue> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Whether this is a relation field.
    pub fn is_relation(&self) -> bool {
        !matches!(self, Self::Value(_))
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(value) => value.serialize(serializer),
            Self::One(None) => serializer.serialize_none(),
            Self::One(Some(record)) => record.serialize(serializer),
            Self::Many(records) => {
                let mut seq = serializer.serialize_seq(Some(records.len()))?;
                for record in records {
                    seq.serialize_element(record)?;
                }
                seq.end()
            }
        }
    }
}

/// A loaded record: column values followed by relation fields, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: IndexMap<String, Field>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a result row.
    pub fn from_row(row: Row) -> Self {
        Self {
            fields: row
                .into_iter()
                .map(|(name, value)| (name, Field::Value(value)))
                .collect(),
        }
    }

    /// Get a field.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Get a column value.
    pub fn value(&self, name: &str) -> Option<&FilterValue> {
        self.get(name).and_then(Field::as_value)
    }

    /// Get a to-one relation. `Some(None)` when loaded but empty.
    pub fn one(&self, name: &str) -> Option<Option<&Record>> {
        match self.get(name)? {
            Field::One(record) => Some(record.as_deref()),
            _ => None,
        }
    }

    /// Get a to-many relation.
    pub fn many(&self, name: &str) -> Option<&[Record]> {
        match self.get(name)? {
            Field::Many(records) => Some(records),
            _ => None,
        }
    }

    /// Set a field, keeping its position if it exists.
    pub fn set(&mut self, name: impl Into<String>, field: Field) {
        self.fields.insert(name.into(), field);
    }

    /// Set a column value.
    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<FilterValue>) {
        self.set(name, Field::Value(value.into()));
    }

    /// Remove a field, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Field> {
        self.fields.shift_remove(name)
    }

    /// Whether the record has a field.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Fields, in order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<Row> for Record {
    fn from(row: Row) -> Self {
        Self::from_row(row)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, field) in &self.fields {
            map.serialize_entry(name, field)?;
        }
        map.end()
    }
}
