//! Key columns: making sure they are selected, and comparing their values.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::record::Record;
use crate::filter::FilterValue;
use crate::query::{RelationQuery, Selection};
use crate::sql::ColumnRef;

/// Key values of one record. Most keys are a single column.
pub type KeyValues = SmallVec<[FilterValue; 2]>;

/// A hashable encoding of key values.
///
/// Values that compare equal in SQL encode equally, so `1` and `1.0` produce the
/// same key. A key containing a null never matches anything and has no `RowKey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey(String);

impl RowKey {
    /// Encode `values`, or `None` if any of them is null.
    pub fn new<'a>(values: impl IntoIterator<Item = &'a FilterValue>) -> Option<Self> {
        let mut encoded = String::new();
        for value in values {
            if value.is_null() {
                return None;
            }
            value.encode_key(&mut encoded);
        }
        Some(Self(encoded))
    }

    /// The encoded form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Where the key columns of a query appear in its output.
///
/// The loader needs key columns on every record it joins. When a mutator
/// narrows the SELECT list, missing key columns are added and remembered so
/// they can be removed from the results again.
#[derive(Debug, Clone, Default)]
pub struct KeySelection {
    fields: HashMap<String, String>,
    injected: Vec<String>,
}

impl KeySelection {
    /// Every column is output under its own name.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Make sure each of `columns` of the base table is selected by `query`.
    pub fn ensure<'c>(query: &mut RelationQuery, columns: impl IntoIterator<Item = &'c str>) -> Self {
        let mut selection = Self::default();
        for column in columns {
            if selection.fields.contains_key(column) {
                continue;
            }
            let field = match query.output_for(column) {
                Some(field) => field,
                None => {
                    query.column(Selection::column(ColumnRef::new(query.alias.clone(), column)));
                    selection.injected.push(column.to_string());
                    column.to_string()
                }
            };
            selection.fields.insert(column.to_string(), field);
        }
        selection
    }

    /// The output field holding `column`.
    pub fn field<'s>(&'s self, column: &'s str) -> &'s str {
        self.fields.get(column).map(String::as_str).unwrap_or(column)
    }

    /// Fields added to the SELECT list by [`KeySelection::ensure`].
    pub fn injected(&self) -> &[String] {
        &self.injected
    }

    /// Key values of `columns` on `record`, missing fields reading as null.
    pub fn values(&self, record: &Record, columns: &[String]) -> KeyValues {
        columns
            .iter()
            .map(|column| {
                record
                    .value(self.field(column))
                    .cloned()
                    .unwrap_or(FilterValue::Null)
            })
            .collect()
    }

    /// The [`RowKey`] of `columns` on `record`.
    pub fn key(&self, record: &Record, columns: &[String]) -> Option<RowKey> {
        RowKey::new(&self.values(record, columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Row;

    #[test]
    fn test_row_key() {
        let a = RowKey::new(&[FilterValue::Int(1), FilterValue::from("x")]);
        let b = RowKey::new(&[FilterValue::Float(1.0), FilterValue::from("x")]);
        assert_eq!(a, b);
        assert_ne!(a, RowKey::new(&[FilterValue::from("1"), FilterValue::from("x")]));
        assert_eq!(RowKey::new(&[FilterValue::Int(1), FilterValue::Null]), None);
    }

    #[test]
    fn test_row_key_large_floats_stay_distinct() {
        let a = RowKey::new(&[FilterValue::Float(1e20)]);
        let b = RowKey::new(&[FilterValue::Float(2e20)]);
        assert_ne!(a, b);
        assert_ne!(RowKey::new(&[FilterValue::Float(1e19)]), RowKey::new(&[FilterValue::Int(i64::MAX)]));
        assert_eq!(
            RowKey::new(&[FilterValue::Float(-9_007_199_254_740_992.0)]),
            RowKey::new(&[FilterValue::Int(-9_007_199_254_740_992)])
        );
    }

    #[test]
    fn test_ensure_without_explicit_select() {
        let mut query = RelationQuery::from_table("pets");
        let keys = KeySelection::ensure(&mut query, ["id", "ownerId"]);
        assert!(query.selects.is_empty());
        assert!(keys.injected().is_empty());
        assert_eq!(keys.field("ownerId"), "ownerId");
    }

    #[test]
    fn test_ensure_injects_and_reuses_aliases() {
        let mut query = RelationQuery::from_table("pets");
        query.select(["name", "ownerId as owner"]);
        let keys = KeySelection::ensure(&mut query, ["id", "ownerId", "id"]);

        assert_eq!(keys.injected(), ["id"]);
        assert_eq!(keys.field("ownerId"), "owner");
        assert_eq!(query.to_string(), "SELECT name, ownerId AS owner, pets.id FROM pets");
    }

    #[test]
    fn test_key_values() {
        let keys = KeySelection::identity();
        let row: Row = [("id".to_string(), FilterValue::Int(3))].into_iter().collect();
        let record = Record::from_row(row);
        let columns = vec!["id".to_string(), "missing".to_string()];
        assert_eq!(keys.values(&record, &columns).as_slice(), &[FilterValue::Int(3), FilterValue::Null]);
        assert_eq!(keys.key(&record, &columns), None);
        assert!(keys.key(&record, &columns[..1]).is_some());
    }
}
