//! Filter types for building WHERE clauses.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::sql::SqlBuilder;

/// A value that can be compared, bound as a parameter or returned in a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// JSON value.
    Json(serde_json::Value),
    /// List of values.
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Compare two values the way SQL does.
    ///
    /// Returns `None` when either side is null or the values are of unrelated
    /// types. Integers and floats compare numerically.
    pub fn compare(&self, other: &FilterValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Json(a), Self::Json(b)) => (a == b).then_some(Ordering::Equal),
            (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// SQL equality: null never equals anything, including null.
    pub fn sql_eq(&self, other: &FilterValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Append a type-tagged encoding of this value to `out`.
    ///
    /// Equal values produce equal encodings, with integral floats encoded like
    /// integers so `1` and `1.0` match.
    pub fn encode_key(&self, out: &mut String) {
        use std::fmt::Write;

        let _ = match self {
            Self::Null => write!(out, "n;"),
            Self::Bool(b) => write!(out, "b{};", b),
            Self::Int(i) => write!(out, "i{};", i),
            Self::Float(f) if f.fract() == 0.0 && (i64::MIN as f64..i64::MAX as f64).contains(f) => {
                write!(out, "i{};", *f as i64)
            }
            Self::Float(f) => write!(out, "f{};", f),
            Self::String(s) => write!(out, "s{}:{};", s.len(), s),
            Self::Json(json) => {
                let text = json.to_string();
                write!(out, "j{}:{};", text.len(), text)
            }
            Self::List(values) => {
                out.push('[');
                for value in values {
                    value.encode_key(out);
                }
                write!(out, "];")
            }
        };
    }

    /// The string content of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

impl From<serde_json::Value> for FilterValue {
    fn from(v: serde_json::Value) -> Self {
        use serde_json::Value;

        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(values) => Self::List(values.into_iter().map(Into::into).collect()),
            object @ Value::Object(_) => Self::Json(object),
        }
    }
}

/// A complete filter that can be converted to SQL.
///
/// Columns are written as `column` or `alias.column`; the alias part may itself
/// contain `:` (`pets:owner.id`).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// No filter (always true).
    #[default]
    None,

    /// Equals comparison.
    Equals(String, FilterValue),
    /// Not equals comparison.
    NotEquals(String, FilterValue),

    /// Less than comparison.
    Lt(String, FilterValue),
    /// Less than or equal comparison.
    Lte(String, FilterValue),
    /// Greater than comparison.
    Gt(String, FilterValue),
    /// Greater than or equal comparison.
    Gte(String, FilterValue),

    /// In a list of values.
    In(String, Vec<FilterValue>),
    /// Not in a list of values.
    NotIn(String, Vec<FilterValue>),

    /// Contains (LIKE %value%).
    Contains(String, FilterValue),
    /// Starts with (LIKE value%).
    StartsWith(String, FilterValue),
    /// Ends with (LIKE %value).
    EndsWith(String, FilterValue),

    /// Is null check.
    IsNull(String),
    /// Is not null check.
    IsNotNull(String),

    /// Logical AND of multiple filters.
    And(Vec<Filter>),
    /// Logical OR of multiple filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    /// Create an empty filter (matches everything).
    pub fn none() -> Self {
        Self::None
    }

    /// Check if this filter is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Create an AND filter.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::And(filters),
        }
    }

    /// Create an OR filter.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::Or(filters),
        }
    }

    /// Create a NOT filter.
    pub fn not(filter: Filter) -> Self {
        if filter.is_none() {
            return Self::None;
        }
        Self::Not(Box::new(filter))
    }

    /// Combine with another filter using AND.
    pub fn and_then(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            _ => Self::And(vec![self, other]),
        }
    }

    /// Combine with another filter using OR.
    pub fn or_else(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::Or(mut filters) => {
                filters.push(other);
                Self::Or(filters)
            }
            _ => Self::Or(vec![self, other]),
        }
    }

    /// Match rows whose `columns` equal one of the key tuples.
    ///
    /// A single column becomes an `IN` list, composite keys an `OR` of `AND`s.
    pub fn key_in(columns: &[String], keys: &[Vec<FilterValue>]) -> Self {
        if keys.is_empty() {
            return Self::In(columns.first().cloned().unwrap_or_default(), Vec::new());
        }
        if let [column] = columns {
            return Self::In(
                column.clone(),
                keys.iter().filter_map(|key| key.first().cloned()).collect(),
            );
        }
        Self::Or(
            keys.iter()
                .map(|key| {
                    Self::And(
                        columns
                            .iter()
                            .zip(key)
                            .map(|(column, value)| Self::Equals(column.clone(), value.clone()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    /// Generate PostgreSQL-style SQL for this filter.
    /// Returns (sql, params) where params are the values to bind.
    pub fn to_sql(&self) -> (String, Vec<FilterValue>) {
        let mut builder = SqlBuilder::postgres();
        self.write_sql(&mut builder);
        builder.build()
    }

    /// Write this filter into a builder, numbering parameters after the ones
    /// already pushed.
    pub fn write_sql(&self, builder: &mut SqlBuilder) {
        match self {
            Self::None => {
                builder.push("TRUE");
            }

            Self::Equals(col, val) if val.is_null() => {
                builder.push_column(col).push(" IS NULL");
            }
            Self::NotEquals(col, val) if val.is_null() => {
                builder.push_column(col).push(" IS NOT NULL");
            }
            Self::Equals(col, val) => write_comparison(builder, col, "=", val),
            Self::NotEquals(col, val) => write_comparison(builder, col, "!=", val),
            Self::Lt(col, val) => write_comparison(builder, col, "<", val),
            Self::Lte(col, val) => write_comparison(builder, col, "<=", val),
            Self::Gt(col, val) => write_comparison(builder, col, ">", val),
            Self::Gte(col, val) => write_comparison(builder, col, ">=", val),

            Self::In(_, values) if values.is_empty() => {
                builder.push("FALSE");
            }
            Self::NotIn(_, values) if values.is_empty() => {
                builder.push("TRUE");
            }
            Self::In(col, values) => write_list(builder, col, "IN", values),
            Self::NotIn(col, values) => write_list(builder, col, "NOT IN", values),

            Self::Contains(col, val) => write_like(builder, col, val, "%", "%"),
            Self::StartsWith(col, val) => write_like(builder, col, val, "", "%"),
            Self::EndsWith(col, val) => write_like(builder, col, val, "%", ""),

            Self::IsNull(col) => {
                builder.push_column(col).push(" IS NULL");
            }
            Self::IsNotNull(col) => {
                builder.push_column(col).push(" IS NOT NULL");
            }

            Self::And(filters) if filters.is_empty() => {
                builder.push("TRUE");
            }
            Self::Or(filters) if filters.is_empty() => {
                builder.push("FALSE");
            }
            Self::And(filters) => write_group(builder, filters, " AND "),
            Self::Or(filters) => write_group(builder, filters, " OR "),
            Self::Not(filter) => {
                builder.push("NOT (");
                filter.write_sql(builder);
                builder.push(")");
            }
        }
    }
}

fn write_comparison(builder: &mut SqlBuilder, column: &str, op: &str, value: &FilterValue) {
    builder
        .push_column(column)
        .push(" ")
        .push(op)
        .push(" ")
        .push_param(value.clone());
}

fn write_list(builder: &mut SqlBuilder, column: &str, op: &str, values: &[FilterValue]) {
    builder.push_column(column).push(" ").push(op).push(" (");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            builder.push_sep(", ");
        }
        builder.push_param(value.clone());
    }
    builder.push(")");
}

fn write_like(builder: &mut SqlBuilder, column: &str, value: &FilterValue, prefix: &str, suffix: &str) {
    let pattern = match value {
        FilterValue::String(s) => FilterValue::String(format!("{}{}{}", prefix, s, suffix)),
        other => other.clone(),
    };
    builder.push_column(column).push(" LIKE ").push_param(pattern);
}

fn write_group(builder: &mut SqlBuilder, filters: &[Filter], separator: &str) {
    builder.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            builder.push_sep(separator);
        }
        filter.write_sql(builder);
    }
    builder.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_value_from() {
        assert_eq!(FilterValue::from(42i32), FilterValue::Int(42));
        assert_eq!(FilterValue::from("hello"), FilterValue::String("hello".to_string()));
        assert_eq!(FilterValue::from(true), FilterValue::Bool(true));
        assert_eq!(FilterValue::from(None::<i64>), FilterValue::Null);
    }

    #[test]
    fn test_filter_value_from_json() {
        let value = FilterValue::from(serde_json::json!([1, 2.5, "x", null]));
        assert_eq!(
            value,
            FilterValue::List(vec![
                FilterValue::Int(1),
                FilterValue::Float(2.5),
                FilterValue::String("x".into()),
                FilterValue::Null,
            ])
        );
    }

    #[test]
    fn test_compare_null_semantics() {
        assert_eq!(FilterValue::Null.compare(&FilterValue::Null), None);
        assert!(!FilterValue::Null.sql_eq(&FilterValue::Null));
        assert!(FilterValue::Int(1).sql_eq(&FilterValue::Float(1.0)));
        assert_eq!(
            FilterValue::from("a").compare(&FilterValue::from("b")),
            Some(Ordering::Less)
        );
        assert_eq!(FilterValue::Int(1).compare(&FilterValue::from("1")), None);
    }

    #[test]
    fn test_encode_key() {
        let mut a = String::new();
        FilterValue::Int(1).encode_key(&mut a);
        let mut b = String::new();
        FilterValue::Float(1.0).encode_key(&mut b);
        assert_eq!(a, b);

        let mut s = String::new();
        FilterValue::from("1").encode_key(&mut s);
        assert_ne!(a, s);
    }

    #[test]
    fn test_filter_equals() {
        let filter = Filter::Equals("email".to_string(), "test@example.com".into());
        let (sql, params) = filter.to_sql();
        assert_eq!(sql, "email = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_filter_and_numbers_params() {
        let f1 = Filter::Equals("name".to_string(), "Alice".into());
        let f2 = Filter::Gt("age".to_string(), FilterValue::Int(18));
        let f3 = Filter::In("id".to_string(), vec![1.into(), 2.into()]);
        let combined = Filter::and([f1, f2, f3]);

        let (sql, params) = combined.to_sql();
        assert_eq!(sql, "(name = $1 AND age > $2 AND id IN ($3, $4))");
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_filter_or() {
        let f1 = Filter::Equals("status".to_string(), "active".into());
        let f2 = Filter::Equals("status".to_string(), "pending".into());
        let (sql, _) = Filter::or([f1, f2]).to_sql();
        assert_eq!(sql, "(status = $1 OR status = $2)");
    }

    #[test]
    fn test_filter_not() {
        let filter = Filter::not(Filter::Equals("deleted".to_string(), FilterValue::Bool(true)));
        let (sql, _) = filter.to_sql();
        assert_eq!(sql, "NOT (deleted = $1)");
    }

    #[test]
    fn test_filter_is_null() {
        let (sql, params) = Filter::IsNull("deleted_at".to_string()).to_sql();
        assert_eq!(sql, "deleted_at IS NULL");
        assert!(params.is_empty());

        let (sql, _) = Filter::Equals("deleted_at".to_string(), FilterValue::Null).to_sql();
        assert_eq!(sql, "deleted_at IS NULL");
    }

    #[test]
    fn test_empty_in_is_false() {
        let (sql, params) = Filter::In("id".to_string(), vec![]).to_sql();
        assert_eq!(sql, "FALSE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_filter_contains() {
        let filter = Filter::Contains("email".to_string(), "example".into());
        let (sql, params) = filter.to_sql();
        assert!(sql.contains("LIKE"));
        assert_eq!(params, vec![FilterValue::String("%example%".into())]);
    }

    #[test]
    fn test_qualified_columns_are_quoted() {
        let filter = Filter::Equals("mr2:model2Relation1.id".to_string(), 6.into());
        let (sql, _) = filter.to_sql();
        assert_eq!(sql, "\"mr2:model2Relation1\".id = $1");
    }

    #[test]
    fn test_key_in() {
        let single = Filter::key_in(&["id".to_string()], &[vec![1.into()], vec![2.into()]]);
        assert_eq!(single, Filter::In("id".into(), vec![1.into(), 2.into()]));

        let composite = Filter::key_in(
            &["a".to_string(), "b".to_string()],
            &[vec![1.into(), 2.into()]],
        );
        let (sql, _) = composite.to_sql();
        assert_eq!(sql, "((a = $1 AND b = $2))");
    }
}
