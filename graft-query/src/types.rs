//! Common types used in query building.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sql::ColumnRef;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// Null handling in sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullsOrder {
    /// Nulls appear first in the results.
    First,
    /// Nulls appear last in the results.
    Last,
}

impl NullsOrder {
    /// Get the SQL clause for this null order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::First => "NULLS FIRST",
            Self::Last => "NULLS LAST",
        }
    }
}

/// Order by specification for a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByField {
    /// The column to order by, `column` or `alias.column`.
    pub column: Cow<'static, str>,
    /// The sort order.
    pub order: SortOrder,
    /// Null handling (optional).
    pub nulls: Option<NullsOrder>,
}

impl OrderByField {
    /// Create a new order by field.
    pub fn new(column: impl Into<Cow<'static, str>>, order: SortOrder) -> Self {
        Self {
            column: column.into(),
            order,
            nulls: None,
        }
    }

    /// Set null ordering.
    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }

    /// Create an ascending order.
    pub fn asc(column: impl Into<Cow<'static, str>>) -> Self {
        Self::new(column, SortOrder::Asc)
    }

    /// Create a descending order.
    pub fn desc(column: impl Into<Cow<'static, str>>) -> Self {
        Self::new(column, SortOrder::Desc)
    }

    /// The column reference this field orders by.
    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef::parse(&self.column)
    }

    /// Null placement in effect: explicit, or nulls last when ascending and
    /// first when descending (PostgreSQL's default).
    pub fn effective_nulls(&self) -> NullsOrder {
        self.nulls.unwrap_or(match self.order {
            SortOrder::Asc => NullsOrder::Last,
            SortOrder::Desc => NullsOrder::First,
        })
    }

    /// Generate the SQL for this order by field.
    pub fn to_sql(&self) -> String {
        let mut buffer = String::with_capacity(self.column.len() + 16);
        self.write_sql(&mut buffer);
        buffer
    }

    /// Write the SQL for this order by field into a buffer.
    pub fn write_sql(&self, buffer: &mut String) {
        buffer.push_str(&self.column_ref().to_sql());
        buffer.push(' ');
        buffer.push_str(self.order.as_sql());
        if let Some(nulls) = self.nulls {
            buffer.push(' ');
            buffer.push_str(nulls.as_sql());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order() {
        assert_eq!(SortOrder::Asc.as_sql(), "ASC");
        assert_eq!(SortOrder::Desc.to_string(), "DESC");
        assert_eq!(SortOrder::default(), SortOrder::Asc);
    }

    #[test]
    fn test_order_by_field_sql() {
        assert_eq!(OrderByField::asc("id").to_sql(), "id ASC");
        assert_eq!(
            OrderByField::desc("Model1.model1Prop1")
                .nulls(NullsOrder::Last)
                .to_sql(),
            "Model1.model1Prop1 DESC NULLS LAST"
        );
        assert_eq!(
            OrderByField::asc("mr2:model2Relation1.id").to_sql(),
            "\"mr2:model2Relation1\".id ASC"
        );
    }

    #[test]
    fn test_effective_nulls() {
        assert_eq!(OrderByField::asc("a").effective_nulls(), NullsOrder::Last);
        assert_eq!(OrderByField::desc("a").effective_nulls(), NullsOrder::First);
        assert_eq!(
            OrderByField::desc("a").nulls(NullsOrder::Last).effective_nulls(),
            NullsOrder::Last
        );
    }
}
