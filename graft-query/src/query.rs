//! Structured SELECT queries.
//!
//! [`RelationQuery`] is what query mutators receive and what a
//! [`QueryExecutor`](crate::traits::QueryExecutor) runs. It renders to
//! parameterized SQL but stays structured so that the loader can inspect and
//! extend the selection.

use std::borrow::Cow;
use std::fmt;

use crate::filter::{Filter, FilterValue};
use crate::sql::{ColumnRef, DatabaseType, SqlBuilder};
use crate::types::{OrderByField, SortOrder};

/// One item of a SELECT list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// `*`
    All,
    /// `alias.*`
    AllFrom(String),
    /// A column, optionally renamed.
    Column {
        /// The selected column.
        column: ColumnRef,
        /// Output name, when renamed with `AS`.
        alias: Option<String>,
    },
}

impl Selection {
    /// Parse `*`, `alias.*`, `column`, `alias.column` or `<column> as <name>`.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input == "*" {
            return Self::All;
        }
        if let Some(table) = input.strip_suffix(".*") {
            return Self::AllFrom(table.to_string());
        }
        let lower = input.to_ascii_lowercase();
        match lower.find(" as ") {
            Some(index) => Self::Column {
                column: ColumnRef::parse(&input[..index]),
                alias: Some(input[index + 4..].trim().to_string()),
            },
            None => Self::Column {
                column: ColumnRef::parse(input),
                alias: None,
            },
        }
    }

    /// Select a column under its own name.
    pub fn column(column: impl Into<ColumnRef>) -> Self {
        Self::Column {
            column: column.into(),
            alias: None,
        }
    }

    /// Select a column under `alias`.
    pub fn aliased(column: impl Into<ColumnRef>, alias: impl Into<String>) -> Self {
        Self::Column {
            column: column.into(),
            alias: Some(alias.into()),
        }
    }

    /// Name of the output column for single-column selections.
    pub fn output_name(&self) -> Option<&str> {
        match self {
            Self::Column { alias: Some(alias), .. } => Some(alias),
            Self::Column { column, .. } => Some(&column.column),
            Self::All | Self::AllFrom(_) => None,
        }
    }

    fn write_sql(&self, builder: &mut SqlBuilder) {
        match self {
            Self::All => {
                builder.push("*");
            }
            Self::AllFrom(table) => {
                builder.push_identifier(table).push(".*");
            }
            Self::Column { column, alias } => {
                builder.push(column.to_sql());
                if let Some(alias) = alias {
                    builder.push(" AS ").push_identifier(alias);
                }
            }
        }
    }
}

impl From<&str> for Selection {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

impl From<String> for Selection {
    fn from(input: String) -> Self {
        Self::parse(&input)
    }
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `LEFT JOIN`
    Left,
    /// `INNER JOIN`
    Inner,
}

impl JoinKind {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Left => "LEFT JOIN",
            Self::Inner => "INNER JOIN",
        }
    }
}

/// What a join reads from.
#[derive(Debug, Clone)]
pub enum JoinSource {
    /// A table.
    Table(String),
    /// A derived table.
    Subquery(Box<RelationQuery>),
}

/// A join against a table or subquery, on column equality.
#[derive(Debug, Clone)]
pub struct JoinClause {
    /// Join type.
    pub kind: JoinKind,
    /// Joined table or subquery.
    pub source: JoinSource,
    /// Alias the joined source is known by.
    pub alias: String,
    /// Column pairs that must be equal.
    pub on: Vec<(ColumnRef, ColumnRef)>,
}

impl JoinClause {
    /// `LEFT JOIN table AS alias`.
    pub fn left(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(JoinKind::Left, JoinSource::Table(table.into()), alias)
    }

    /// `INNER JOIN table AS alias`.
    pub fn inner(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(JoinKind::Inner, JoinSource::Table(table.into()), alias)
    }

    /// `LEFT JOIN (subquery) AS alias`.
    pub fn subquery(query: RelationQuery, alias: impl Into<String>) -> Self {
        Self::new(JoinKind::Left, JoinSource::Subquery(Box::new(query)), alias)
    }

    fn new(kind: JoinKind, source: JoinSource, alias: impl Into<String>) -> Self {
        Self {
            kind,
            source,
            alias: alias.into(),
            on: Vec::new(),
        }
    }

    /// Add an equality condition.
    pub fn on(mut self, left: ColumnRef, right: ColumnRef) -> Self {
        self.on.push((left, right));
        self
    }

    fn write_sql(&self, builder: &mut SqlBuilder) {
        builder.push(" ").push(self.kind.as_sql()).push(" ");
        match &self.source {
            JoinSource::Table(table) => {
                builder.push_identifier(table);
            }
            JoinSource::Subquery(query) => {
                builder.push("(");
                query.write_sql(builder);
                builder.push(")");
            }
        }
        builder.push(" AS ").push_identifier(&self.alias).push(" ON ");
        if self.on.is_empty() {
            builder.push("TRUE");
        }
        for (i, (left, right)) in self.on.iter().enumerate() {
            if i > 0 {
                builder.push_sep(" AND ");
            }
            builder.push(left.to_sql()).push(" = ").push(right.to_sql());
        }
    }
}

/// A SELECT over one table with optional joins.
#[derive(Debug, Clone, Default)]
pub struct RelationQuery {
    /// The table read from.
    pub table: String,
    /// The alias the table is known by; equals `table` unless renamed.
    pub alias: String,
    /// The SELECT list. Empty selects every column of the base table.
    pub selects: Vec<Selection>,
    /// `SELECT DISTINCT`.
    pub distinct: bool,
    /// Joins, in order.
    pub joins: Vec<JoinClause>,
    /// WHERE clause.
    pub filter: Filter,
    /// ORDER BY clause.
    pub order_by: Vec<OrderByField>,
    /// LIMIT.
    pub limit: Option<u64>,
    /// OFFSET.
    pub offset: Option<u64>,
}

impl RelationQuery {
    /// Select from `table`, known by its own name.
    pub fn from_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            alias: table.clone(),
            table,
            ..Self::default()
        }
    }

    /// Rename the base table.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Add columns to the SELECT list (`"col"`, `"t.col"`, `"col as name"`).
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        self.selects.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Add one column to the SELECT list.
    pub fn column(&mut self, column: impl Into<Selection>) -> &mut Self {
        self.selects.push(column.into());
        self
    }

    /// `SELECT DISTINCT` over the given columns.
    pub fn distinct<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        self.distinct = true;
        self.select(columns)
    }

    /// AND a filter into the WHERE clause.
    pub fn filter(&mut self, filter: Filter) -> &mut Self {
        self.filter = std::mem::take(&mut self.filter).and_then(filter);
        self
    }

    /// `column = value` (`IS NULL` for a null value).
    pub fn where_eq(&mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> &mut Self {
        self.filter(Filter::Equals(column.into(), value.into()))
    }

    /// `column != value`.
    pub fn where_ne(&mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> &mut Self {
        self.filter(Filter::NotEquals(column.into(), value.into()))
    }

    /// `column IN (values)`.
    pub fn where_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.filter(Filter::In(
            column.into(),
            values.into_iter().map(Into::into).collect(),
        ))
    }

    /// `column IS NULL`.
    pub fn where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.filter(Filter::IsNull(column.into()))
    }

    /// `column IS NOT NULL`.
    pub fn where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.filter(Filter::IsNotNull(column.into()))
    }

    /// Add an ORDER BY column.
    pub fn order_by(&mut self, column: impl Into<Cow<'static, str>>, order: SortOrder) -> &mut Self {
        self.order_by.push(OrderByField::new(column, order));
        self
    }

    /// Add an ascending ORDER BY column.
    pub fn order_by_asc(&mut self, column: impl Into<Cow<'static, str>>) -> &mut Self {
        self.order_by(column, SortOrder::Asc)
    }

    /// Add a descending ORDER BY column.
    pub fn order_by_desc(&mut self, column: impl Into<Cow<'static, str>>) -> &mut Self {
        self.order_by(column, SortOrder::Desc)
    }

    /// Set LIMIT.
    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    /// Set OFFSET.
    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Append a join.
    pub fn join(&mut self, join: JoinClause) -> &mut Self {
        self.joins.push(join);
        self
    }

    /// Whether the SELECT list was narrowed from the default `*`.
    pub fn has_explicit_select(&self) -> bool {
        !self.selects.is_empty()
    }

    /// The output name under which `column` of the base table is selected, if it is.
    pub fn output_for(&self, column: &str) -> Option<String> {
        if self.selects.is_empty() {
            return Some(column.to_string());
        }
        self.selects.iter().find_map(|selection| match selection {
            Selection::All => Some(column.to_string()),
            Selection::AllFrom(table) if *table == self.alias || *table == self.table => {
                Some(column.to_string())
            }
            Selection::Column { column: c, .. } if c.matches(&self.alias, &self.table, column) => {
                selection.output_name().map(str::to_string)
            }
            _ => None,
        })
    }

    /// Render to SQL with placeholders for `db`.
    pub fn to_sql(&self, db: DatabaseType) -> (String, Vec<FilterValue>) {
        let mut builder = SqlBuilder::new(db);
        self.write_sql(&mut builder);
        builder.build()
    }

    /// Write this query into a builder.
    pub fn write_sql(&self, builder: &mut SqlBuilder) {
        builder.push("SELECT ");
        if self.distinct {
            builder.push("DISTINCT ");
        }
        if self.selects.is_empty() {
            builder.push("*");
        }
        for (i, selection) in self.selects.iter().enumerate() {
            if i > 0 {
                builder.push_sep(", ");
            }
            selection.write_sql(builder);
        }

        builder.push(" FROM ").push_identifier(&self.table);
        if self.alias != self.table {
            builder.push(" AS ").push_identifier(&self.alias);
        }

        for join in &self.joins {
            join.write_sql(builder);
        }

        if !self.filter.is_none() {
            builder.push(" WHERE ");
            self.filter.write_sql(builder);
        }

        if !self.order_by.is_empty() {
            let order: Vec<String> = self.order_by.iter().map(OrderByField::to_sql).collect();
            builder.push(" ORDER BY ").push(order.join(", "));
        }

        if let Some(limit) = self.limit {
            builder.push(format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            builder.push(format!(" OFFSET {}", offset));
        }
    }
}

impl fmt::Display for RelationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql(DatabaseType::PostgreSQL).0)
    }
}
