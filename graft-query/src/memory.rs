//! In-memory query executor.
//!
//! [`MemoryExecutor`] evaluates [`RelationQuery`]s against tables held in
//! memory. It implements the subset of SQL the loader generates (equality
//! joins against tables and subqueries, WHERE with SQL null semantics, ORDER BY,
//! DISTINCT, LIMIT/OFFSET) and keeps a log of every statement it ran.
//!
//! ```rust
//! use graft_query::memory::MemoryExecutor;
//! use graft_query::query::RelationQuery;
//! use graft_query::traits::QueryExecutor;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let db = MemoryExecutor::new();
//! db.create_table("pets", ["id", "name"]);
//! db.insert_json("pets", json!([{ "id": 1, "name": "Fluffy" }])).unwrap();
//!
//! let mut query = RelationQuery::from_table("pets");
//! query.where_eq("id", 1);
//! let rows = db.fetch(&query).await.unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(db.query_count(), 1);
//! # }
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, FilterValue};
use crate::query::{JoinKind, JoinSource, RelationQuery, Selection};
use crate::sql::{ColumnRef, DatabaseType};
use crate::traits::{QueryExecutor, Row};
use crate::types::{NullsOrder, SortOrder};

/// A table held by [`MemoryExecutor`].
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows, with values in column order.
    pub rows: Vec<Vec<FilterValue>>,
}

/// An executor over in-memory tables.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<IndexMap<String, MemoryTable>>,
    log: Mutex<Vec<String>>,
    failing: RwLock<HashSet<String>>,
    db_type: DatabaseType,
}

impl MemoryExecutor {
    /// An executor with no tables, logging PostgreSQL-style SQL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log statements with the placeholder style of `db_type`.
    pub fn with_database_type(mut self, db_type: DatabaseType) -> Self {
        self.db_type = db_type;
        self
    }

    /// Create (or replace) an empty table.
    pub fn create_table<I, S>(&self, name: &str, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let table = MemoryTable {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        };
        self.tables.write().insert(name.to_string(), table);
    }

    /// Append a row given in column order.
    pub fn insert_row(&self, table: &str, values: Vec<FilterValue>) -> QueryResult<()> {
        let mut tables = self.tables.write();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| QueryError::unknown_table(table))?;
        if values.len() != target.columns.len() {
            return Err(QueryError::database(format!(
                "table {} has {} columns, row has {}",
                table,
                target.columns.len(),
                values.len()
            )));
        }
        target.rows.push(values);
        Ok(())
    }

    /// Append rows given as a JSON array of objects. Missing columns are null;
    /// unknown keys are an error.
    pub fn insert_json(&self, table: &str, rows: serde_json::Value) -> QueryResult<()> {
        let serde_json::Value::Array(rows) = rows else {
            return Err(QueryError::database("expected a JSON array of rows"));
        };
        let mut tables = self.tables.write();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| QueryError::unknown_table(table))?;

        for row in rows {
            let serde_json::Value::Object(mut object) = row else {
                return Err(QueryError::database("expected a JSON object per row"));
            };
            let values = target
                .columns
                .iter()
                .map(|column| object.remove(column).map_or(FilterValue::Null, FilterValue::from))
                .collect();
            if let Some(key) = object.keys().next() {
                return Err(QueryError::unknown_column(format!("{}.{}", table, key)));
            }
            target.rows.push(values);
        }
        Ok(())
    }

    /// Make every query reading `table` fail.
    pub fn fail_on(&self, table: &str) {
        self.failing.write().insert(table.to_string());
    }

    /// Every statement executed so far, rendered as SQL.
    pub fn executed(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Number of statements executed so far.
    pub fn query_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Forget the executed statements.
    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// Evaluate a query synchronously, without logging it.
    pub fn run(&self, query: &RelationQuery) -> QueryResult<Vec<Row>> {
        let result = self.evaluate(query)?;
        Ok(result
            .rows
            .into_iter()
            .map(|values| result.columns.iter().cloned().zip(values).collect())
            .collect())
    }

    fn evaluate(&self, query: &RelationQuery) -> QueryResult<Relation> {
        let mut sources = vec![self.source(&query.table, &query.alias)?];
        let mut tuples: Vec<Tuple> = (0..sources[0].rows.len()).map(|i| vec![Some(i)]).collect();

        for join in &query.joins {
            let source = match &join.source {
                JoinSource::Table(table) => self.source(table, &join.alias)?,
                JoinSource::Subquery(subquery) => {
                    let relation = self.evaluate(subquery)?;
                    Source {
                        alias: join.alias.clone(),
                        table: join.alias.clone(),
                        columns: relation.columns,
                        rows: relation.rows,
                    }
                }
            };
            sources.push(source);

            let scope = Scope { sources: &sources };
            let on = join
                .on
                .iter()
                .map(|(left, right)| Ok((scope.resolve(left)?, scope.resolve(right)?)))
                .collect::<QueryResult<Vec<_>>>()?;

            let joined = sources.len() - 1;
            let mut next = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                let mut matched = false;
                for candidate in 0..sources[joined].rows.len() {
                    let mut extended = tuple.clone();
                    extended.push(Some(candidate));
                    let equal = on.iter().all(|(left, right)| {
                        scope.value(&extended, *left).sql_eq(scope.value(&extended, *right))
                    });
                    if equal {
                        matched = true;
                        next.push(extended);
                    }
                }
                if !matched && join.kind == JoinKind::Left {
                    let mut extended = tuple;
                    extended.push(None);
                    next.push(extended);
                }
            }
            tuples = next;
        }

        let scope = Scope { sources: &sources };

        let mut kept = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if scope.eval(&query.filter, &tuple)? == Some(true) {
                kept.push(tuple);
            }
        }

        if !query.order_by.is_empty() {
            let keys = query
                .order_by
                .iter()
                .map(|field| Ok((scope.resolve(&field.column_ref())?, field)))
                .collect::<QueryResult<Vec<_>>>()?;
            kept.sort_by(|a, b| {
                for (position, field) in &keys {
                    let ordering = compare_for_sort(
                        scope.value(a, *position),
                        scope.value(b, *position),
                        field.effective_nulls(),
                    );
                    let ordering = match field.order {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => match (
                            scope.value(a, *position).is_null(),
                            scope.value(b, *position).is_null(),
                        ) {
                            (false, false) => ordering.reverse(),
                            _ => ordering,
                        },
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let projection = scope.projection(&query.selects)?;
        let columns: Vec<String> = projection.iter().map(|(name, _)| name.clone()).collect();
        let mut rows: Vec<Vec<FilterValue>> = kept
            .iter()
            .map(|tuple| {
                projection
                    .iter()
                    .map(|(_, position)| scope.value(tuple, *position).clone())
                    .collect()
            })
            .collect();

        if query.distinct {
            let mut seen = HashSet::new();
            rows.retain(|row| {
                let mut key = String::new();
                for value in row {
                    value.encode_key(&mut key);
                }
                seen.insert(key)
            });
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let rows: Vec<_> = rows
            .into_iter()
            .skip(offset)
            .take(query.limit.map_or(usize::MAX, |limit| limit as usize))
            .collect();

        Ok(Relation { columns, rows })
    }

    fn source(&self, table: &str, alias: &str) -> QueryResult<Source> {
        if self.failing.read().contains(table) {
            return Err(QueryError::database(format!("failed to read table {}", table)));
        }
        let tables = self.tables.read();
        let found = tables
            .get(table)
            .ok_or_else(|| QueryError::unknown_table(table))?;
        Ok(Source {
            alias: alias.to_string(),
            table: table.to_string(),
            columns: found.columns.clone(),
            rows: found.rows.clone(),
        })
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn fetch(&self, query: &RelationQuery) -> QueryResult<Vec<Row>> {
        let (sql, params) = query.to_sql(self.db_type);
        debug!(sql = %sql, params = params.len(), "executing query");
        self.log.lock().push(sql.clone());

        // Let sibling fetches interleave the way they would against a server.
        tokio::task::yield_now().await;

        self.run(query).map_err(|e| e.with_sql(sql))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct Relation {
    columns: Vec<String>,
    rows: Vec<Vec<FilterValue>>,
}

struct Source {
    alias: String,
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<FilterValue>>,
}

/// One row index per source; `None` is the null-extended side of a LEFT JOIN.
type Tuple = Vec<Option<usize>>;

/// (source index, column index)
type Position = (usize, usize);

static NULL: FilterValue = FilterValue::Null;

struct Scope<'a> {
    sources: &'a [Source],
}

impl Scope<'_> {
    fn resolve(&self, column: &ColumnRef) -> QueryResult<Position> {
        let found = match &column.table {
            Some(qualifier) => self
                .sources
                .iter()
                .position(|s| s.alias == *qualifier)
                .or_else(|| self.sources.iter().position(|s| s.table == *qualifier))
                .and_then(|index| {
                    self.sources[index]
                        .columns
                        .iter()
                        .position(|c| *c == column.column)
                        .map(|c| (index, c))
                }),
            None => self.sources.iter().enumerate().find_map(|(index, source)| {
                source
                    .columns
                    .iter()
                    .position(|c| *c == column.column)
                    .map(|c| (index, c))
            }),
        };
        found.ok_or_else(|| QueryError::unknown_column(column.to_string()))
    }

    fn value<'t>(&'t self, tuple: &Tuple, (source, column): Position) -> &'t FilterValue {
        match tuple.get(source).copied().flatten() {
            Some(row) => &self.sources[source].rows[row][column],
            None => &NULL,
        }
    }

    fn lookup(&self, tuple: &Tuple, column: &str) -> QueryResult<&FilterValue> {
        let position = self.resolve(&ColumnRef::parse(column))?;
        Ok(self.value(tuple, position))
    }

    /// Three-valued evaluation: `None` is SQL's unknown.
    fn eval(&self, filter: &Filter, tuple: &Tuple) -> QueryResult<Option<bool>> {
        let compare = |column: &str,
                       value: &FilterValue,
                       test: fn(Ordering) -> bool|
         -> QueryResult<Option<bool>> {
            let current = self.lookup(tuple, column)?;
            if current.is_null() || value.is_null() {
                return Ok(None);
            }
            Ok(Some(current.compare(value).is_some_and(test)))
        };

        Ok(match filter {
            Filter::None => Some(true),
            Filter::Equals(column, value) if value.is_null() => {
                Some(self.lookup(tuple, column)?.is_null())
            }
            Filter::NotEquals(column, value) if value.is_null() => {
                Some(!self.lookup(tuple, column)?.is_null())
            }
            Filter::Equals(column, value) => compare(column, value, Ordering::is_eq)?,
            Filter::NotEquals(column, value) => compare(column, value, Ordering::is_ne)?,
            Filter::Lt(column, value) => compare(column, value, Ordering::is_lt)?,
            Filter::Lte(column, value) => compare(column, value, Ordering::is_le)?,
            Filter::Gt(column, value) => compare(column, value, Ordering::is_gt)?,
            Filter::Gte(column, value) => compare(column, value, Ordering::is_ge)?,
            Filter::In(column, values) => in_list(self.lookup(tuple, column)?, values),
            Filter::NotIn(column, values) => {
                in_list(self.lookup(tuple, column)?, values).map(|found| !found)
            }
            Filter::Contains(column, value) => {
                like(self.lookup(tuple, column)?, value, |s, p| s.contains(p))
            }
            Filter::StartsWith(column, value) => {
                like(self.lookup(tuple, column)?, value, |s, p| s.starts_with(p))
            }
            Filter::EndsWith(column, value) => {
                like(self.lookup(tuple, column)?, value, |s, p| s.ends_with(p))
            }
            Filter::IsNull(column) => Some(self.lookup(tuple, column)?.is_null()),
            Filter::IsNotNull(column) => Some(!self.lookup(tuple, column)?.is_null()),
            Filter::And(filters) => {
                let mut result = Some(true);
                for filter in filters {
                    match self.eval(filter, tuple)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Filter::Or(filters) => {
                let mut result = Some(false);
                for filter in filters {
                    match self.eval(filter, tuple)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            Filter::Not(filter) => self.eval(filter, tuple)?.map(|value| !value),
        })
    }

    /// Output columns of a SELECT list with the position each reads from.
    fn projection(&self, selects: &[Selection]) -> QueryResult<Vec<(String, Position)>> {
        let mut columns: IndexMap<String, Position> = IndexMap::new();
        let all_from = |columns: &mut IndexMap<String, Position>, index: usize| {
            for (c, name) in self.sources[index].columns.iter().enumerate() {
                columns.entry(name.clone()).or_insert((index, c));
            }
        };

        if selects.is_empty() {
            all_from(&mut columns, 0);
        }
        for selection in selects {
            match selection {
                Selection::All => {
                    for index in 0..self.sources.len() {
                        all_from(&mut columns, index);
                    }
                }
                Selection::AllFrom(qualifier) => {
                    let index = self
                        .sources
                        .iter()
                        .position(|s| s.alias == *qualifier || s.table == *qualifier)
                        .ok_or_else(|| QueryError::unknown_table(qualifier.clone()))?;
                    all_from(&mut columns, index);
                }
                Selection::Column { column, .. } => {
                    let position = self.resolve(column)?;
                    let name = selection.output_name().unwrap_or(&column.column);
                    columns.insert(name.to_string(), position);
                }
            }
        }
        Ok(columns.into_iter().collect())
    }
}

fn in_list(value: &FilterValue, values: &[FilterValue]) -> Option<bool> {
    if value.is_null() {
        return None;
    }
    if values.iter().any(|candidate| value.sql_eq(candidate)) {
        Some(true)
    } else if values.iter().any(FilterValue::is_null) {
        None
    } else {
        Some(false)
    }
}

fn like(value: &FilterValue, pattern: &FilterValue, test: fn(&str, &str) -> bool) -> Option<bool> {
    match (value, pattern) {
        (FilterValue::Null, _) | (_, FilterValue::Null) => None,
        (FilterValue::String(s), FilterValue::String(p)) => Some(test(s, p)),
        _ => Some(false),
    }
}

/// Ascending comparison with nulls placed per `nulls`.
fn compare_for_sort(a: &FilterValue, b: &FilterValue, nulls: NullsOrder) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => match nulls {
            NullsOrder::First => Ordering::Less,
            NullsOrder::Last => Ordering::Greater,
        },
        (false, true) => match nulls {
            NullsOrder::First => Ordering::Greater,
            NullsOrder::Last => Ordering::Less,
        },
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}
