//! Relation queries shared by the naive and where-in algorithms.

use indexmap::IndexSet;
use tracing::{debug, warn};

use super::keys::{KeySelection, KeyValues, RowKey};
use super::plan::FetchStep;
use super::record::Record;
use super::resolve::{EagerNode, Resolver};
use crate::config::EagerOptions;
use crate::error::QueryResult;
use crate::filter::{Filter, FilterValue};
use crate::query::{JoinClause, RelationQuery, Selection};
use crate::sql::ColumnRef;
use crate::traits::QueryExecutor;

/// Prefix of the fields carrying owner keys read from a join table.
pub(crate) const OWNER_FIELD_PREFIX: &str = "__graft_owner_";

/// What a running load needs from its caller.
pub(crate) struct LoadContext<'a> {
    pub executor: &'a dyn QueryExecutor,
    pub resolver: &'a Resolver<'a>,
    pub options: &'a EagerOptions,
}

/// Records fetched for one step (or the roots), with the key of the owner each
/// record belongs to.
#[derive(Debug, Default)]
pub(crate) struct LoadedSet {
    pub records: Vec<Record>,
    pub owners: Vec<Option<RowKey>>,
    pub keys: KeySelection,
    internal: Vec<String>,
}

impl LoadedSet {
    /// Root records, which belong to no owner.
    pub fn roots(records: Vec<Record>, keys: KeySelection) -> Self {
        Self {
            owners: vec![None; records.len()],
            records,
            keys,
            internal: Vec::new(),
        }
    }

    /// Key values of `columns` per record.
    pub fn record_keys(&self, columns: &[String]) -> Vec<KeyValues> {
        self.records
            .iter()
            .map(|record| self.keys.values(record, columns))
            .collect()
    }

    /// Distinct non-null key values of `columns`, in first-seen order.
    pub fn distinct_keys(&self, columns: &[String]) -> Vec<Vec<FilterValue>> {
        let mut seen = IndexSet::new();
        let mut keys = Vec::new();
        for values in self.record_keys(columns) {
            if let Some(key) = RowKey::new(&values) {
                if seen.insert(key) {
                    keys.push(values.into_vec());
                }
            }
        }
        keys
    }

    /// Append the records of another fetch of the same step.
    pub fn extend(&mut self, other: LoadedSet) {
        if self.records.is_empty() {
            self.keys = other.keys;
            self.internal = other.internal;
        }
        self.records.extend(other.records);
        self.owners.extend(other.owners);
    }

    /// Remove loader-added fields from the records.
    pub fn strip(&mut self, injected: bool) {
        let mut fields: Vec<&str> = self.internal.iter().map(String::as_str).collect();
        if injected {
            fields.extend(self.keys.injected().iter().map(String::as_str));
        }
        if fields.is_empty() {
            return;
        }
        let mut missing = 0usize;
        for record in &mut self.records {
            for field in &fields {
                if record.remove(field).is_none() {
                    missing += 1;
                }
            }
        }
        if missing > 0 {
            warn!(missing, fields = ?fields, "loader-added fields absent from fetched records");
        }
    }
}

/// Build the query fetching `node` for owners with the given key values.
///
/// Returns the query, the key selection of its output and the fields holding
/// the owner key of each row.
pub(crate) fn relation_query(node: &EagerNode, keys: &[Vec<FilterValue>]) -> (RelationQuery, KeySelection, Vec<String>) {
    let relation = &node.relation;
    let mut query = RelationQuery::from_table(&node.model.table);
    for mutator in &node.mutators {
        mutator(&mut query);
    }
    let narrowed = query.has_explicit_select();
    let alias = query.alias.clone();

    match &relation.join_table {
        None => {
            let mut needed: Vec<&str> = relation.related_columns.iter().map(String::as_str).collect();
            needed.extend(node.child_owner_columns());
            let selection = KeySelection::ensure(&mut query, needed);

            let columns: Vec<String> = relation
                .related_columns
                .iter()
                .map(|column| ColumnRef::new(alias.as_str(), column.as_str()).to_string())
                .collect();
            query.filter(Filter::key_in(&columns, keys));

            let owner_fields = relation
                .related_columns
                .iter()
                .map(|column| selection.field(column).to_string())
                .collect();
            (query, selection, owner_fields)
        }
        Some(join_table) => {
            let selection = KeySelection::ensure(&mut query, node.child_owner_columns());
            let jt = join_table.table.clone();

            let mut join = JoinClause::inner(&jt, &jt);
            for (jt_column, column) in join_table.related_columns.iter().zip(&relation.related_columns) {
                join = join.on(ColumnRef::new(&jt, jt_column), ColumnRef::new(&alias, column));
            }
            query.join(join);

            if !narrowed {
                query.selects.insert(0, Selection::AllFrom(alias.clone()));
                for extra in &join_table.extras {
                    query.column(Selection::aliased(ColumnRef::new(&jt, &extra.column), &extra.alias));
                }
            }

            let mut owner_fields = Vec::with_capacity(join_table.owner_columns.len());
            for (i, column) in join_table.owner_columns.iter().enumerate() {
                let field = format!("{}{}", OWNER_FIELD_PREFIX, i);
                query.column(Selection::aliased(ColumnRef::new(&jt, column), &field));
                owner_fields.push(field);
            }

            let columns: Vec<String> = join_table
                .owner_columns
                .iter()
                .map(|column| ColumnRef::new(jt.as_str(), column.as_str()).to_string())
                .collect();
            query.filter(Filter::key_in(&columns, keys));
            (query, selection, owner_fields)
        }
    }
}

/// Fetch the records of `step` for owners with the given key values.
pub(crate) async fn fetch_step(
    ctx: &LoadContext<'_>,
    step: &FetchStep,
    keys: Vec<Vec<FilterValue>>,
) -> QueryResult<LoadedSet> {
    if keys.is_empty() {
        return Ok(LoadedSet::default());
    }

    let (query, selection, owner_fields) = relation_query(&step.node, &keys);
    debug!(
        path = %step.path,
        owners = keys.len(),
        executor = ctx.executor.name(),
        "fetching relation"
    );
    let rows = ctx.executor.fetch(&query).await?;

    let records: Vec<Record> = rows.into_iter().map(Record::from_row).collect();
    let owners = records
        .iter()
        .map(|record| {
            let values: KeyValues = owner_fields
                .iter()
                .map(|field| record.value(field).cloned().unwrap_or(FilterValue::Null))
                .collect();
            RowKey::new(&values)
        })
        .collect();
    let internal = owner_fields
        .into_iter()
        .filter(|field| field.starts_with(OWNER_FIELD_PREFIX))
        .collect();

    Ok(LoadedSet {
        records,
        owners,
        keys: selection,
        internal,
    })
}
