//! The join algorithm: the whole expression in one query.
//!
//! Every relation becomes a LEFT JOIN named after its path, and every column
//! is selected under `<table alias>:<column>`. Relations whose query is
//! modified join a subquery instead of the table. The flat rows are split back
//! into records by [`split_rows`].
//!
//! Generated identifiers can outgrow what the database accepts. They are
//! checked against `max_identifier_length` unless `minimize` replaces them
//! with short opaque names.

use tracing::debug;

use super::keys::KeySelection;
use super::plan::{FetchPlan, FetchStep};
use super::reconcile::{JoinNode, split_rows};
use super::record::Record;
use super::spec::ModelSpec;
use crate::config::EagerOptions;
use crate::error::{QueryError, QueryResult};
use crate::query::{JoinClause, RelationQuery, Selection};
use crate::sql::ColumnRef;
use crate::traits::QueryExecutor;

/// A table in the joined query: its alias and where its columns appear.
struct JoinTarget {
    alias: String,
    keys: KeySelection,
}

struct JoinBuilder<'a> {
    options: &'a EagerOptions,
}

impl JoinBuilder<'_> {
    fn check(&self, identifier: &str, step: &FetchStep) -> QueryResult<()> {
        if !self.options.minimize && identifier.chars().count() > self.options.max_identifier_length {
            return Err(QueryError::identifier_too_long(identifier, self.options.max_identifier_length)
                .with_path(step.path.to_string()));
        }
        Ok(())
    }

    fn table_alias(&self, step: &FetchStep) -> String {
        if self.options.minimize {
            return format!("_t{}", step.index);
        }
        step.path
            .segments()
            .iter()
            .map(|segment| {
                self.options
                    .aliases
                    .get(segment.as_str())
                    .map(String::as_str)
                    .unwrap_or(segment.as_str())
            })
            .collect::<Vec<_>>()
            .join(":")
    }

    fn join_table_alias(&self, step: &FetchStep, table_alias: &str) -> String {
        if self.options.minimize {
            format!("_t{}_j", step.index)
        } else {
            format!("{}_join", table_alias)
        }
    }

    fn column_alias(&self, step: &FetchStep, table_alias: &str, position: usize, field: &str) -> String {
        if self.options.minimize {
            format!("_t{}_c{}", step.index, position)
        } else {
            format!("{}:{}", table_alias, field)
        }
    }

    /// Join `step` onto `query` below `parent`, returning how to read it back.
    fn join_step(
        &self,
        query: &mut RelationQuery,
        step: &FetchStep,
        parent: &JoinTarget,
    ) -> QueryResult<(JoinTarget, JoinNode)> {
        let node = &step.node;
        let relation = &node.relation;
        let model = &node.model;

        let alias = self.table_alias(step);
        self.check(&alias, step)?;

        let mut needed: Vec<&str> = relation.related_columns.iter().map(String::as_str).collect();
        needed.extend(node.children.iter().flat_map(|c| c.relation.owner_columns.iter().map(String::as_str)));
        needed.extend(model.id_columns.iter().map(String::as_str));

        let (source, keys, fields, narrowed) = if node.mutators.is_empty() {
            (None, KeySelection::identity(), model.columns.clone(), false)
        } else {
            let mut subquery = RelationQuery::from_table(&model.table);
            for mutator in &node.mutators {
                mutator(&mut subquery);
            }
            let narrowed = subquery.has_explicit_select();
            let keys = KeySelection::ensure(&mut subquery, needed.iter().copied());
            let fields = output_fields(&subquery, model);
            (Some(subquery), keys, fields, narrowed)
        };

        let related_on = |column: &str| ColumnRef::new(alias.as_str(), keys.field(column));
        let parent_on = |column: &str| ColumnRef::new(parent.alias.as_str(), parent.keys.field(column));

        let mut extras = Vec::new();
        match &relation.join_table {
            None => {
                let mut join = join_source(source, &model.table, &alias);
                for (owner, related) in relation.owner_columns.iter().zip(&relation.related_columns) {
                    join = join.on(parent_on(owner), related_on(related));
                }
                query.join(join);
            }
            Some(join_table) => {
                let jt_alias = self.join_table_alias(step, &alias);
                self.check(&jt_alias, step)?;

                let mut through = JoinClause::left(&join_table.table, &jt_alias);
                for (owner, jt_column) in relation.owner_columns.iter().zip(&join_table.owner_columns) {
                    through = through.on(parent_on(owner), ColumnRef::new(jt_alias.as_str(), jt_column.as_str()));
                }
                query.join(through);

                let mut join = join_source(source, &model.table, &alias);
                for (jt_column, related) in join_table.related_columns.iter().zip(&relation.related_columns) {
                    join = join.on(ColumnRef::new(jt_alias.as_str(), jt_column.as_str()), related_on(related));
                }
                query.join(join);

                if !narrowed {
                    extras.extend(
                        join_table
                            .extras
                            .iter()
                            .map(|extra| (ColumnRef::new(jt_alias.as_str(), extra.column.as_str()), extra.alias.clone())),
                    );
                }
            }
        }

        let mut split = JoinNode {
            key: node.key.to_string(),
            is_many: node.is_many(),
            strip: keys.injected().to_vec(),
            ..JoinNode::default()
        };
        let own_fields = fields.len();
        let columns = fields
            .into_iter()
            .map(|field| (ColumnRef::new(alias.as_str(), field.as_str()), field))
            .chain(extras);
        for (position, (column, field)) in columns.enumerate() {
            let column_alias = self.column_alias(step, &alias, position, &field);
            self.check(&column_alias, step)?;
            query.column(Selection::aliased(column, &column_alias));
            if position >= own_fields {
                split.extra_columns.push(column_alias.clone());
            }
            split.columns.push((field, column_alias));
        }
        split.id_columns = model
            .id_columns
            .iter()
            .filter_map(|id| {
                let field = keys.field(id);
                split.columns.iter().find(|(f, _)| f == field).map(|(_, c)| c.clone())
            })
            .collect();

        Ok((JoinTarget { alias, keys }, split))
    }
}

fn join_source(subquery: Option<RelationQuery>, table: &str, alias: &str) -> JoinClause {
    match subquery {
        Some(subquery) => JoinClause::subquery(subquery, alias),
        None => JoinClause::left(table, alias),
    }
}

/// Output field names of `query` over `model`.
fn output_fields(query: &RelationQuery, model: &ModelSpec) -> Vec<String> {
    if query.selects.is_empty() {
        return model.columns.clone();
    }
    let mut fields: Vec<String> = Vec::new();
    for selection in &query.selects {
        let names = match selection {
            Selection::All | Selection::AllFrom(_) => model.columns.clone(),
            _ => selection.output_name().map(str::to_string).into_iter().collect(),
        };
        for name in names {
            if !fields.contains(&name) {
                fields.push(name);
            }
        }
    }
    fields
}

/// Build the joined query for `plan` over `root`.
///
/// Returns the query and the split tree for its rows.
pub(crate) fn build(
    mut root: RelationQuery,
    model: &ModelSpec,
    plan: &FetchPlan,
    options: &EagerOptions,
) -> QueryResult<(RelationQuery, JoinNode)> {
    let builder = JoinBuilder { options };

    let root_keys = if root.has_explicit_select() {
        let mut needed: Vec<&str> = model.id_columns.iter().map(String::as_str).collect();
        needed.extend(plan.root_key_columns());
        KeySelection::ensure(&mut root, needed)
    } else {
        for column in &model.columns {
            root.column(Selection::column(ColumnRef::new(root.alias.clone(), column.as_str())));
        }
        KeySelection::identity()
    };

    let fields = output_fields(&root, model);
    let mut split_root = JoinNode {
        columns: fields.iter().map(|f| (f.clone(), f.clone())).collect(),
        id_columns: model.id_columns.iter().map(|id| root_keys.field(id).to_string()).collect(),
        strip: root_keys.injected().to_vec(),
        ..JoinNode::default()
    };

    let mut targets: Vec<JoinTarget> = Vec::with_capacity(plan.len());
    let mut splits: Vec<(Option<usize>, JoinNode)> = Vec::with_capacity(plan.len());
    let root_target = JoinTarget {
        alias: root.alias.clone(),
        keys: root_keys,
    };
    for step in &plan.steps {
        let parent = match step.parent {
            Some(parent) => &targets[parent],
            None => &root_target,
        };
        let (target, split) = builder.join_step(&mut root, step, parent)?;
        targets.push(target);
        splits.push((step.parent, split));
    }

    // Steps are depth-first, so every child follows its parent.
    while let Some((parent, split)) = splits.pop() {
        match parent {
            Some(parent) => splits[parent].1.children.insert(0, split),
            None => split_root.children.insert(0, split),
        }
    }

    Ok((root, split_root))
}

/// Run `plan` as one joined query over `root`.
pub(crate) async fn load(
    executor: &dyn QueryExecutor,
    root: RelationQuery,
    model: &ModelSpec,
    plan: &FetchPlan,
    options: &EagerOptions,
) -> QueryResult<Vec<Record>> {
    let (query, split) = build(root, model, plan, options)?;
    debug!(joins = query.joins.len(), steps = plan.len(), "fetching joined query");
    let rows = executor.fetch(&query).await?;
    Ok(split_rows(&split, &rows, options.strip_injected_columns))
}
