//! The public entry point: eager queries over a model.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use graft_expr::{ExprError, RelationExpr, RelationPath, parse_expression};
use tracing::{debug, info_span, Instrument};

use super::fetch::{LoadContext, LoadedSet};
use super::join;
use super::keys::{KeySelection, RowKey};
use super::modifiers::{EagerModifiers, FilterMap};
use super::naive;
use super::plan::FetchPlan;
use super::record::{Field, Record};
use super::resolve::{Resolver, bound_recursion};
use super::spec::{ModelSpec, RelationMetadata};
use super::where_in;
use crate::config::{EagerAlgorithm, EagerConfig, EagerOptions};
use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, FilterValue};
use crate::query::{RelationQuery, Selection};
use crate::traits::{QueryExecutor, QueryMutator, mutator};
use crate::types::SortOrder;

/// Loads records together with the relations named by an eager expression.
///
/// ```rust
/// use graft_query::prelude::*;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> QueryResult<()> {
/// let db = MemoryExecutor::new();
/// db.create_table("people", ["id", "parentId"]);
/// db.insert_json("people", json!([{ "id": 1, "parentId": 2 }, { "id": 2 }]))?;
///
/// let catalog = Catalog::new().with_model(
///     ModelSpec::new("Person", "people")
///         .columns(["id", "parentId"])
///         .relation(RelationSpec::many_to_one("parent", "Person").join_on(["parentId"], ["id"])),
/// );
///
/// let loader = RelationLoader::new(db, catalog);
/// let people = loader.query("Person").where_eq("id", 1).eager("parent").exec().await?;
/// assert_eq!(people[0].to_json(), json!({ "id": 1, "parentId": 2, "parent": { "id": 2, "parentId": null } }));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RelationLoader {
    executor: Arc<dyn QueryExecutor>,
    metadata: Arc<dyn RelationMetadata>,
}

impl RelationLoader {
    /// Create a loader over an executor and a metadata source.
    pub fn new(executor: impl QueryExecutor + 'static, metadata: impl RelationMetadata + 'static) -> Self {
        Self::from_shared(Arc::new(executor), Arc::new(metadata))
    }

    /// Create a loader from shared collaborators.
    pub fn from_shared(executor: Arc<dyn QueryExecutor>, metadata: Arc<dyn RelationMetadata>) -> Self {
        Self { executor, metadata }
    }

    /// The executor queries are sent to.
    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    /// The metadata source.
    pub fn metadata(&self) -> &Arc<dyn RelationMetadata> {
        &self.metadata
    }

    /// Start a query over `model`.
    pub fn query(&self, model: impl Into<String>) -> EagerQuery<'_> {
        EagerQuery {
            loader: self,
            model: model.into(),
            root: Vec::new(),
            expression: None,
            modifiers: EagerModifiers::new(),
            algorithm: None,
            options: None,
        }
    }

    /// Load the relations of `expression` onto records already loaded.
    ///
    /// The records must carry the key columns the expression's relations use.
    pub async fn load_related(
        &self,
        model: impl Into<String>,
        records: Vec<Record>,
        expression: &str,
    ) -> QueryResult<Vec<Record>> {
        self.query(model).eager(expression).load(records).await
    }
}

impl fmt::Debug for RelationLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationLoader")
            .field("executor", &self.executor.name())
            .finish_non_exhaustive()
    }
}

/// A query over one model with an eager expression and its modifiers.
pub struct EagerQuery<'a> {
    loader: &'a RelationLoader,
    model: String,
    root: Vec<QueryMutator>,
    expression: Option<String>,
    modifiers: EagerModifiers,
    algorithm: Option<EagerAlgorithm>,
    options: Option<EagerOptions>,
}

/// Everything resolved before the first query runs.
struct Prepared<'m> {
    model: Arc<ModelSpec>,
    config: EagerConfig,
    tree: RelationExpr,
    resolver: Resolver<'m>,
    plan: FetchPlan,
}

impl<'a> EagerQuery<'a> {
    /// Adjust the root query.
    pub fn modify<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut RelationQuery) + Send + Sync + 'static,
    {
        self.root.push(mutator(f));
        self
    }

    /// Filter roots by column equality.
    pub fn where_eq(self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        let column = column.into();
        let value = value.into();
        self.modify(move |q| {
            q.where_eq(column.clone(), value.clone());
        })
    }

    /// Filter roots.
    pub fn filter(self, filter: Filter) -> Self {
        self.modify(move |q| {
            q.filter(filter.clone());
        })
    }

    /// Narrow the root SELECT list.
    pub fn select<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Selection>,
    {
        let columns: Vec<Selection> = columns.into_iter().map(Into::into).collect();
        self.modify(move |q| {
            q.select(columns.clone());
        })
    }

    /// Order roots.
    pub fn order_by(self, column: impl Into<String>, order: SortOrder) -> Self {
        let column = column.into();
        self.modify(move |q| {
            q.order_by(column.clone(), order);
        })
    }

    /// Set the eager expression, replacing any previous one.
    pub fn eager(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Supply named filters for the expression.
    pub fn with_filters(mut self, filters: FilterMap) -> Self {
        self.modifiers.add_filters(filters);
        self
    }

    /// Adjust the query of the relation at `path`.
    pub fn modify_eager<F>(mut self, path: &str, f: F) -> Self
    where
        F: Fn(&mut RelationQuery) + Send + Sync + 'static,
    {
        self.modifiers.add_path_mutator(RelationPath::parse(path), mutator(f));
        self
    }

    /// Filter the relation at `path`. Same as [`EagerQuery::modify_eager`].
    pub fn filter_eager<F>(self, path: &str, f: F) -> Self
    where
        F: Fn(&mut RelationQuery) + Send + Sync + 'static,
    {
        self.modify_eager(path, f)
    }

    /// Merge another expression into the eager expression.
    pub fn merge_eager(mut self, expression: impl Into<String>) -> Self {
        self.modifiers.add_merge(expression, None);
        self
    }

    /// Merge another expression together with the filters it names.
    pub fn merge_eager_with(mut self, expression: impl Into<String>, filters: FilterMap) -> Self {
        self.modifiers.add_merge(expression, Some(filters));
        self
    }

    /// Use `algorithm` instead of the model default.
    pub fn algorithm(mut self, algorithm: EagerAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Use `options` instead of the model default.
    pub fn options(mut self, options: EagerOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Use both halves of `config` instead of the model default.
    pub fn config(self, config: EagerConfig) -> Self {
        self.algorithm(config.algorithm).options(config.options)
    }

    /// The merged eager expression this query would load.
    pub fn expression(&self) -> QueryResult<RelationExpr> {
        let base = match &self.expression {
            Some(expression) => parse_expression(expression)?,
            None => RelationExpr::root(),
        };
        self.modifiers.apply_merges(base)
    }

    /// The fetch plan this query would run, without running it.
    ///
    /// Recursive relations appear once; further levels are planned as data
    /// arrives.
    pub fn explain(&self) -> QueryResult<FetchPlan> {
        Ok(self.prepare()?.plan)
    }

    fn prepare(&self) -> QueryResult<Prepared<'_>> {
        let metadata = self.loader.metadata.as_ref();
        let model = metadata
            .model(&self.model)
            .ok_or_else(|| QueryError::unknown_model(&self.model))?;
        let config = EagerConfig::resolve(self.algorithm, self.options.as_ref(), model.default_eager.as_ref());
        config.options.validate()?;

        let mut tree = self.expression()?;
        let resolver = Resolver::new(metadata, &self.modifiers, &tree)?;
        if config.algorithm == EagerAlgorithm::Join {
            tree = tree.expanded(None).map_err(|e| match e {
                ExprError::UnboundedRecursion { path, .. } => QueryError::recursion_too_deep(tree.to_string(), path),
                other => QueryError::from(other),
            })?;
        } else if let Some(depth) = config.options.max_recursion_depth {
            bound_recursion(&mut tree, depth);
        }

        let nodes = resolver.resolve_root(&model, &tree)?;
        let plan = FetchPlan::build(config.algorithm, &nodes);
        debug!(model = %model.name, expression = %tree, algorithm = %config.algorithm, steps = plan.len(), "planned eager load");

        Ok(Prepared {
            model,
            config,
            tree,
            resolver,
            plan,
        })
    }

    fn root_query(&self, model: &ModelSpec) -> RelationQuery {
        let mut query = RelationQuery::from_table(&model.table);
        for mutator in &self.root {
            mutator(&mut query);
        }
        query
    }

    /// Run the query and load its relations.
    pub async fn exec(self) -> QueryResult<Vec<Record>> {
        let span = info_span!("eager", model = %self.model);
        async {
            let prepared = self.prepare()?;
            let root = self.root_query(&prepared.model);
            match prepared.config.algorithm {
                EagerAlgorithm::Join => {
                    join::load(
                        self.loader.executor.as_ref(),
                        root,
                        &prepared.model,
                        &prepared.plan,
                        &prepared.config.options,
                    )
                    .await
                }
                EagerAlgorithm::Naive | EagerAlgorithm::WhereIn => {
                    let mut root = root;
                    let keys = KeySelection::ensure(&mut root, prepared.plan.root_key_columns());
                    let rows = self.loader.executor.fetch(&root).await?;
                    let records = rows.into_iter().map(Record::from_row).collect();
                    self.load_separately(prepared, LoadedSet::roots(records, keys)).await
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Load the relations onto `records` instead of querying roots.
    ///
    /// Root filters, selection and ordering do not apply.
    pub async fn load(self, records: Vec<Record>) -> QueryResult<Vec<Record>> {
        let span = info_span!("eager_load", model = %self.model, records = records.len());
        async {
            let prepared = self.prepare()?;
            match prepared.config.algorithm {
                EagerAlgorithm::Join => self.load_joined(prepared, records).await,
                EagerAlgorithm::Naive | EagerAlgorithm::WhereIn => {
                    self.load_separately(prepared, LoadedSet::roots(records, KeySelection::identity()))
                        .await
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn load_separately(&self, mut prepared: Prepared<'_>, mut roots: LoadedSet) -> QueryResult<Vec<Record>> {
        if !prepared.plan.is_empty() {
            let ctx = LoadContext {
                executor: self.loader.executor.as_ref(),
                resolver: &prepared.resolver,
                options: &prepared.config.options,
            };
            match prepared.config.algorithm {
                EagerAlgorithm::Naive => naive::load(&ctx, &mut prepared.plan, &mut roots).await?,
                _ => where_in::load(&ctx, &mut prepared.plan, &mut roots).await?,
            }
        } else {
            roots.strip(prepared.config.options.strip_injected_columns);
        }
        Ok(roots.records)
    }

    async fn load_joined(&self, prepared: Prepared<'_>, mut records: Vec<Record>) -> QueryResult<Vec<Record>> {
        let model = &prepared.model;
        let ids = KeySelection::identity();

        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for record in &records {
            let values = ids.values(record, &model.id_columns);
            if RowKey::new(&values).is_some_and(|key| seen.insert(key)) {
                keys.push(values.into_vec());
            }
        }
        if keys.is_empty() {
            return Ok(records);
        }

        let mut root = RelationQuery::from_table(&model.table);
        let columns: Vec<String> = model
            .id_columns
            .iter()
            .map(|column| format!("{}.{}", root.alias, column))
            .collect();
        root.filter(Filter::key_in(&columns, &keys));
        let loaded = join::load(
            self.loader.executor.as_ref(),
            root,
            model,
            &prepared.plan,
            &prepared.config.options,
        )
        .await?;

        let by_id: HashMap<RowKey, &Record> = loaded
            .iter()
            .filter_map(|record| Some((ids.key(record, &model.id_columns)?, record)))
            .collect();
        for record in &mut records {
            let source = ids.key(record, &model.id_columns).and_then(|id| by_id.get(&id).copied());
            for step in prepared.plan.root_steps() {
                let field = source
                    .and_then(|source| source.get(step.key()))
                    .cloned()
                    .unwrap_or_else(|| empty_relation(step.is_many()));
                record.set(step.key(), field);
            }
        }
        debug!(expression = %prepared.tree, records = records.len(), "grafted joined relations");
        Ok(records)
    }
}

fn empty_relation(many: bool) -> Field {
    if many { Field::Many(Vec::new()) } else { Field::One(None) }
}

impl fmt::Debug for EagerQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerQuery")
            .field("model", &self.model)
            .field("expression", &self.expression)
            .field("modifiers", &self.modifiers)
            .field("algorithm", &self.algorithm)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
