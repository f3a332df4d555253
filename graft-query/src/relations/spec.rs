//! Relation and model metadata.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::modifiers::FilterMap;
use crate::config::EagerConfig;
use crate::error::{QueryError, QueryResult};
use crate::traits::QueryMutator;

/// Type of relation between models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// One-to-one relation (e.g., User has one Profile).
    OneToOne,
    /// One-to-many relation (e.g., User has many Posts).
    OneToMany,
    /// Many-to-one relation (e.g., Post belongs to User).
    ManyToOne,
    /// Many-to-many relation (e.g., Post has many Tags).
    ManyToMany,
}

impl RelationType {
    /// Check if this relation returns multiple records.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// Check if this relation returns a single record.
    pub fn is_one(&self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }
}

/// Specification for a relation between models.
///
/// Direct relations join `owner.owner_columns[i] = related.related_columns[i]`.
/// Relations with a join table join the owner to the join table's
/// `owner_columns`, and the join table's `related_columns` to the related model.
#[derive(Debug, Clone)]
pub struct RelationSpec {
    /// Name of the relation (field name).
    pub name: String,
    /// Type of relation.
    pub relation_type: RelationType,
    /// Name of the related model.
    pub related_model: String,
    /// Key columns on the owning model.
    pub owner_columns: Vec<String>,
    /// Key columns on the related model.
    pub related_columns: Vec<String>,
    /// Join table, for many-to-many and has-one-through relations.
    pub join_table: Option<JoinTableSpec>,
}

impl RelationSpec {
    fn new(name: impl Into<String>, relation_type: RelationType, related_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relation_type,
            related_model: related_model.into(),
            owner_columns: Vec::new(),
            related_columns: Vec::new(),
            join_table: None,
        }
    }

    /// Create a one-to-one relation spec.
    pub fn one_to_one(name: impl Into<String>, related_model: impl Into<String>) -> Self {
        Self::new(name, RelationType::OneToOne, related_model)
    }

    /// Create a one-to-many relation spec.
    pub fn one_to_many(name: impl Into<String>, related_model: impl Into<String>) -> Self {
        Self::new(name, RelationType::OneToMany, related_model)
    }

    /// Create a many-to-one relation spec.
    pub fn many_to_one(name: impl Into<String>, related_model: impl Into<String>) -> Self {
        Self::new(name, RelationType::ManyToOne, related_model)
    }

    /// Create a many-to-many relation spec through `join_table`.
    pub fn many_to_many(
        name: impl Into<String>,
        related_model: impl Into<String>,
        join_table: JoinTableSpec,
    ) -> Self {
        Self::new(name, RelationType::ManyToMany, related_model).through(join_table)
    }

    /// Create a one-to-one relation reached through `join_table`.
    pub fn has_one_through(
        name: impl Into<String>,
        related_model: impl Into<String>,
        join_table: JoinTableSpec,
    ) -> Self {
        Self::new(name, RelationType::OneToOne, related_model).through(join_table)
    }

    /// Set the key columns on both sides.
    pub fn join_on<O, R>(mut self, owner: O, related: R) -> Self
    where
        O: IntoIterator,
        O::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        self.owner_columns = owner.into_iter().map(Into::into).collect();
        self.related_columns = related.into_iter().map(Into::into).collect();
        self
    }

    /// Route the relation through a join table.
    pub fn through(mut self, join_table: JoinTableSpec) -> Self {
        self.join_table = Some(join_table);
        self
    }

    /// Whether the relation returns a list.
    pub fn is_many(&self) -> bool {
        self.relation_type.is_many()
    }

    /// Check the relation against the models it connects.
    pub fn validate(&self, owner: &ModelSpec, related: &ModelSpec) -> QueryResult<()> {
        let invalid = |message: String| QueryError::invalid_relation(&owner.name, &self.name, message);

        if self.owner_columns.is_empty() || self.owner_columns.len() != self.related_columns.len() {
            return Err(invalid(format!(
                "expected matching key columns, got {} owner and {} related",
                self.owner_columns.len(),
                self.related_columns.len()
            )));
        }
        if let Some(column) = self.owner_columns.iter().find(|c| !owner.has_column(c)) {
            return Err(invalid(format!("{} has no column {}", owner.name, column)));
        }
        if let Some(column) = self.related_columns.iter().find(|c| !related.has_column(c)) {
            return Err(invalid(format!("{} has no column {}", related.name, column)));
        }
        if let Some(jt) = &self.join_table {
            if jt.owner_columns.len() != self.owner_columns.len()
                || jt.related_columns.len() != self.related_columns.len()
            {
                return Err(invalid(format!(
                    "join table {} must have one column per key column",
                    jt.table
                )));
            }
        } else if self.relation_type == RelationType::ManyToMany {
            return Err(invalid("many-to-many relations need a join table".to_string()));
        }
        Ok(())
    }
}

/// An extra join table column surfaced on the related record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinExtra {
    /// Column of the join table.
    pub column: String,
    /// Field name on the related record.
    pub alias: String,
}

/// Specification for a join table.
#[derive(Debug, Clone)]
pub struct JoinTableSpec {
    /// Name of the join table.
    pub table: String,
    /// Columns referencing the owner's key columns.
    pub owner_columns: Vec<String>,
    /// Columns referencing the related model's key columns.
    pub related_columns: Vec<String>,
    /// Extra columns copied onto related records.
    pub extras: Vec<JoinExtra>,
}

impl JoinTableSpec {
    /// Create a join table spec with single-column keys.
    pub fn new(
        table: impl Into<String>,
        owner_column: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            owner_columns: vec![owner_column.into()],
            related_columns: vec![related_column.into()],
            extras: Vec::new(),
        }
    }

    /// Surface `column` on related records as `alias`.
    pub fn extra(mut self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.extras.push(JoinExtra {
            column: column.into(),
            alias: alias.into(),
        });
        self
    }
}

/// A model: its table, columns, relations and named filters.
#[derive(Clone)]
pub struct ModelSpec {
    /// Model name.
    pub name: String,
    /// Table name.
    pub table: String,
    /// Primary key columns.
    pub id_columns: Vec<String>,
    /// All columns, in table order.
    pub columns: Vec<String>,
    /// Relations by name.
    pub relations: IndexMap<String, RelationSpec>,
    /// Filters usable by name in expressions over this model.
    pub named_filters: FilterMap,
    /// Eager configuration used when a call does not provide one.
    pub default_eager: Option<EagerConfig>,
}

impl ModelSpec {
    /// Create a model with an `id` primary key.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            id_columns: vec!["id".to_string()],
            columns: Vec::new(),
            relations: IndexMap::new(),
            named_filters: FilterMap::new(),
            default_eager: None,
        }
    }

    /// Set the primary key columns.
    pub fn id<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the columns.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Register a relation.
    pub fn relation(mut self, spec: RelationSpec) -> Self {
        self.relations.insert(spec.name.clone(), spec);
        self
    }

    /// Register a named filter.
    pub fn named_filter(mut self, name: impl Into<String>, filter: QueryMutator) -> Self {
        self.named_filters.insert(name, filter);
        self
    }

    /// Set the default eager configuration.
    pub fn default_eager(mut self, config: EagerConfig) -> Self {
        self.default_eager = Some(config);
        self
    }

    /// Whether the model has `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Get a relation by name.
    pub fn get_relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.get(name)
    }
}

impl fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("id_columns", &self.id_columns)
            .field("columns", &self.columns)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("named_filters", &self.named_filters)
            .field("default_eager", &self.default_eager)
            .finish()
    }
}

/// Source of model and relation metadata.
pub trait RelationMetadata: Send + Sync {
    /// Look up a model by name.
    fn model(&self, name: &str) -> Option<Arc<ModelSpec>>;

    /// Look up a relation of a model.
    fn relation(&self, model: &str, relation: &str) -> Option<RelationSpec> {
        self.model(model)?.get_relation(relation).cloned()
    }
}

/// An in-memory set of models.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    models: IndexMap<String, Arc<ModelSpec>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model.
    pub fn register(&mut self, model: ModelSpec) {
        self.models.insert(model.name.clone(), Arc::new(model));
    }

    /// Register a model, builder style.
    pub fn with_model(mut self, model: ModelSpec) -> Self {
        self.register(model);
        self
    }

    /// All registered models.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelSpec>> {
        self.models.values()
    }

    /// Check every relation against the models it connects.
    pub fn validate(&self) -> QueryResult<()> {
        for model in self.models.values() {
            for relation in model.relations.values() {
                let related = self.models.get(&relation.related_model).ok_or_else(|| {
                    QueryError::invalid_relation(
                        &model.name,
                        &relation.name,
                        format!("unknown related model {}", relation.related_model),
                    )
                })?;
                relation.validate(model, related)?;
            }
        }
        Ok(())
    }
}

impl RelationMetadata for Catalog {
    fn model(&self, name: &str) -> Option<Arc<ModelSpec>> {
        self.models.get(name).cloned()
    }
}
