//! Named filters and per-path query modifiers.
//!
//! A load collects modifiers before anything is resolved: filter maps supplying
//! named filters, mutators registered against relation paths, and expressions
//! merged into the base expression. They are validated against the final tree
//! when the load is prepared, so registration order between `eager` and
//! `modify_eager` does not matter.

use std::fmt;

use graft_expr::{RelationExpr, RelationPath};
use indexmap::IndexMap;

use crate::error::{QueryError, QueryResult};
use crate::traits::QueryMutator;

/// Named query mutators.
#[derive(Clone, Default)]
pub struct FilterMap {
    filters: IndexMap<String, QueryMutator>,
}

impl FilterMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter, replacing one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, filter: QueryMutator) {
        self.filters.insert(name.into(), filter);
    }

    /// Add a filter, builder style.
    pub fn with(mut self, name: impl Into<String>, filter: QueryMutator) -> Self {
        self.insert(name, filter);
        self
    }

    /// Get a filter by name.
    pub fn get(&self, name: &str) -> Option<&QueryMutator> {
        self.filters.get(name)
    }

    /// Whether a filter with `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Filter names, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Debug for FilterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}

impl<S: Into<String>> FromIterator<(S, QueryMutator)> for FilterMap {
    fn from_iter<I: IntoIterator<Item = (S, QueryMutator)>>(iter: I) -> Self {
        Self {
            filters: iter.into_iter().map(|(name, f)| (name.into(), f)).collect(),
        }
    }
}

/// Modifiers collected for one eager load.
#[derive(Clone, Default)]
pub struct EagerModifiers {
    filters: Vec<FilterMap>,
    paths: Vec<(RelationPath, QueryMutator)>,
    merges: Vec<String>,
}

impl EagerModifiers {
    /// Create an empty set of modifiers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply named filters. Maps added later shadow earlier ones.
    pub fn add_filters(&mut self, filters: FilterMap) {
        self.filters.push(filters);
    }

    /// Register a mutator for the relation at `path`.
    pub fn add_path_mutator(&mut self, path: impl Into<RelationPath>, mutator: QueryMutator) {
        self.paths.push((path.into(), mutator));
    }

    /// Register an expression to merge into the base expression.
    pub fn add_merge(&mut self, expression: impl Into<String>, filters: Option<FilterMap>) {
        self.merges.push(expression.into());
        if let Some(filters) = filters {
            self.filters.push(filters);
        }
    }

    /// Whether nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.paths.is_empty() && self.merges.is_empty()
    }

    /// Merge the registered expressions into `base`, in registration order.
    pub fn apply_merges(&self, base: RelationExpr) -> QueryResult<RelationExpr> {
        self.merges.iter().try_fold(base, |tree, expression| {
            let other = graft_expr::parse_expression(expression)?;
            Ok(tree.merged(other)?)
        })
    }

    /// Look up a filter supplied with the load.
    pub fn filter(&self, name: &str) -> Option<&QueryMutator> {
        self.filters.iter().rev().find_map(|map| map.get(name))
    }

    /// Rewrite every registered path in terms of node keys of `tree`.
    ///
    /// A path that addresses no node is an [`ErrorCode::UnresolvedPath`](crate::ErrorCode::UnresolvedPath).
    pub fn resolve_paths(&self, tree: &RelationExpr) -> QueryResult<Vec<(RelationPath, QueryMutator)>> {
        self.paths
            .iter()
            .map(|(path, mutator)| {
                tree.canonical_path(path)
                    .filter(|canonical| !canonical.is_root())
                    .map(|canonical| (canonical, mutator.clone()))
                    .ok_or_else(|| QueryError::unresolved_path(path.to_string(), tree.to_string()))
            })
            .collect()
    }
}

impl fmt::Debug for EagerModifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EagerModifiers")
            .field("filters", &self.filters)
            .field("paths", &self.paths.iter().map(|(p, _)| p.to_string()).collect::<Vec<_>>())
            .field("merges", &self.merges)
            .finish()
    }
}
