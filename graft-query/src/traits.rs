//! Collaborator traits and shared type aliases.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::QueryResult;
use crate::filter::FilterValue;
use crate::query::RelationQuery;

/// A result row: output column name to value, in SELECT order.
pub type Row = IndexMap<String, FilterValue>;

/// A function that adjusts the query fetching one relation.
pub type QueryMutator = Arc<dyn Fn(&mut RelationQuery) + Send + Sync>;

/// Wrap a closure as a [`QueryMutator`].
pub fn mutator<F>(f: F) -> QueryMutator
where
    F: Fn(&mut RelationQuery) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Runs queries on behalf of the loader.
///
/// Implementations own connections, pooling and timeouts; the loader only
/// submits queries and propagates the first error it receives.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a SELECT and return its rows.
    async fn fetch(&self, query: &RelationQuery) -> QueryResult<Vec<Row>>;

    /// Name of this executor (for logging).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[async_trait]
impl<T: QueryExecutor + ?Sized> QueryExecutor for Arc<T> {
    async fn fetch(&self, query: &RelationQuery) -> QueryResult<Vec<Row>> {
        (**self).fetch(query).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
