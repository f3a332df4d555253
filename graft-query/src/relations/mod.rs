//! Eager loading of relations.
//!
//! This module binds relation expressions to model metadata and loads them:
//! - `spec` describes models, their relations and join tables
//! - `modifiers` collects named filters, path modifiers and merged expressions
//! - `plan` orders the relation fetches for an algorithm
//! - `naive`, `where_in` and `join` are the three fetch algorithms
//! - `reconcile` grafts fetched records onto their owners
//!
//! ## Example
//!
//! ```rust,ignore
//! let movies = loader
//!     .query("Person")
//!     .eager("[pets(onlyDogs) as dogs, movies.actors]")
//!     .modify_eager("movies", |q| {
//!         q.order_by_desc("released");
//!     })
//!     .algorithm(EagerAlgorithm::Join)
//!     .exec()
//!     .await?;
//! ```

mod fetch;
mod join;
mod keys;
mod loader;
mod modifiers;
mod naive;
mod plan;
mod reconcile;
mod record;
mod resolve;
mod spec;
mod where_in;

pub use keys::{KeySelection, KeyValues, RowKey};
pub use loader::{EagerQuery, RelationLoader};
pub use modifiers::{EagerModifiers, FilterMap};
pub use plan::{FetchPlan, FetchStep};
pub use record::{Field, Record};
pub use resolve::{EagerNode, Resolver, bound_recursion};
pub use spec::{Catalog, JoinExtra, JoinTableSpec, ModelSpec, RelationMetadata, RelationSpec, RelationType};
