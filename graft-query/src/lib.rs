//! # graft-query
//!
//! Eager loading of relation graphs for the Graft engine.
//!
//! This crate provides:
//! - Model and relation metadata ([`ModelSpec`], [`RelationSpec`], [`Catalog`])
//! - A structured query model that renders to SQL ([`RelationQuery`])
//! - The [`QueryExecutor`] seam and an in-memory executor for tests
//! - Three fetch algorithms (naive, where-in and join) behind [`RelationLoader`]
//! - Explicit configuration ([`EagerConfig`]) loadable from TOML
//!
//! ## Loading relations
//!
//! ```rust
//! use graft_query::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> QueryResult<()> {
//! let db = MemoryExecutor::new();
//! db.create_table("owners", ["id", "name"]);
//! db.create_table("pets", ["id", "ownerId", "species"]);
//! db.insert_json("owners", json!([{ "id": 1, "name": "Jennifer" }]))?;
//! db.insert_json("pets", json!([
//!     { "id": 1, "ownerId": 1, "species": "dog" },
//!     { "id": 2, "ownerId": 1, "species": "cat" },
//! ]))?;
//!
//! let catalog = Catalog::new()
//!     .with_model(
//!         ModelSpec::new("Owner", "owners")
//!             .columns(["id", "name"])
//!             .relation(RelationSpec::one_to_many("pets", "Pet").join_on(["id"], ["ownerId"])),
//!     )
//!     .with_model(
//!         ModelSpec::new("Pet", "pets")
//!             .columns(["id", "ownerId", "species"])
//!             .named_filter("dogs", mutator(|q| {
//!                 q.where_eq("species", "dog");
//!             })),
//!     );
//!
//! let loader = RelationLoader::new(db, catalog);
//! let owners = loader.query("Owner").eager("pets(dogs) as dogs").exec().await?;
//! assert_eq!(owners[0].many("dogs").map(<[_]>::len), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! ```rust
//! use graft_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::unknown_relation("Person", "pets", "pets");
//! assert_eq!(err.code, ErrorCode::UnknownRelation);
//! assert!(err.is_validation_error());
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod memory;
pub mod query;
pub mod relations;
pub mod sql;
pub mod traits;
pub mod types;

pub use config::{EagerAlgorithm, EagerConfig, EagerOptions};
pub use error::{ErrorCode, ErrorContext, ErrorKind, QueryError, QueryResult, Suggestion};
pub use filter::{Filter, FilterValue};
pub use memory::MemoryExecutor;
pub use query::{JoinClause, JoinKind, JoinSource, RelationQuery, Selection};
pub use relations::{
    Catalog, EagerQuery, FetchPlan, FetchStep, Field, FilterMap, JoinTableSpec, ModelSpec, Record,
    RelationLoader, RelationMetadata, RelationSpec, RelationType,
};
pub use sql::{ColumnRef, DatabaseType, SqlBuilder};
pub use traits::{QueryExecutor, QueryMutator, Row, mutator};
pub use types::{NullsOrder, OrderByField, SortOrder};

// Re-export the expression language
pub use graft_expr::{ExprError, Recursion, RelationExpr, RelationPath, parse_expression};

// Re-export logging utilities
pub use logging::{get_log_format, get_log_level, init as init_logging, is_debug_enabled};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{EagerAlgorithm, EagerConfig, EagerOptions};
    pub use crate::error::{ErrorCode, QueryError, QueryResult};
    pub use crate::filter::{Filter, FilterValue};
    pub use crate::memory::MemoryExecutor;
    pub use crate::query::{RelationQuery, Selection};
    pub use crate::relations::{
        Catalog, FilterMap, JoinTableSpec, ModelSpec, Record, RelationLoader, RelationMetadata,
        RelationSpec,
    };
    pub use crate::traits::{QueryExecutor, mutator};
    pub use crate::types::SortOrder;
}
