//! # Graft
//!
//! Eager loading of relation graphs described by a compact expression
//! language.
//!
//! Graft provides:
//! - A relation expression language (`[pets(onlyDogs) as dogs, movies.^2]`)
//! - Named filters, per-path query modifiers and expression merging
//! - Three interchangeable fetch algorithms: naive, where-in and join
//! - Reconciliation of fetched rows into nested records
//!
//! ## Quick Start
//!
//! ```rust
//! use graft::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> QueryResult<()> {
//! let db = MemoryExecutor::new();
//! db.create_table("people", ["id", "name", "parentId"]);
//! db.insert_json("people", json!([
//!     { "id": 1, "name": "Arnold", "parentId": 2 },
//!     { "id": 2, "name": "Gustav", "parentId": 3 },
//!     { "id": 3, "name": "Ellen" },
//! ]))?;
//!
//! let catalog = Catalog::new().with_model(
//!     ModelSpec::new("Person", "people")
//!         .columns(["id", "name", "parentId"])
//!         .relation(RelationSpec::many_to_one("parent", "Person").join_on(["parentId"], ["id"])),
//! );
//!
//! let loader = RelationLoader::new(db, catalog);
//! let people = loader
//!     .query("Person")
//!     .where_eq("id", 1)
//!     .eager("parent.^")
//!     .algorithm(EagerAlgorithm::WhereIn)
//!     .exec()
//!     .await?;
//!
//! let grandparent = &people[0].to_json()["parent"]["parent"];
//! assert_eq!(grandparent["name"], json!("Ellen"));
//! assert_eq!(grandparent["parent"], json!(null));
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Relation expression parsing and tree types.
pub mod expr {
    pub use graft_expr::*;
}

/// Relation metadata, queries and the eager loading algorithms.
pub mod query {
    pub use graft_query::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use graft_expr::{RelationExpr, RelationPath, parse_expression};
    pub use graft_query::prelude::*;
}

// Re-export key types at the crate root
pub use expr::{ExprError, RelationExpr, parse_expression};
pub use query::{EagerAlgorithm, EagerConfig, QueryError, QueryResult, Record, RelationLoader};
