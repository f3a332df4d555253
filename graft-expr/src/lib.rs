//! # graft-expr
//!
//! Relation expression language for the Graft eager loading engine.
//!
//! This crate provides:
//! - A pest grammar and parser for relation expressions
//! - The expression tree ([`RelationExpr`]) and its structural operations
//! - Relation paths used to address nodes of a tree
//! - Diagnostic errors pointing at the offending part of an expression
//!
//! ## Example
//!
//! ```rust
//! use graft_expr::{parse_expression, RelationPath};
//!
//! let tree = parse_expression("[pets(onlyDogs) as dogs, movies.actors]").unwrap();
//! assert!(tree.find(&RelationPath::parse("movies.actors")).is_some());
//!
//! let merged = tree.merged(parse_expression("movies.director").unwrap()).unwrap();
//! assert_eq!(merged.to_string(), "[pets(onlyDogs) as dogs, movies.[actors, director]]");
//! ```
//!
//! ## Grammar
//!
//! | Form | Meaning |
//! |------|---------|
//! | `rel` | fetch relation `rel` |
//! | `a.b` | fetch `a`, and `b` of every `a` |
//! | `[a, b]` | fetch sibling relations |
//! | `rel(f1, f2)` | apply named filters to the query for `rel` |
//! | `rel as x` | store the relation under `x` |
//! | `rel.^` / `rel.^N` | repeat `rel` below itself, unbounded or `N` levels deep |

pub mod ast;
pub mod error;
pub mod parser;

pub use ast::*;
pub use error::{ExprError, ExprResult};
pub use parser::parse_expression;
