//! Abstract Syntax Tree (AST) types for relation expressions.

mod expr;
mod path;
mod types;

pub use expr::*;
pub use path::*;
pub use types::*;
