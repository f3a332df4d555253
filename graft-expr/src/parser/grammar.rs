//! Pest grammar parser for relation expressions.

use pest_derive::Parser;

/// The relation expression parser.
#[derive(Parser)]
#[grammar = "parser/expression.pest"]
pub struct ExpressionParser;
