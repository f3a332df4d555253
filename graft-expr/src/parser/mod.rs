//! Relation expression parser.

mod grammar;

use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use smol_str::SmolStr;
use tracing::trace;

use crate::ast::*;
use crate::error::{ExprError, ExprResult};

pub use grammar::{ExpressionParser, Rule};

/// Parse a relation expression into a tree.
///
/// The returned node is the root: it has no relation and holds the top-level
/// relations of the expression as children.
pub fn parse_expression(input: &str) -> ExprResult<RelationExpr> {
    let mut pairs = ExpressionParser::parse(Rule::expression, input)
        .map_err(|e| syntax_error(input, e))?;

    let mut root = RelationExpr::root();
    root.span = Span::new(0, input.len());

    // The top-level parse result contains a single "expression" rule
    if let Some(expression) = pairs.next() {
        for pair in expression.into_inner() {
            parse_into(input, pair, &mut root)?;
        }
    }

    trace!(expression = %root, "parsed relation expression");
    Ok(root)
}

fn syntax_error(input: &str, error: pest::error::Error<Rule>) -> ExprError {
    let span = match error.location {
        InputLocation::Pos(pos) => Span::new(pos, pos),
        InputLocation::Span((start, end)) => Span::new(start, end),
    };
    ExprError::syntax(input, span, error.variant.message())
}

/// Parse a list or chain and attach the resulting nodes to `parent`.
fn parse_into(input: &str, pair: Pair<'_, Rule>, parent: &mut RelationExpr) -> ExprResult<()> {
    match pair.as_rule() {
        Rule::list => {
            for item in pair.into_inner() {
                parse_into(input, item, parent)?;
            }
        }
        Rule::chain => {
            let node = parse_chain(input, pair)?;
            if parent.children.contains_key(node.key()) {
                return Err(ExprError::duplicate(input, node.span, node.key()));
            }
            parent.insert_child(node);
        }
        Rule::EOI => {}
        _ => {}
    }
    Ok(())
}

fn parse_chain(input: &str, pair: Pair<'_, Rule>) -> ExprResult<RelationExpr> {
    let span = Span::from(pair.as_span());
    let mut inner = pair.into_inner();

    let mut node = match inner.next() {
        Some(reference) => parse_reference(reference),
        None => return Err(ExprError::syntax(input, span, "expected a relation")),
    };

    if let Some(tail) = inner.next() {
        match tail.as_rule() {
            Rule::recursion => node.recursion = parse_recursion(input, tail)?,
            Rule::list | Rule::chain => parse_into(input, tail, &mut node)?,
            _ => {}
        }
    }

    Ok(node)
}

fn parse_reference(pair: Pair<'_, Rule>) -> RelationExpr {
    let mut node = RelationExpr::root();
    node.span = Span::from(pair.as_span());

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::identifier => node.relation = Some(SmolStr::new(item.as_str())),
            Rule::filters => {
                node.filters = item
                    .into_inner()
                    .filter(|p| p.as_rule() == Rule::filter_name)
                    .map(|p| SmolStr::new(p.as_str()))
                    .collect();
            }
            Rule::alias => {
                node.alias = item
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::identifier)
                    .map(|p| SmolStr::new(p.as_str()));
            }
            _ => {}
        }
    }

    node
}

fn parse_recursion(input: &str, pair: Pair<'_, Rule>) -> ExprResult<Recursion> {
    let span = Span::from(pair.as_span());
    let digits = pair.as_str().trim_start_matches('^');
    if digits.is_empty() {
        return Ok(Recursion::Unbounded);
    }
    match digits.parse::<u32>() {
        Ok(0) | Err(_) => Err(ExprError::invalid_recursion(input, span)),
        Ok(depth) => Ok(Recursion::bounded(depth)),
    }
}
