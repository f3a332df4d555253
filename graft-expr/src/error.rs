//! Error types for relation expression parsing and tree operations.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

/// Result type for expression operations.
pub type ExprResult<T> = Result<T, ExprError>;

/// Errors that can occur while parsing or combining relation expressions.
#[derive(Error, Debug, Diagnostic)]
pub enum ExprError {
    /// Malformed expression text.
    #[error("invalid relation expression `{fragment}`: {message}")]
    #[diagnostic(code(graft::expr::syntax_error))]
    Syntax {
        #[source_code]
        src: String,
        #[label("error here")]
        span: miette::SourceSpan,
        /// The offending part of the expression.
        fragment: String,
        message: String,
    },

    /// Two siblings share a relation name (or alias).
    #[error("duplicate relation `{key}` in relation expression")]
    #[diagnostic(
        code(graft::expr::duplicate),
        help("give one of the relations a distinct name with `as <alias>`")
    )]
    Duplicate {
        #[source_code]
        src: String,
        #[label("`{key}` is already used by a sibling")]
        span: miette::SourceSpan,
        key: String,
        /// The offending part of the expression.
        fragment: String,
    },

    /// `^0` or a depth that does not fit in a `u32`.
    #[error("invalid recursion marker `{fragment}`: depth must be between 1 and {}", u32::MAX)]
    #[diagnostic(code(graft::expr::invalid_recursion))]
    InvalidRecursion {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        fragment: String,
    },

    /// Merging two trees that use the same key for different relations.
    #[error("cannot merge `{path}`: `{key}` refers to both `{existing}` and `{incoming}`")]
    #[diagnostic(code(graft::expr::alias_conflict))]
    AliasConflict {
        path: String,
        key: String,
        existing: String,
        incoming: String,
    },

    /// Unbounded recursion where a finite tree is required.
    #[error("relation expression `{expression}` recurses without a bound")]
    #[diagnostic(
        code(graft::expr::unbounded_recursion),
        help("use `^N` to give the recursion an explicit depth")
    )]
    UnboundedRecursion { expression: String, path: String },
}

impl ExprError {
    /// Create a syntax error pointing at `span` within `src`.
    pub fn syntax(src: impl Into<String>, span: Span, message: impl Into<String>) -> Self {
        let src = src.into();
        let fragment = fragment_at(&src, span);
        Self::Syntax {
            span: (span.start, span.len()).into(),
            fragment,
            src,
            message: message.into(),
        }
    }

    /// Create a duplicate key error.
    pub fn duplicate(src: impl Into<String>, span: Span, key: impl Into<String>) -> Self {
        let src = src.into();
        let fragment = fragment_at(&src, span);
        Self::Duplicate {
            span: (span.start, span.len()).into(),
            fragment,
            src,
            key: key.into(),
        }
    }

    /// Create an invalid recursion error.
    pub fn invalid_recursion(src: impl Into<String>, span: Span) -> Self {
        let src = src.into();
        let fragment = fragment_at(&src, span);
        Self::InvalidRecursion {
            span: (span.start, span.len()).into(),
            fragment,
            src,
        }
    }

    /// The part of the expression (or the relation path) that caused the error.
    ///
    /// Callers match on this to build user-facing messages.
    pub fn fragment(&self) -> &str {
        match self {
            Self::Syntax { fragment, .. }
            | Self::Duplicate { fragment, .. }
            | Self::InvalidRecursion { fragment, .. } => fragment,
            Self::AliasConflict { path, .. } => path,
            Self::UnboundedRecursion { expression, .. } => expression,
        }
    }

    /// The relation path involved, for errors raised by tree operations.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::AliasConflict { path, .. } | Self::UnboundedRecursion { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Slice the offending text out of the source, falling back to the tail of the
/// input (or the whole input) for zero-width spans.
fn fragment_at(src: &str, span: Span) -> String {
    let start = span.start.min(src.len());
    let end = span.end.clamp(start, src.len());
    let fragment = src.get(start..end).unwrap_or_default().trim();
    if !fragment.is_empty() {
        return fragment.to_string();
    }
    let tail = src.get(start..).unwrap_or_default().trim();
    if tail.is_empty() {
        src.trim().to_string()
    } else {
        tail.to_string()
    }
}
