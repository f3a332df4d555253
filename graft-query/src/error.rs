//! Error types for eager loading with actionable messages.
//!
//! Every error carries a code for programmatic handling and, where one exists,
//! the offending expression fragment or relation path so callers can match on
//! it when building user-facing messages.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: G{category}{number}
//! - 1xxx: Expression parse errors (syntax, duplicates, recursion markers)
//! - 2xxx: Validation errors (unknown relation/filter, identifier length, recursion)
//! - 5xxx: Execution errors (propagated from the query executor)
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use graft_query::{ErrorCode, ErrorKind, QueryError};
//!
//! let err = QueryError::unknown_filter("missingFilter", "model1Relation2");
//! assert_eq!(err.code, ErrorCode::UnknownFilter);
//! assert_eq!(err.kind(), ErrorKind::Validation);
//! assert_eq!(err.context.expression.as_deref(), Some("missingFilter"));
//! assert!(err.to_string().starts_with("[G2002]"));
//! ```

use std::fmt;

use graft_expr::ExprError;
use thiserror::Error;

/// Result type for eager loading operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Parse errors (1xxx)
    /// Malformed relation expression (G1001).
    InvalidExpression = 1001,
    /// Duplicate sibling relation or alias (G1002).
    DuplicateRelation = 1002,
    /// Invalid recursion marker (G1003).
    InvalidRecursion = 1003,

    // Validation errors (2xxx)
    /// Relation not defined on the model (G2001).
    UnknownRelation = 2001,
    /// Named filter not supplied and not defined on the model (G2002).
    UnknownFilter = 2002,
    /// Model not present in the catalog (G2003).
    UnknownModel = 2003,
    /// Modifier path that does not address a node of the expression (G2004).
    UnresolvedPath = 2004,
    /// Generated identifier longer than the database allows (G2005).
    IdentifierTooLong = 2005,
    /// Recursion the algorithm cannot expand (G2006).
    RecursionTooDeep = 2006,
    /// One key naming two different relations (G2007).
    AliasConflict = 2007,
    /// Relation metadata that cannot be joined (G2008).
    InvalidRelation = 2008,

    // Execution errors (5xxx)
    /// Error reported by the query executor (G5001).
    DatabaseError = 5001,
    /// Table not known to the executor (G5002).
    UnknownTable = 5002,
    /// Column not known to the executor (G5003).
    UnknownColumn = 5003,

    // Configuration errors (7xxx)
    /// Invalid configuration (G7001).
    InvalidConfiguration = 7001,
    /// Configuration could not be read (G7002).
    MissingConfiguration = 7002,

    // Internal errors (9xxx)
    /// Internal error (G9001).
    Internal = 9001,
}

/// Broad error classes; any error aborts the whole fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The expression text is malformed.
    Parse,
    /// The expression does not fit the models or the chosen algorithm.
    Validation,
    /// A query failed.
    Execution,
    /// Configuration could not be loaded.
    Configuration,
    /// A bug.
    Internal,
}

impl ErrorCode {
    /// Get the error code string (e.g., "G1001").
    pub fn code(&self) -> String {
        format!("G{}", *self as u16)
    }

    /// The class of this code.
    pub fn kind(&self) -> ErrorKind {
        match *self as u16 {
            1000..=1999 => ErrorKind::Parse,
            2000..=2999 => ErrorKind::Validation,
            5000..=5999 => ErrorKind::Execution,
            7000..=7999 => ErrorKind::Configuration,
            _ => ErrorKind::Internal,
        }
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidExpression => "Invalid relation expression",
            Self::DuplicateRelation => "Duplicate relation in expression",
            Self::InvalidRecursion => "Invalid recursion marker",
            Self::UnknownRelation => "Unknown relation",
            Self::UnknownFilter => "Unknown named filter",
            Self::UnknownModel => "Unknown model",
            Self::UnresolvedPath => "Unresolved relation path",
            Self::IdentifierTooLong => "Identifier too long",
            Self::RecursionTooDeep => "Recursion too deep",
            Self::AliasConflict => "Conflicting relation alias",
            Self::InvalidRelation => "Invalid relation definition",
            Self::DatabaseError => "Database error",
            Self::UnknownTable => "Unknown table",
            Self::UnknownColumn => "Unknown column",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::MissingConfiguration => "Missing configuration",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Suggestion for fixing an error.
#[derive(Debug, Clone)]
pub struct Suggestion {
    /// The suggestion text.
    pub text: String,
    /// Optional code example.
    pub code: Option<String>,
}

impl Suggestion {
    /// Create a new suggestion.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            code: None,
        }
    }

    /// Add a code example.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The offending expression fragment, identifier or full expression.
    pub expression: Option<String>,
    /// The relation path involved.
    pub path: Option<String>,
    /// The SQL query (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<Suggestion>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur while loading a relation expression.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(Suggestion::new(suggestion));
        self
    }

    /// Add a code suggestion.
    pub fn with_code_suggestion(mut self, text: impl Into<String>, code: impl Into<String>) -> Self {
        self.context
            .suggestions
            .push(Suggestion::new(text).with_code(code));
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the offending expression fragment.
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.context.expression = Some(expression.into());
        self
    }

    /// Set the relation path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.context.path = Some(path.into());
        self
    }

    /// Set the SQL query.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create an error for an unknown relation.
    pub fn unknown_relation(
        model: impl Into<String>,
        relation: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::UnknownRelation,
            format!("unknown relation \"{}\" in an eager expression", relation),
        )
        .with_model(&model)
        .with_expression(&relation)
        .with_path(path)
        .with_suggestion(format!("Check that {} defines a relation named {}", model, relation))
    }

    /// Create an error for a named filter that is neither supplied nor defined by the model.
    pub fn unknown_filter(name: impl Into<String>, path: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::UnknownFilter,
            format!("could not find filter \"{}\" for relation expression", name),
        )
        .with_expression(&name)
        .with_path(path)
        .with_suggestion("Pass the filter in the filter map or define it as a named filter on the model")
    }

    /// Create an error for a model missing from the catalog.
    pub fn unknown_model(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(ErrorCode::UnknownModel, format!("unknown model \"{}\"", model))
            .with_model(&model)
            .with_suggestion("Register the model in the catalog before querying it")
    }

    /// Create an error for a modifier path that does not resolve.
    pub fn unresolved_path(path: impl Into<String>, expression: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::UnresolvedPath,
            format!("relation path \"{}\" does not match the eager expression", path),
        )
        .with_path(&path)
        .with_expression(expression)
        .with_suggestion("Add the relation to the expression with eager() or merge_eager()")
    }

    /// Create an error for a generated identifier over the length limit.
    pub fn identifier_too_long(identifier: impl Into<String>, max_length: usize) -> Self {
        let identifier = identifier.into();
        Self::new(
            ErrorCode::IdentifierTooLong,
            format!(
                "identifier {} is over {} characters long and would be truncated by the database engine.",
                identifier, max_length
            ),
        )
        .with_expression(&identifier)
        .with_suggestion("Enable the `minimize` option to use short generated aliases")
        .with_suggestion("Give long relation names a short alias in the `aliases` option")
    }

    /// Create an error for recursion the join algorithm cannot expand.
    pub fn recursion_too_deep(expression: impl Into<String>, path: impl Into<String>) -> Self {
        let expression = expression.into();
        Self::new(
            ErrorCode::RecursionTooDeep,
            format!(
                "recursion depth of eager expression {} too big for the join eager algorithm",
                expression
            ),
        )
        .with_expression(&expression)
        .with_path(path)
        .with_code_suggestion("Give the recursion an explicit depth", "parent.^5")
        .with_help("Unbounded recursion is only supported by the naive and where-in algorithms")
    }

    /// Create an error for relation metadata that cannot be used.
    pub fn invalid_relation(
        model: impl Into<String>,
        relation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let relation = relation.into();
        Self::new(
            ErrorCode::InvalidRelation,
            format!("invalid relation {}: {}", relation, message.into()),
        )
        .with_model(model)
        .with_expression(relation)
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create an unknown table error.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(ErrorCode::UnknownTable, format!("no such table: {}", table))
    }

    /// Create an unknown column error.
    pub fn unknown_column(column: impl Into<String>) -> Self {
        let column = column.into();
        Self::new(ErrorCode::UnknownColumn, format!("no such column: {}", column))
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::InvalidConfiguration,
            format!("Invalid configuration: {}", message),
        )
    }

    /// Create an error for a configuration file that could not be read.
    pub fn missing_config(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::MissingConfiguration,
            format!("Could not read configuration file {}", path),
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
            .with_help("This is likely a bug in Graft - please report it")
    }

    // ============== Error Checks ==============

    /// The class of this error.
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Check if this is an expression parse error.
    pub fn is_parse_error(&self) -> bool {
        self.kind() == ErrorKind::Parse
    }

    /// Check if this is a validation error.
    pub fn is_validation_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Check if this error came from the query executor.
    pub fn is_execution_error(&self) -> bool {
        self.kind() == ErrorKind::Execution
    }

    /// Check if this is a configuration error.
    pub fn is_config_error(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    // ============== Display Functions ==============

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref expression) = self.context.expression {
            output.push_str(&format!("  → Expression: {}\n", expression));
        }
        if let Some(ref path) = self.context.path {
            output.push_str(&format!("  → Path: {}\n", path));
        }

        // SQL (truncated if too long)
        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.chars().count() > 200 {
                format!("{}...", sql.chars().take(200).collect::<String>())
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion.text));
                if let Some(ref code) = suggestion.code {
                    output.push_str(&format!(
                        "     ```\n     {}\n     ```\n",
                        code.replace('\n', "\n     ")
                    ));
                }
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

impl From<ExprError> for QueryError {
    fn from(err: ExprError) -> Self {
        let code = match &err {
            ExprError::Syntax { .. } => ErrorCode::InvalidExpression,
            ExprError::Duplicate { .. } => ErrorCode::DuplicateRelation,
            ExprError::InvalidRecursion { .. } => ErrorCode::InvalidRecursion,
            ExprError::AliasConflict { .. } => ErrorCode::AliasConflict,
            ExprError::UnboundedRecursion { .. } => ErrorCode::RecursionTooDeep,
        };
        let mut query_error = Self::new(code, err.to_string()).with_expression(err.fragment());
        if let Some(path) = err.path() {
            query_error = query_error.with_path(path);
        }
        query_error.with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::InvalidExpression.code(), "G1001");
        assert_eq!(ErrorCode::UnknownFilter.code(), "G2002");
        assert_eq!(ErrorCode::DatabaseError.code(), "G5001");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ErrorCode::DuplicateRelation.kind(), ErrorKind::Parse);
        assert_eq!(ErrorCode::IdentifierTooLong.kind(), ErrorKind::Validation);
        assert_eq!(ErrorCode::UnknownTable.kind(), ErrorKind::Execution);
        assert_eq!(ErrorCode::InvalidConfiguration.kind(), ErrorKind::Configuration);
        assert_eq!(ErrorCode::Internal.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_identifier_too_long_message() {
        let err = QueryError::identifier_too_long(
            "model1Relation1:model1Relation1:model1Relation1:model1Relation1:id",
            63,
        );
        assert!(err.is_validation_error());
        assert_eq!(
            err.message,
            "identifier model1Relation1:model1Relation1:model1Relation1:model1Relation1:id is over 63 characters long and would be truncated by the database engine."
        );
        assert_eq!(
            err.context.expression.as_deref(),
            Some("model1Relation1:model1Relation1:model1Relation1:model1Relation1:id")
        );
    }

    #[test]
    fn test_recursion_too_deep_carries_expression() {
        let err = QueryError::recursion_too_deep("model1Relation1.^", "model1Relation1");
        assert_eq!(err.code, ErrorCode::RecursionTooDeep);
        assert!(err.message.contains("model1Relation1.^"));
        assert_eq!(err.context.path.as_deref(), Some("model1Relation1"));
    }

    #[test]
    fn test_from_expr_error() {
        let expr_err = graft_expr::parse_expression("[a, a]").unwrap_err();
        let err = QueryError::from(expr_err);
        assert_eq!(err.code, ErrorCode::DuplicateRelation);
        assert!(err.is_parse_error());
        assert_eq!(err.context.expression.as_deref(), Some("a"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_display_full() {
        let err = QueryError::unknown_relation("Model1", "invalidRelation", "invalidRelation")
            .with_context("Resolving eager expression");

        let output = err.display_full();
        assert!(output.contains("G2001"));
        assert!(output.contains("Model1"));
        assert!(output.contains("Path: invalidRelation"));
        assert!(output.contains("Suggestions"));
    }
}
