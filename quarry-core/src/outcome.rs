//! Execution outcomes and the closed error taxonomy.

use crate::report::ComplexityTier;
use serde::{Deserialize, Serialize};

/// One materialized result row, column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Closed, total failure taxonomy. Every failure that reaches a caller maps
/// to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Statement is not read-only, or no allow-listed statement was found
    UnsafeQuery,
    /// Structurally broken or rejected by the engine's parser
    SyntaxError,
    /// References a table missing from the live directory
    TableNotFound,
    /// SELECT / GROUP BY mismatch
    GroupByError,
    /// Engine refused for permission reasons
    AccessDenied,
    /// Database unreachable or connection lost
    ConnectionError,
    /// Lock wait, deadlock or statement timeout
    LockTimeout,
    /// Any other engine-side failure
    ExecutionError,
    /// Oracle output ended mid-statement
    QueryTruncated,
    /// The oracle call itself failed
    GenerationFailed,
}

impl ErrorKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::UnsafeQuery => "UNSAFE_QUERY",
            Self::SyntaxError => "SYNTAX_ERROR",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::GroupByError => "GROUP_BY_ERROR",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::LockTimeout => "LOCK_TIMEOUT",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::QueryTruncated => "QUERY_TRUNCATED",
            Self::GenerationFailed => "GENERATION_FAILED",
        }
    }

    /// Whether regenerating with the error fed back is worth an attempt.
    /// Permission and connectivity failures are not: identical input will
    /// fail identically.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::AccessDenied | Self::ConnectionError)
    }

    /// User-safe message for this kind.
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::UnsafeQuery => "Only read-only queries are allowed.",
            Self::SyntaxError => "The generated query was not valid SQL.",
            Self::TableNotFound => "The query referenced a table that does not exist.",
            Self::GroupByError => {
                "The query mixed aggregated and non-aggregated columns without grouping them."
            }
            Self::AccessDenied => "You do not have permission to access this data.",
            Self::ConnectionError => {
                "The database is currently unreachable. Please try again later."
            }
            Self::LockTimeout => "The database was busy and the query timed out.",
            Self::ExecutionError => "The query could not be executed.",
            Self::QueryTruncated => "The generated query was incomplete.",
            Self::GenerationFailed => "A query could not be generated for this question.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// A classified failure. `technical_detail` is for operators and the
/// correction loop; only `kind` and `user_message` reach the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFailure {
    pub kind: ErrorKind,
    pub user_message: String,
    #[serde(skip_serializing, default)]
    pub technical_detail: String,
}

impl QueryFailure {
    pub fn new(kind: ErrorKind, technical_detail: impl Into<String>) -> Self {
        Self {
            kind,
            user_message: kind.default_message().to_string(),
            technical_detail: technical_detail.into(),
        }
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }
}

/// Observability-only breakdown of a statement's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComplexityScore {
    pub subqueries: u32,
    pub joins: u32,
    pub json_functions: u32,
    pub aggregates: u32,
    pub score: u32,
}

/// Rows returned by a successful execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySuccess {
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub elapsed_ms: u64,
    pub complexity_tier: ComplexityTier,
    pub complexity: ComplexityScore,
    pub cached: bool,
}

impl QuerySuccess {
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

/// Either rows or a classified failure. Only the success shape is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Success(QuerySuccess),
    Failure(QueryFailure),
}

impl ExecutionOutcome {
    pub fn failure(kind: ErrorKind, technical_detail: impl Into<String>) -> Self {
        Self::Failure(QueryFailure::new(kind, technical_detail))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn as_success(&self) -> Option<&QuerySuccess> {
        match self {
            Self::Success(s) => Some(s),
            Self::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&QueryFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f),
        }
    }
}
