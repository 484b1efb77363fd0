//! Statements and the reports derived from them.

use serde::{Deserialize, Serialize};

/// A single candidate statement extracted from oracle output.
///
/// Only the scrubber constructs these in production code; holding one means
/// the text began with an allow-listed keyword and had balanced parentheses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CleanStatement(String);

impl CleanStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for CleanStatement {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CleanStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Statement type by leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    Select,
    Show,
    Describe,
    Invalid,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Show => "SHOW",
            Self::Describe => "DESCRIBE",
            Self::Invalid => "INVALID",
        }
    }
}

/// Coarse complexity derived from the number of referenced tables.
/// Used for logging and warnings only, never for rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
}

impl ComplexityTier {
    /// More than five tables is HIGH, more than two is MEDIUM.
    pub fn from_table_count(count: usize) -> Self {
        if count > 5 {
            Self::High
        } else if count > 2 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Output of the SQL validator. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub query_type: QueryType,
    pub is_read_only: bool,
    pub referenced_tables: Vec<String>,
    pub structural_errors: Vec<String>,
    pub warnings: Vec<String>,
    pub complexity_tier: ComplexityTier,
}

/// Output of the table existence gate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableCheck {
    pub valid: bool,
    pub missing: Vec<String>,
}

impl TableCheck {
    pub fn passed() -> Self {
        Self {
            valid: true,
            missing: Vec::new(),
        }
    }
}

/// Output of the aggregation compliance checker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregationCheck {
    pub has_issue: bool,
    pub missing_columns: Vec<String>,
}
