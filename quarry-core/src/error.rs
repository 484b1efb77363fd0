//! Error types for Quarry collaborator boundaries.
//!
//! Domain failures inside the pipeline (unsafe SQL, missing tables, driver
//! errors) are not errors in this sense: stages return typed reports and the
//! executor returns an [`ExecutionOutcome`](crate::ExecutionOutcome). The
//! enums below cover the places where an external collaborator or the
//! configuration itself fails.

use thiserror::Error;

/// Generative oracle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("No oracle configured for model {model}")]
    ProviderNotConfigured { model: String },

    #[error("Request to {provider} failed: {message}")]
    RequestFailed { provider: String, message: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Database collaborator errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Connection unavailable: {reason}")]
    ConnectionUnavailable { reason: String },

    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A native error reported by the driver for a statement.
    ///
    /// `code` carries the SQLSTATE (PostgreSQL) or vendor error number
    /// (MySQL) when the driver exposes one.
    #[error("Driver error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Driver {
        code: Option<String>,
        message: String,
    },
}

impl DatabaseError {
    /// Build a driver error from a code and message.
    pub fn driver(code: Option<impl Into<String>>, message: impl Into<String>) -> Self {
        Self::Driver {
            code: code.map(Into::into),
            message: message.into(),
        }
    }

    /// Native code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Driver { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Live table directory errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Table listing failed: {reason}")]
    ListingFailed { reason: String },

    #[error("Table snapshot lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all Quarry errors.
#[derive(Debug, Clone, Error)]
pub enum QuarryError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

/// Result type alias for Quarry operations.
pub type QuarryResult<T> = Result<T, QuarryError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_error_display_not_configured() {
        let err = OracleError::ProviderNotConfigured {
            model: "deepseek-chat".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("No oracle configured"));
        assert!(msg.contains("deepseek-chat"));
    }

    #[test]
    fn test_driver_error_display_with_code() {
        let err = DatabaseError::driver(Some("42P01"), "relation \"userz\" does not exist");
        let msg = format!("{}", err);
        assert!(msg.contains("[42P01]"));
        assert!(msg.contains("userz"));
        assert_eq!(err.code(), Some("42P01"));
    }

    #[test]
    fn test_driver_error_display_without_code() {
        let err = DatabaseError::driver(None::<String>, "boom");
        assert_eq!(format!("{}", err), "Driver error: boom");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "attempt_budget".to_string(),
            value: "0".to_string(),
            reason: "must be between 1 and 3".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("attempt_budget"));
        assert!(msg.contains("must be between 1 and 3"));
    }

    #[test]
    fn test_quarry_error_from_variants() {
        let oracle = QuarryError::from(OracleError::RequestFailed {
            provider: "mock".to_string(),
            message: "timeout".to_string(),
        });
        assert!(matches!(oracle, QuarryError::Oracle(_)));

        let db = QuarryError::from(DatabaseError::PoolExhausted);
        assert!(matches!(db, QuarryError::Database(_)));

        let dir = QuarryError::from(DirectoryError::LockPoisoned);
        assert!(matches!(dir, QuarryError::Directory(_)));

        let config = QuarryError::from(ConfigError::MissingRequired {
            field: "row_limit".to_string(),
        });
        assert!(matches!(config, QuarryError::Config(_)));
    }
}
