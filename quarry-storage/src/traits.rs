//! Collaborator contracts for the live database.

use async_trait::async_trait;
use quarry_core::{DatabaseError, QuarryResult, Row};
use std::collections::HashSet;

/// Source of the live table names.
#[async_trait]
pub trait TableDirectory: Send + Sync {
    /// List every table visible to the pipeline.
    async fn list_tables(&self) -> QuarryResult<HashSet<String>>;
}

/// Hands out scoped read-only connections.
///
/// A connection is returned to its pool when the boxed value is dropped;
/// callers acquire one per statement and never hold it across calls.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn ReadConnection>, DatabaseError>;
}

/// One checked-out connection.
#[async_trait]
pub trait ReadConnection: Send {
    /// Run a single statement in a read-only context and materialize every row.
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, DatabaseError>;
}
