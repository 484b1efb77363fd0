//! Quarry Storage - shared state and database collaborators
//!
//! Holds the process-wide mutable state of the pipeline: the result cache and
//! the table existence snapshot. Both are plain values owned by whoever
//! constructs them; there are no module-level singletons. Also defines the
//! database collaborator traits and their PostgreSQL implementations.

pub mod cache;
pub mod pg;
pub mod table_gate;
pub mod traits;

pub use cache::{normalize_sql, CacheStats, ResultCache, ResultCacheKey};
pub use pg::{DbConfig, PgConnectionProvider, PgReadConnection, PgTableDirectory};
pub use table_gate::TableGate;
pub use traits::{ConnectionProvider, ReadConnection, TableDirectory};
