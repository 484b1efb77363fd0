//! PostgreSQL adapters for the database collaborators.

pub mod config;
pub mod connection;
pub mod convert;
pub mod directory;

pub use config::DbConfig;
pub use connection::{PgConnectionProvider, PgReadConnection};
pub use convert::{driver_error, pool_error};
pub use directory::PgTableDirectory;
