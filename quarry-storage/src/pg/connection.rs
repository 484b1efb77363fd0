//! Pooled read-only connections.

use super::convert::{driver_error, pool_error, row_to_json};
use crate::traits::{ConnectionProvider, ReadConnection};
use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use quarry_core::{DatabaseError, Row};

/// [`ConnectionProvider`] over a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgConnectionProvider {
    pool: Pool,
}

impl PgConnectionProvider {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }
}

#[async_trait]
impl ConnectionProvider for PgConnectionProvider {
    async fn acquire(&self) -> Result<Box<dyn ReadConnection>, DatabaseError> {
        let client = self.pool.get().await.map_err(pool_error)?;
        Ok(Box::new(PgReadConnection { client }))
    }
}

/// A checked-out connection. Returned to the pool on drop.
pub struct PgReadConnection {
    client: Object,
}

#[async_trait]
impl ReadConnection for PgReadConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, DatabaseError> {
        let tx = self
            .client
            .build_transaction()
            .read_only(true)
            .start()
            .await
            .map_err(|e| driver_error(&e))?;

        let rows = tx.query(sql, &[]).await.map_err(|e| driver_error(&e))?;
        let materialized = rows.iter().map(row_to_json).collect::<Result<Vec<_>, _>>()?;

        // Nothing to keep from a read-only transaction.
        tx.rollback().await.map_err(|e| driver_error(&e))?;
        Ok(materialized)
    }
}
