//! Live table directory backed by information_schema.

use super::convert::pool_error;
use crate::traits::TableDirectory;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use quarry_core::{DirectoryError, QuarryResult};
use std::collections::HashSet;

const LIST_TABLES_SQL: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema NOT IN ('pg_catalog', 'information_schema')";

/// Lists base tables and views outside the system schemas.
#[derive(Clone)]
pub struct PgTableDirectory {
    pool: Pool,
}

impl PgTableDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn listing_failed(reason: impl std::fmt::Display) -> DirectoryError {
    DirectoryError::ListingFailed {
        reason: reason.to_string(),
    }
}

#[async_trait]
impl TableDirectory for PgTableDirectory {
    async fn list_tables(&self) -> QuarryResult<HashSet<String>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| listing_failed(pool_error(e)))?;

        let rows = client
            .query(LIST_TABLES_SQL, &[])
            .await
            .map_err(listing_failed)?;

        let mut tables = HashSet::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0).map_err(listing_failed)?;
            tables.insert(name);
        }
        Ok(tables)
    }
}
