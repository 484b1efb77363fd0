//! PostgreSQL pool configuration.

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use quarry_core::{DatabaseError, QuarryResult};
use std::time::Duration;
use tokio_postgres::NoTls;

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a free connection
    pub timeout: Duration,
    /// Server-side statement timeout
    pub statement_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "quarry".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("QUARRY_DB_HOST").unwrap_or(defaults.host),
            port: env_parse("QUARRY_DB_PORT").unwrap_or(defaults.port),
            dbname: std::env::var("QUARRY_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("QUARRY_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("QUARRY_DB_PASSWORD").unwrap_or_default(),
            max_size: env_parse("QUARRY_DB_POOL_SIZE").unwrap_or(defaults.max_size),
            timeout: env_parse("QUARRY_DB_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            statement_timeout: env_parse("QUARRY_DB_STATEMENT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.statement_timeout),
        }
    }

    /// Session options applied to every pooled connection. Sessions default
    /// to read-only so a statement that slips past validation still cannot
    /// write.
    fn session_options(&self) -> String {
        format!(
            "-c default_transaction_read_only=on -c statement_timeout={}",
            self.statement_timeout.as_millis()
        )
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> QuarryResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.options = Some(self.session_options());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            DatabaseError::ConnectionUnavailable {
                reason: format!("Failed to create pool: {}", e),
            }
        })?;

        Ok(pool)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
