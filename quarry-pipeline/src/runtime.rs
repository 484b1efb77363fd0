//! Lifecycle of the shared pipeline state.
//!
//! [`PipelineRuntime::start`] builds the result cache and table snapshot,
//! loads the snapshot once, and spawns the maintenance jobs.
//! [`PipelineRuntime::shutdown`] stops the jobs and waits for them.

use crate::jobs::{cache_sweep_task, table_refresh_task, JobMetrics, JobMetricsSnapshot};
use crate::orchestrator::CorrectionOrchestrator;
use quarry_core::{ProcessResponse, QuarryConfig, QuarryResult, Question};
use quarry_llm::{OracleRegistry, PromptContextProvider};
use quarry_storage::{
    ConnectionProvider, DbConfig, PgConnectionProvider, PgTableDirectory, ResultCache,
    TableDirectory, TableGate,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Counters reported by the maintenance jobs at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeMetrics {
    pub cache_sweep: JobMetricsSnapshot,
    pub table_refresh: JobMetricsSnapshot,
}

/// Running pipeline: orchestrator plus background jobs.
pub struct PipelineRuntime {
    orchestrator: Arc<CorrectionOrchestrator>,
    directory: Arc<dyn TableDirectory>,
    shutdown_tx: watch::Sender<bool>,
    cache_sweep: JoinHandle<Arc<JobMetrics>>,
    table_refresh: JoinHandle<Arc<JobMetrics>>,
}

impl PipelineRuntime {
    /// Validate the config, load the table snapshot and start the jobs.
    ///
    /// A failed initial table load aborts startup unless
    /// `table_gate_allow_unloaded` is set.
    pub async fn start(
        config: QuarryConfig,
        oracles: OracleRegistry,
        prompts: Arc<dyn PromptContextProvider>,
        connections: Arc<dyn ConnectionProvider>,
        directory: Arc<dyn TableDirectory>,
    ) -> QuarryResult<Self> {
        config.validate()?;

        let gate = Arc::new(TableGate::new(config.table_gate_allow_unloaded));
        if let Err(e) = gate.refresh(directory.as_ref()).await {
            if !config.table_gate_allow_unloaded {
                return Err(e);
            }
            tracing::warn!(error = %e, "starting without a table snapshot");
        }

        let cache = Arc::new(ResultCache::new(config.cache_ttl, config.cache_max_entries));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let cache_sweep = tokio::spawn(cache_sweep_task(
            Arc::clone(&cache),
            config.cache_sweep_interval,
            shutdown_rx.clone(),
        ));
        let table_refresh = tokio::spawn(table_refresh_task(
            Arc::clone(&gate),
            Arc::clone(&directory),
            config.table_refresh_interval,
            shutdown_rx,
        ));

        let orchestrator = Arc::new(CorrectionOrchestrator::new(
            config,
            Arc::new(oracles),
            prompts,
            connections,
            gate,
            cache,
        ));

        tracing::info!("pipeline runtime started");
        Ok(Self {
            orchestrator,
            directory,
            shutdown_tx,
            cache_sweep,
            table_refresh,
        })
    }

    /// Start against PostgreSQL using one pool for queries and table listing.
    pub async fn start_postgres(
        config: QuarryConfig,
        db: &DbConfig,
        oracles: OracleRegistry,
        prompts: Arc<dyn PromptContextProvider>,
    ) -> QuarryResult<Self> {
        let pool = db.create_pool()?;
        let connections = Arc::new(PgConnectionProvider::new(pool.clone()));
        let directory = Arc::new(PgTableDirectory::new(pool));
        Self::start(config, oracles, prompts, connections, directory).await
    }

    pub fn orchestrator(&self) -> &Arc<CorrectionOrchestrator> {
        &self.orchestrator
    }

    pub async fn process(&self, question: &Question) -> ProcessResponse {
        self.orchestrator.process(question).await
    }

    /// Reload the table snapshot now.
    pub async fn refresh_tables(&self) -> QuarryResult<usize> {
        self.orchestrator
            .table_gate()
            .refresh(self.directory.as_ref())
            .await
    }

    /// Stop the background jobs and drop cached results.
    pub async fn shutdown(self) -> RuntimeMetrics {
        let _ = self.shutdown_tx.send(true);

        let cache_sweep = match self.cache_sweep.await {
            Ok(metrics) => metrics.snapshot(),
            Err(e) => {
                tracing::error!(error = %e, "cache sweep task failed");
                JobMetricsSnapshot::default()
            }
        };
        let table_refresh = match self.table_refresh.await {
            Ok(metrics) => metrics.snapshot(),
            Err(e) => {
                tracing::error!(error = %e, "table refresh task failed");
                JobMetricsSnapshot::default()
            }
        };

        self.orchestrator.cache().clear();
        tracing::info!(
            swept = cache_sweep.items,
            refreshes = table_refresh.cycles,
            refresh_errors = table_refresh.errors,
            "pipeline runtime stopped"
        );

        RuntimeMetrics {
            cache_sweep,
            table_refresh,
        }
    }
}

impl std::fmt::Debug for PipelineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRuntime")
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}
