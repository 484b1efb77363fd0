//! Quarry Pipeline - natural-language question to safe, executed SQL
//!
//! The [`CorrectionOrchestrator`] classifies a question, asks the oracle for
//! SQL, and pushes each candidate through scrubbing, validation, the table
//! existence gate and the aggregation check before it can reach the
//! [`QueryExecutor`]. Recoverable failures are fed back to the oracle for up
//! to three attempts.
//!
//! [`PipelineRuntime`] owns the shared state and background jobs.

pub mod executor;
pub mod jobs;
pub mod orchestrator;
pub mod runtime;
pub mod taxonomy;
pub mod telemetry;

pub use executor::{enforce_limit, QueryExecutor};
pub use jobs::{cache_sweep_task, table_refresh_task, JobMetrics, JobMetricsSnapshot};
pub use orchestrator::{
    data_quality_for, feedback_text, Attempt, AttemptBudget, CorrectionOrchestrator,
    ACCESS_DENIED_SENTINEL,
};
pub use runtime::{PipelineRuntime, RuntimeMetrics};
pub use taxonomy::{classify_database_error, missing_table_name};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
