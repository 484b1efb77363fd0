#![allow(dead_code)]

use quarry_core::{QuarryConfig, Row};
use quarry_llm::{OracleRegistry, SqlOracle, StaticPromptProvider};
use quarry_pipeline::CorrectionOrchestrator;
use quarry_storage::{ResultCache, TableGate};
use quarry_test_utils::fixtures;
use quarry_test_utils::{ScriptedConnectionProvider, ScriptedOracle};
use std::sync::Arc;

pub const SCHEMA_CONTEXT: &str = "Tables: users(id, name, college_id), colleges(id, name)";

pub struct Harness {
    pub orchestrator: Arc<CorrectionOrchestrator>,
    pub oracle: Arc<ScriptedOracle>,
    pub db: ScriptedConnectionProvider,
    pub cache: Arc<ResultCache>,
}

/// Orchestrator over a scripted oracle and database, default tables loaded.
pub fn harness(responses: &[&str], rows: Vec<Row>) -> Harness {
    harness_with_oracle(Arc::new(ScriptedOracle::new(responses.iter().copied())), rows)
}

pub fn harness_with_oracle(oracle: Arc<ScriptedOracle>, rows: Vec<Row>) -> Harness {
    let mut registry = OracleRegistry::new();
    registry.register(oracle.clone());
    let db = ScriptedConnectionProvider::returning(rows);
    let (orchestrator, cache) = build(Arc::new(registry), db.clone(), fixtures::test_config());
    Harness {
        orchestrator,
        oracle,
        db,
        cache,
    }
}

pub fn build(
    registry: Arc<OracleRegistry>,
    db: ScriptedConnectionProvider,
    config: QuarryConfig,
) -> (Arc<CorrectionOrchestrator>, Arc<ResultCache>) {
    let gate = Arc::new(TableGate::with_tables(fixtures::default_tables()));
    let cache = Arc::new(ResultCache::new(config.cache_ttl, config.cache_max_entries));
    let orchestrator = CorrectionOrchestrator::new(
        config,
        registry,
        Arc::new(StaticPromptProvider::new(SCHEMA_CONTEXT)),
        Arc::new(db),
        gate,
        Arc::clone(&cache),
    );
    (Arc::new(orchestrator), cache)
}

/// Registry holding a single oracle.
pub fn registry_with(oracle: Arc<dyn SqlOracle>) -> Arc<OracleRegistry> {
    let mut registry = OracleRegistry::new();
    registry.register(oracle);
    Arc::new(registry)
}
