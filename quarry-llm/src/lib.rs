//! Quarry LLM - Oracle contracts
//!
//! The pipeline never writes SQL itself. It asks a [`SqlOracle`] for a
//! candidate statement and a [`PromptContextProvider`] for the schema text
//! placed ahead of the question. Implementations are registered explicitly
//! in an [`OracleRegistry`] keyed by model selector.

pub mod providers;

use async_trait::async_trait;
use quarry_core::{OracleError, QuarryResult};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// ORACLE TRAIT
// ============================================================================

/// Generative SQL oracle.
///
/// One call per attempt. Retry and backoff never live inside an oracle; the
/// correction loop owns retries.
#[async_trait]
pub trait SqlOracle: Send + Sync {
    /// Produce raw text that should contain a SQL statement.
    ///
    /// # Arguments
    /// * `system_context` - Schema description and rules for the caller's role
    /// * `question` - The user's question, possibly prefixed with an intent hint
    /// * `prior_error` - Why the previous attempt failed, if this is a retry
    async fn complete(
        &self,
        system_context: &str,
        question: &str,
        prior_error: Option<&str>,
    ) -> QuarryResult<String>;

    /// Model identifier this oracle serves (e.g. "deepseek-chat").
    fn model_id(&self) -> &str;
}

// ============================================================================
// PROMPT CONTEXT TRAIT
// ============================================================================

/// Supplies the opaque schema text injected ahead of the question.
#[async_trait]
pub trait PromptContextProvider: Send + Sync {
    async fn get_prompt_context(&self, relevant_tables: &[String]) -> QuarryResult<String>;
}

/// Prompt provider returning fixed text. Useful when the schema description
/// is assembled once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticPromptProvider {
    context: String,
}

impl StaticPromptProvider {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}

#[async_trait]
impl PromptContextProvider for StaticPromptProvider {
    async fn get_prompt_context(&self, relevant_tables: &[String]) -> QuarryResult<String> {
        if relevant_tables.is_empty() {
            return Ok(self.context.clone());
        }
        Ok(format!(
            "{}\n\nRelevant tables: {}",
            self.context,
            relevant_tables.join(", ")
        ))
    }
}

// ============================================================================
// ORACLE REGISTRY
// ============================================================================

/// Registry for SQL oracles keyed by model selector.
/// Oracles must be explicitly registered - no auto-discovery.
///
/// # Example
/// ```ignore
/// let mut registry = OracleRegistry::new();
/// registry.register(Arc::new(OpenAiCompatibleOracle::deepseek(api_key)));
/// registry.set_default("deepseek-chat");
///
/// let oracle = registry.resolve(question.model())?;
/// ```
pub struct OracleRegistry {
    oracles: HashMap<String, Arc<dyn SqlOracle>>,
    default_model: Option<String>,
}

impl OracleRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            oracles: HashMap::new(),
            default_model: None,
        }
    }

    /// Register an oracle under its own model id.
    /// Replaces any oracle previously registered for that model.
    /// The first registered oracle becomes the default.
    pub fn register(&mut self, oracle: Arc<dyn SqlOracle>) {
        let model = oracle.model_id().to_string();
        if self.default_model.is_none() {
            self.default_model = Some(model.clone());
        }
        self.oracles.insert(model, oracle);
    }

    /// Choose the oracle used for unknown model selectors.
    pub fn set_default(&mut self, model: impl Into<String>) {
        self.default_model = Some(model.into());
    }

    /// Oracle for `model`, falling back to the default.
    ///
    /// # Returns
    /// * `Err(QuarryError::Oracle(OracleError::ProviderNotConfigured))` - If
    ///   neither the model nor a default is registered
    pub fn resolve(&self, model: &str) -> QuarryResult<Arc<dyn SqlOracle>> {
        if let Some(oracle) = self.oracles.get(model) {
            return Ok(oracle.clone());
        }
        self.default_model
            .as_ref()
            .and_then(|m| self.oracles.get(m))
            .cloned()
            .ok_or_else(|| {
                OracleError::ProviderNotConfigured {
                    model: model.to_string(),
                }
                .into()
            })
    }

    /// Check if an oracle is registered for `model`.
    pub fn has(&self, model: &str) -> bool {
        self.oracles.contains_key(model)
    }

    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }
}

impl Default for OracleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OracleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut models: Vec<&String> = self.oracles.keys().collect();
        models.sort();
        f.debug_struct("OracleRegistry")
            .field("models", &models)
            .field("default_model", &self.default_model)
            .finish()
    }
}
