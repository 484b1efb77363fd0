//! Correction orchestrator: the bounded generate / validate / execute loop.
//!
//! Each question runs through an explicit state machine:
//!
//! ```text
//! GENERATING --oracle text--> EXECUTING --rows--> SUCCEEDED
//!     ^                          |
//!     +--recoverable failure-----+--budget spent or non-recoverable--> EXHAUSTED
//! ```
//!
//! The attempt budget is fixed when the question starts. A failed attempt
//! feeds its error back into the next oracle call.

use crate::executor::QueryExecutor;
use quarry_core::{
    CallerIdentity, ClassifiedIntent, CleanStatement, DataQuality, ErrorKind, ExecutionOutcome,
    ProcessResponse, QuarryConfig, QueryFailure, QuerySuccess, Question, QuestionId, Route,
    UserFacingError, ValidationReport, MAX_ATTEMPT_BUDGET,
};
use quarry_llm::{OracleRegistry, PromptContextProvider, SqlOracle};
use quarry_sql::{check_aggregation, scrub_detailed, IntentClassifier, SqlValidator};
use quarry_storage::{ConnectionProvider, ResultCache, ResultCacheKey, TableGate};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Marker the oracle is instructed to emit when the caller's role may not
/// see the requested data.
pub const ACCESS_DENIED_SENTINEL: &str = "ACCESS_DENIED_VIOLATION";

/// Table names listed in correction feedback after a TABLE_NOT_FOUND.
const FEEDBACK_TABLE_SAMPLE: usize = 50;

/// Immutable per-question attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget(u8);

impl AttemptBudget {
    /// Budget clamped into 1..=3.
    pub fn new(max_attempts: u8) -> Self {
        Self(max_attempts.clamp(1, MAX_ATTEMPT_BUDGET))
    }

    pub fn max_attempts(&self) -> u8 {
        self.0
    }

    /// Whether attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u8) -> bool {
        attempt >= 1 && attempt <= self.0
    }
}

/// One generate / validate / execute cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub number: u8,
    /// Raw oracle text; empty when the oracle call itself failed
    pub candidate: String,
    pub statement: Option<CleanStatement>,
    pub report: Option<ValidationReport>,
    pub outcome: ExecutionOutcome,
}

#[derive(Debug)]
enum PipelineState {
    Generating {
        attempt: u8,
        feedback: Option<String>,
    },
    Executing {
        attempt: u8,
        raw: String,
    },
    Succeeded {
        attempt: u8,
        success: QuerySuccess,
        sql: String,
    },
    Exhausted {
        attempts: u8,
        failure: QueryFailure,
    },
}

/// Removes a question id from the in-flight set on drop.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<QuestionId>>,
    id: QuestionId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<QuestionId>>, id: QuestionId) -> Option<Self> {
        let mut active = match set.lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("in-flight set lock poisoned, refusing question");
                return None;
            }
        };
        if !active.insert(id) {
            return None;
        }
        Some(Self { set, id })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut active) = self.set.lock() {
            active.remove(&self.id);
        }
    }
}

/// Drives questions through classification, generation, the safety stages
/// and execution.
pub struct CorrectionOrchestrator {
    classifier: IntentClassifier,
    validator: SqlValidator,
    oracles: Arc<OracleRegistry>,
    prompts: Arc<dyn PromptContextProvider>,
    gate: Arc<TableGate>,
    cache: Arc<ResultCache>,
    executor: QueryExecutor,
    config: QuarryConfig,
    in_flight: Mutex<HashSet<QuestionId>>,
}

impl CorrectionOrchestrator {
    pub fn new(
        config: QuarryConfig,
        oracles: Arc<OracleRegistry>,
        prompts: Arc<dyn PromptContextProvider>,
        connections: Arc<dyn ConnectionProvider>,
        gate: Arc<TableGate>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            validator: SqlValidator::new(config.large_limit_warning),
            oracles,
            prompts,
            gate,
            cache,
            executor: QueryExecutor::new(connections, config.row_limit),
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn table_gate(&self) -> &Arc<TableGate> {
        &self.gate
    }

    /// Process a question with the configured attempt budget.
    pub async fn process(&self, question: &Question) -> ProcessResponse {
        self.process_with_budget(question, self.config.effective_attempt_budget())
            .await
    }

    pub async fn process_with_budget(&self, question: &Question, budget: u8) -> ProcessResponse {
        self.process_traced(question, AttemptBudget::new(budget)).await.0
    }

    /// Process a question and also return every attempt made.
    pub async fn process_traced(
        &self,
        question: &Question,
        budget: AttemptBudget,
    ) -> (ProcessResponse, Vec<Attempt>) {
        let intent = self.classifier.classify(question.text());
        let span = tracing::info_span!(
            "process_question",
            question_id = %question.id(),
            role = question.identity().role.as_db_str(),
            intent = intent.intent.as_str(),
        );
        self.run(question, intent, budget).instrument(span).await
    }

    /// Run the question on a detached task. Dropping the handle does not
    /// cancel in-flight oracle or database calls; their result is discarded.
    pub fn spawn_process(self: &Arc<Self>, question: Question) -> JoinHandle<ProcessResponse> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.process(&question).await })
    }

    async fn run(
        &self,
        question: &Question,
        intent: ClassifiedIntent,
        budget: AttemptBudget,
    ) -> (ProcessResponse, Vec<Attempt>) {
        if !self.classifier.requires_database(&intent) {
            tracing::info!("answering conversationally");
            return (conversational(question, intent), Vec::new());
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, question.id()) else {
            tracing::warn!("question already in flight, refusing");
            let failure = QueryFailure::new(ErrorKind::ExecutionError, "duplicate in-flight question")
                .with_user_message("This question is already being processed.");
            return (failed(question, intent, 0, &failure), Vec::new());
        };

        let oracle = match self.oracles.resolve(question.model()) {
            Ok(oracle) => oracle,
            Err(e) => return self.setup_failed(question, intent, e.to_string()),
        };

        let relevant_tables: Vec<String> = intent.table_hint.iter().cloned().collect();
        let context = match self.prompts.get_prompt_context(&relevant_tables).await {
            Ok(context) => context,
            Err(e) => return self.setup_failed(question, intent, e.to_string()),
        };

        let prompt = match &intent.prompt_hint {
            Some(hint) => format!("{}\n\n{}", hint, question.text()),
            None => question.text().to_string(),
        };

        let mut attempts = Vec::with_capacity(usize::from(budget.max_attempts()));
        let mut state = PipelineState::Generating {
            attempt: 1,
            feedback: None,
        };

        loop {
            state = match state {
                PipelineState::Generating { attempt, feedback } => {
                    tracing::debug!(attempt, retry = feedback.is_some(), "generating");
                    match self
                        .generate(oracle.as_ref(), &context, &prompt, feedback.as_deref())
                        .await
                    {
                        Ok(raw) => PipelineState::Executing { attempt, raw },
                        Err(failure) => {
                            attempts.push(Attempt {
                                number: attempt,
                                candidate: String::new(),
                                statement: None,
                                report: None,
                                outcome: ExecutionOutcome::Failure(failure.clone()),
                            });
                            next_after_failure(budget, attempt, failure)
                        }
                    }
                }
                PipelineState::Executing { attempt, raw } => {
                    let record = self.run_stages(attempt, raw, question.identity()).await;
                    let next = match (&record.outcome, &record.statement) {
                        (ExecutionOutcome::Success(success), Some(statement)) => {
                            PipelineState::Succeeded {
                                attempt,
                                success: success.clone(),
                                sql: statement.as_str().to_string(),
                            }
                        }
                        (ExecutionOutcome::Failure(failure), _) => {
                            next_after_failure(budget, attempt, failure.clone())
                        }
                        (ExecutionOutcome::Success(_), None) => next_after_failure(
                            budget,
                            attempt,
                            QueryFailure::new(ErrorKind::ExecutionError, "success without a statement"),
                        ),
                    };
                    attempts.push(record);
                    next
                }
                PipelineState::Succeeded {
                    attempt,
                    success,
                    sql,
                } => {
                    return (self.succeeded(question, intent, attempt, success, sql), attempts);
                }
                PipelineState::Exhausted { attempts: used, failure } => {
                    return (self.exhausted(question, intent, used, failure), attempts);
                }
            };
        }
    }

    /// Oracle or prompt context unavailable: the first attempt fails before
    /// generation and nothing is retried.
    fn setup_failed(
        &self,
        question: &Question,
        intent: ClassifiedIntent,
        detail: String,
    ) -> (ProcessResponse, Vec<Attempt>) {
        let failure = QueryFailure::new(ErrorKind::GenerationFailed, detail);
        let attempt = Attempt {
            number: 1,
            candidate: String::new(),
            statement: None,
            report: None,
            outcome: ExecutionOutcome::Failure(failure.clone()),
        };
        (self.exhausted(question, intent, 1, failure), vec![attempt])
    }

    async fn generate(
        &self,
        oracle: &dyn SqlOracle,
        context: &str,
        prompt: &str,
        feedback: Option<&str>,
    ) -> Result<String, QueryFailure> {
        oracle
            .complete(context, prompt, feedback)
            .await
            .map_err(|e| QueryFailure::new(ErrorKind::GenerationFailed, e.to_string()))
    }

    /// Scrub, validate, gate, aggregation check, cache, execute. Stops at the
    /// first failing stage.
    async fn run_stages(&self, number: u8, raw: String, identity: &CallerIdentity) -> Attempt {
        let mut attempt = Attempt {
            number,
            candidate: raw,
            statement: None,
            report: None,
            outcome: ExecutionOutcome::failure(ErrorKind::ExecutionError, "not executed"),
        };

        if attempt.candidate.contains(ACCESS_DENIED_SENTINEL) {
            attempt.outcome = ExecutionOutcome::failure(
                ErrorKind::AccessDenied,
                "oracle refused: data outside the caller's role",
            );
            return attempt;
        }

        let statement = match scrub_detailed(&attempt.candidate) {
            Ok(statement) => statement,
            Err(rejection) => {
                attempt.outcome = ExecutionOutcome::failure(rejection.error_kind(), rejection.detail());
                return attempt;
            }
        };
        attempt.statement = Some(statement.clone());

        let report = self.validator.validate(statement.as_str());
        for warning in &report.warnings {
            tracing::info!(warning = %warning, "validation warning");
        }
        attempt.report = Some(report.clone());

        if let Some(failure) = validation_failure(&report) {
            attempt.outcome = ExecutionOutcome::Failure(failure);
            return attempt;
        }

        let tables = self.gate.check(&report.referenced_tables);
        if !tables.valid {
            attempt.outcome = ExecutionOutcome::Failure(self.missing_tables_failure(&tables.missing));
            return attempt;
        }

        let aggregation = check_aggregation(statement.as_str());
        if aggregation.has_issue {
            let columns = aggregation.missing_columns.join(", ");
            attempt.outcome = ExecutionOutcome::failure(
                ErrorKind::GroupByError,
                format!(
                    "Non-aggregated columns missing from GROUP BY: {}. Add them to GROUP BY or wrap them in an aggregate.",
                    columns
                ),
            );
            return attempt;
        }

        let key = ResultCacheKey::new(statement.as_str(), identity);
        if let Some(ExecutionOutcome::Success(mut cached)) = self.cache.get(&key) {
            tracing::info!(key = %key, "result cache hit");
            cached.cached = true;
            attempt.outcome = ExecutionOutcome::Success(cached);
            return attempt;
        }

        let outcome = self.executor.execute(&statement).await;
        if outcome.is_success() {
            self.cache.put(key, outcome.clone());
        }
        attempt.outcome = outcome;
        attempt
    }

    fn missing_tables_failure(&self, missing: &[String]) -> QueryFailure {
        let available = self.gate.available_tables();
        let sample: Vec<&str> = available
            .iter()
            .take(FEEDBACK_TABLE_SAMPLE)
            .map(String::as_str)
            .collect();
        let listed = missing.join(", ");
        QueryFailure::new(
            ErrorKind::TableNotFound,
            format!(
                "Tables not found: {}. Available tables include: {}",
                listed,
                sample.join(", ")
            ),
        )
        .with_user_message(format!(
            "The query referenced tables that do not exist: {}.",
            listed
        ))
    }

    fn succeeded(
        &self,
        question: &Question,
        intent: ClassifiedIntent,
        attempt: u8,
        success: QuerySuccess,
        sql: String,
    ) -> ProcessResponse {
        let empty = success.is_empty();
        let confidence = self.config.confidence_for(attempt, empty);
        let data_quality = data_quality_for(attempt, empty);

        tracing::info!(
            attempt,
            row_count = success.row_count,
            cached = success.cached,
            confidence,
            data_quality = data_quality.as_str(),
            "question succeeded"
        );

        ProcessResponse {
            question_id: question.id(),
            route: Route::Database,
            answer_payload: Value::Array(success.rows.into_iter().map(Value::Object).collect()),
            row_count: success.row_count,
            confidence,
            data_quality,
            attempt_count: attempt,
            intent,
            sql: Some(sql),
            cached: success.cached,
            error: None,
        }
    }

    fn exhausted(
        &self,
        question: &Question,
        intent: ClassifiedIntent,
        attempts: u8,
        failure: QueryFailure,
    ) -> ProcessResponse {
        tracing::error!(
            attempts,
            kind = %failure.kind,
            detail = %failure.technical_detail,
            "attempt budget exhausted"
        );
        failed(question, intent, attempts, &failure)
    }
}

impl std::fmt::Debug for CorrectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrectionOrchestrator")
            .field("oracles", &self.oracles)
            .field("executor", &self.executor)
            .field("config", &self.config)
            .finish()
    }
}

fn next_after_failure(budget: AttemptBudget, attempt: u8, failure: QueryFailure) -> PipelineState {
    tracing::warn!(
        attempt,
        kind = %failure.kind,
        detail = %failure.technical_detail,
        "attempt failed"
    );

    if failure.kind.is_recoverable() && budget.allows(attempt + 1) {
        PipelineState::Generating {
            attempt: attempt + 1,
            feedback: Some(feedback_text(&failure)),
        }
    } else {
        PipelineState::Exhausted {
            attempts: attempt,
            failure,
        }
    }
}

/// Error context handed to the oracle for the next attempt.
pub fn feedback_text(failure: &QueryFailure) -> String {
    format!("{}: {}", failure.kind.as_code(), failure.technical_detail)
}

fn validation_failure(report: &ValidationReport) -> Option<QueryFailure> {
    if report.is_valid {
        return None;
    }
    if !report.is_read_only {
        return Some(QueryFailure::new(
            ErrorKind::UnsafeQuery,
            "Statement is not read-only or contains a destructive keyword",
        ));
    }
    let detail = if report.structural_errors.is_empty() {
        format!("Unsupported statement type: {}", report.query_type.as_str())
    } else {
        report.structural_errors.join("; ")
    };
    Some(QueryFailure::new(ErrorKind::SyntaxError, detail))
}

/// Zero rows is `empty` on any attempt; a later-attempt success is
/// `partial`; a first-attempt success with rows is `complete`.
pub fn data_quality_for(attempt: u8, empty: bool) -> DataQuality {
    if empty {
        DataQuality::Empty
    } else if attempt > 1 {
        DataQuality::Partial
    } else {
        DataQuality::Complete
    }
}

fn conversational(question: &Question, intent: ClassifiedIntent) -> ProcessResponse {
    ProcessResponse {
        question_id: question.id(),
        route: Route::Conversational,
        answer_payload: Value::Null,
        row_count: 0,
        confidence: intent.confidence,
        data_quality: DataQuality::Complete,
        attempt_count: 0,
        intent,
        sql: None,
        cached: false,
        error: None,
    }
}

fn failed(
    question: &Question,
    intent: ClassifiedIntent,
    attempts: u8,
    failure: &QueryFailure,
) -> ProcessResponse {
    ProcessResponse {
        question_id: question.id(),
        route: Route::Database,
        answer_payload: Value::Null,
        row_count: 0,
        confidence: 0.0,
        data_quality: DataQuality::Failed,
        attempt_count: attempts,
        intent,
        sql: None,
        cached: false,
        error: Some(UserFacingError::from(failure)),
    }
}
