//! End-to-end behaviour of the correction loop over scripted collaborators.

mod common;

use async_trait::async_trait;
use common::{build, harness, harness_with_oracle, registry_with};
use quarry_core::{
    DataQuality, DatabaseError, ErrorKind, IntentTag, QuarryResult, Question, Route,
};
use quarry_llm::SqlOracle;
use quarry_pipeline::{AttemptBudget, ACCESS_DENIED_SENTINEL};
use quarry_test_utils::assertions::{assert_confidence, assert_failed_with, assert_succeeded};
use quarry_test_utils::fixtures::{self, admin_identity, count_row, user_rows};
use quarry_test_utils::{ScriptedConnectionProvider, ScriptedOracle};
use std::sync::Arc;
use tokio::sync::Notify;

fn ask(text: &str) -> Question {
    Question::new(text, admin_identity())
}

#[tokio::test]
async fn simple_count_succeeds_on_first_attempt() {
    let h = harness(&["SELECT COUNT(*) FROM users;"], count_row(42));
    let response = h.orchestrator.process(&ask("How many users are there?")).await;

    assert_succeeded(&response);
    assert_eq!(response.intent.intent, IntentTag::SimpleCount);
    assert_eq!(response.attempt_count, 1);
    assert_eq!(response.row_count, 1);
    assert_eq!(response.data_quality, DataQuality::Complete);
    assert_confidence(&response, 1.0);
    assert_eq!(response.answer_payload[0]["count"], 42);
    assert_eq!(response.sql.as_deref(), Some("SELECT COUNT(*) FROM users"));
    assert_eq!(h.db.executed(), vec!["SELECT COUNT(*) FROM users LIMIT 1000"]);
}

#[tokio::test]
async fn truncated_statement_is_regenerated_with_feedback() {
    let h = harness(
        &[
            "SELECT * FROM users WHERE (id = 1",
            "SELECT * FROM users WHERE (id = 1)",
        ],
        user_rows(1),
    );
    let response = h.orchestrator.process(&ask("Show user 1")).await;

    assert_succeeded(&response);
    assert_eq!(response.attempt_count, 2);
    assert_eq!(response.data_quality, DataQuality::Partial);
    assert_confidence(&response, 0.8);

    let calls = h.oracle.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].prior_error, None);
    let feedback = calls[1].prior_error.as_deref().unwrap();
    assert!(feedback.starts_with("QUERY_TRUNCATED"));
    // The truncated statement never reached the database.
    assert_eq!(h.db.execution_count(), 1);
}

#[tokio::test]
async fn three_invalid_statements_exhaust_the_budget() {
    let h = harness(
        &[
            "SELECT CAST(score) FROM users",
            "SELECT CAST(score) FROM users",
            "SELECT CAST(score) FROM users",
        ],
        user_rows(1),
    );
    let (response, attempts) = h
        .orchestrator
        .process_traced(&ask("List user scores"), AttemptBudget::new(3))
        .await;

    assert_failed_with(&response, ErrorKind::SyntaxError);
    assert_eq!(response.attempt_count, 3);
    assert_eq!(response.data_quality, DataQuality::Failed);
    assert!(response.answer_payload.is_null());
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.report.as_ref().is_some_and(|r| !r.is_valid)));
    assert_eq!(h.db.execution_count(), 0);
    assert_eq!(h.oracle.call_count(), 3);
}

#[tokio::test]
async fn empty_result_is_penalized() {
    let h = harness(&["SELECT name FROM users WHERE college_id = 99"], vec![]);
    let response = h.orchestrator.process(&ask("List users in college 99")).await;

    assert_succeeded(&response);
    assert_eq!(response.row_count, 0);
    assert_eq!(response.data_quality, DataQuality::Empty);
    assert_confidence(&response, 0.8);
}

#[tokio::test]
async fn empty_result_on_second_attempt_compounds() {
    let h = harness(&["SELECT name FROM userz", "SELECT name FROM users"], vec![]);
    let response = h.orchestrator.process(&ask("List users")).await;

    assert_eq!(response.attempt_count, 2);
    assert_eq!(response.data_quality, DataQuality::Empty);
    assert_confidence(&response, 0.8 * 0.8);
}

#[tokio::test]
async fn missing_table_feedback_names_it() {
    let h = harness(&["SELECT * FROM userz", "SELECT * FROM users"], user_rows(2));
    let response = h.orchestrator.process(&ask("List all users")).await;

    assert_succeeded(&response);
    assert_eq!(response.attempt_count, 2);
    let feedback = h.oracle.calls()[1].prior_error.clone().unwrap();
    assert!(feedback.starts_with("TABLE_NOT_FOUND"));
    assert!(feedback.contains("userz"));
    assert!(feedback.contains("users"));
    assert_eq!(h.db.execution_count(), 1);
}

#[tokio::test]
async fn group_by_mismatch_is_caught_before_execution() {
    let h = harness(
        &[
            "SELECT name, college_id, COUNT(*) FROM users GROUP BY name",
            "SELECT name, college_id, COUNT(*) FROM users GROUP BY name, college_id",
        ],
        count_row(1),
    );
    let response = h.orchestrator.process(&ask("Count users per name and college")).await;

    assert_succeeded(&response);
    let feedback = h.oracle.calls()[1].prior_error.clone().unwrap();
    assert!(feedback.starts_with("GROUP_BY_ERROR"));
    assert!(feedback.contains("college_id"));
    assert_eq!(h.db.execution_count(), 1);
}

#[tokio::test]
async fn driver_error_feeds_back_and_recovers() {
    let h = harness(
        &["SELECT nme FROM users", "SELECT name FROM users"],
        user_rows(3),
    );
    h.db.push_result(Err(DatabaseError::driver(
        Some("42703"),
        "column \"nme\" does not exist",
    )));
    let response = h.orchestrator.process(&ask("List user names")).await;

    assert_succeeded(&response);
    assert_eq!(response.row_count, 3);
    let feedback = h.oracle.calls()[1].prior_error.clone().unwrap();
    assert!(feedback.starts_with("SYNTAX_ERROR"));
    assert_eq!(h.db.execution_count(), 2);
}

#[tokio::test]
async fn access_denied_sentinel_stops_immediately() {
    let h = harness(
        &[ACCESS_DENIED_SENTINEL, "SELECT * FROM users"],
        user_rows(1),
    );
    let response = h.orchestrator.process(&ask("Show every student's password")).await;

    assert_failed_with(&response, ErrorKind::AccessDenied);
    assert_eq!(response.attempt_count, 1);
    assert_eq!(h.oracle.call_count(), 1);
    assert_eq!(h.db.execution_count(), 0);
}

#[tokio::test]
async fn connection_loss_is_not_retried() {
    let h = harness(&["SELECT * FROM users", "SELECT * FROM users"], user_rows(1));
    h.db.set_unavailable(true);
    let response = h.orchestrator.process(&ask("List users")).await;

    assert_failed_with(&response, ErrorKind::ConnectionError);
    assert_eq!(response.attempt_count, 1);
    assert_eq!(h.oracle.call_count(), 1);
    let error = response.error.unwrap();
    assert!(!error.message.contains("refused"));
}

#[tokio::test]
async fn destructive_statement_is_never_executed() {
    let h = harness(
        &[
            "DELETE FROM users",
            "SELECT name FROM users WHERE id IN (DELETE FROM users RETURNING id)",
            "SELECT name FROM users",
        ],
        user_rows(1),
    );
    let (response, attempts) = h
        .orchestrator
        .process_traced(&ask("List users"), AttemptBudget::new(3))
        .await;

    assert_succeeded(&response);
    assert_eq!(response.attempt_count, 3);
    assert_eq!(
        attempts[0].outcome.as_failure().map(|f| f.kind),
        Some(ErrorKind::UnsafeQuery)
    );
    assert!(attempts[0].statement.is_none());
    assert_eq!(
        attempts[1].outcome.as_failure().map(|f| f.kind),
        Some(ErrorKind::UnsafeQuery)
    );
    assert!(attempts[1].report.as_ref().is_some_and(|r| !r.is_read_only));
    assert_eq!(h.db.executed(), vec!["SELECT name FROM users LIMIT 1000"]);
}

#[tokio::test]
async fn oracle_failure_is_retried_as_generation_failure() {
    let oracle = Arc::new(
        ScriptedOracle::new(Vec::<String>::new())
            .then_fail("HTTP 503: overloaded")
            .then_respond("SELECT COUNT(*) FROM users"),
    );
    let h = harness_with_oracle(oracle, count_row(7));
    let response = h.orchestrator.process(&ask("How many users are there?")).await;

    assert_succeeded(&response);
    assert_eq!(response.attempt_count, 2);
    let calls = h.oracle.calls();
    assert!(calls[1].prior_error.as_deref().unwrap().starts_with("GENERATION_FAILED"));
}

#[tokio::test]
async fn oracle_failing_every_attempt_exhausts() {
    let oracle = Arc::new(ScriptedOracle::new(Vec::<String>::new()).then_fail("HTTP 503"));
    let h = harness_with_oracle(oracle, count_row(7));
    let response = h.orchestrator.process(&ask("How many users are there?")).await;

    assert_failed_with(&response, ErrorKind::GenerationFailed);
    assert_eq!(response.attempt_count, 3);
    assert_eq!(h.oracle.call_count(), 3);
    assert_eq!(h.db.acquisitions(), 0);
}

#[tokio::test]
async fn budget_of_one_allows_a_single_attempt() {
    let h = harness(
        &["SELECT * FROM users WHERE (id = 1", "SELECT * FROM users"],
        user_rows(1),
    );
    let response = h
        .orchestrator
        .process_with_budget(&ask("Show user 1"), 1)
        .await;

    assert_failed_with(&response, ErrorKind::QueryTruncated);
    assert_eq!(response.attempt_count, 1);
    assert_eq!(h.oracle.call_count(), 1);
}

#[tokio::test]
async fn general_knowledge_skips_the_database() {
    let h = harness(&["SELECT 1"], count_row(1));
    let response = h.orchestrator.process(&ask("What is recursion in python?")).await;

    assert_eq!(response.route, Route::Conversational);
    assert_eq!(response.intent.intent, IntentTag::GeneralKnowledge);
    assert_eq!(response.attempt_count, 0);
    assert!(!response.is_success());
    assert_eq!(h.oracle.call_count(), 0);
    assert_eq!(h.db.acquisitions(), 0);
}

#[tokio::test]
async fn intent_hint_and_context_reach_the_oracle() {
    let h = harness(
        &["SELECT name FROM course_wise_segregations ORDER BY rank LIMIT 5"],
        user_rows(5),
    );
    let response = h.orchestrator.process(&ask("Who are the top 5 students in java?")).await;

    assert_succeeded(&response);
    assert_eq!(response.intent.intent, IntentTag::TopPerformer);
    let call = &h.oracle.calls()[0];
    assert!(call.system_context.starts_with(common::SCHEMA_CONTEXT));
    assert!(call.system_context.contains("course_wise_segregations"));
    assert!(call.question.starts_with("HINT:"));
    assert!(call.question.ends_with("Who are the top 5 students in java?"));
}

#[tokio::test]
async fn unknown_model_falls_back_to_default_oracle() {
    let h = harness(&["SELECT COUNT(*) FROM users"], count_row(1));
    let question = ask("How many users are there?").with_model("gpt-unknown");
    let response = h.orchestrator.process(&question).await;

    assert_succeeded(&response);
    assert_eq!(h.oracle.call_count(), 1);
}

#[tokio::test]
async fn missing_oracle_fails_without_retrying() {
    let db = ScriptedConnectionProvider::returning(count_row(1));
    let (orchestrator, _) = build(
        Arc::new(quarry_llm::OracleRegistry::new()),
        db.clone(),
        fixtures::test_config(),
    );
    let (response, attempts) = orchestrator
        .process_traced(&ask("How many users are there?"), AttemptBudget::new(3))
        .await;

    assert_failed_with(&response, ErrorKind::GenerationFailed);
    assert_eq!(response.attempt_count, 1);
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].number, 1);
    assert_eq!(
        attempts[0].outcome.as_failure().map(|f| f.kind),
        Some(ErrorKind::GenerationFailed)
    );
    assert_eq!(db.acquisitions(), 0);
}

#[tokio::test]
async fn correlated_subquery_column_passes_on_first_attempt() {
    let h = harness(
        &["SELECT u.name, (SELECT COUNT(*) FROM batches b WHERE b.user_id = u.id) AS n FROM users u"],
        user_rows(2),
    );
    let response = h.orchestrator.process(&ask("List users with their batch counts")).await;

    assert_succeeded(&response);
    assert_eq!(response.attempt_count, 1);
    assert_eq!(h.oracle.call_count(), 1);
}

#[tokio::test]
async fn plural_domain_nouns_route_to_the_database() {
    let h = harness(&["SELECT name FROM batches"], user_rows(1));
    let response = h
        .orchestrator
        .process(&ask("What is the difference between batches and sections?"))
        .await;

    assert_eq!(response.route, Route::Database);
    assert_eq!(h.oracle.call_count(), 1);
}

/// Oracle that blocks until released.
struct GatedOracle {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl SqlOracle for GatedOracle {
    async fn complete(&self, _: &str, _: &str, _: Option<&str>) -> QuarryResult<String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("SELECT COUNT(*) FROM users".to_string())
    }

    fn model_id(&self) -> &str {
        quarry_core::DEFAULT_MODEL
    }
}

#[tokio::test]
async fn concurrent_process_of_same_question_is_refused() {
    let oracle = Arc::new(GatedOracle {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let db = ScriptedConnectionProvider::returning(count_row(1));
    let (orchestrator, _) = build(registry_with(oracle.clone()), db.clone(), fixtures::test_config());

    let question = ask("How many users are there?");
    let first = orchestrator.spawn_process(question.clone());
    oracle.entered.notified().await;

    let second = orchestrator.process(&question).await;
    assert_failed_with(&second, ErrorKind::ExecutionError);
    assert_eq!(second.attempt_count, 0);

    oracle.release.notify_one();
    let first = first.await.unwrap();
    assert_succeeded(&first);
    assert_eq!(db.execution_count(), 1);

    // Once the first sequence finished the id is free again.
    oracle.release.notify_one();
    let again = orchestrator.process(&question).await;
    assert_succeeded(&again);
}
