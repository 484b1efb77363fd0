//! Quarry Test Utilities
//!
//! Shared test infrastructure for the Quarry workspace:
//! - Scripted collaborators (oracle, connection provider, table directory)
//! - Proptest generators for identities and SQL shapes
//! - Fixtures for common scenarios
//! - Assertions over `ProcessResponse`

pub use quarry_core::{
    CallerIdentity, DataQuality, DatabaseError, ErrorKind, ProcessResponse, QuarryConfig,
    QuarryError, QuarryResult, Question, Role, Route, Row, DEFAULT_MODEL,
};

use async_trait::async_trait;
use quarry_core::{DirectoryError, OracleError};
use quarry_llm::SqlOracle;
use quarry_storage::{ConnectionProvider, ReadConnection, TableDirectory};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// SCRIPTED ORACLE
// ============================================================================

/// One recorded oracle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleCall {
    pub system_context: String,
    pub question: String,
    pub prior_error: Option<String>,
}

/// Oracle that replays a fixed script of completions and records each call.
///
/// `Err` entries become `OracleError::RequestFailed`. Once the script runs
/// out every call fails.
#[derive(Debug)]
pub struct ScriptedOracle {
    model_id: String,
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<OracleCall>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model_id: DEFAULT_MODEL.to_string(),
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Append a failing call to the script.
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Err(message.into()));
        self
    }

    /// Append a successful completion to the script.
    pub fn then_respond(self, text: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SqlOracle for ScriptedOracle {
    async fn complete(
        &self,
        system_context: &str,
        question: &str,
        prior_error: Option<&str>,
    ) -> QuarryResult<String> {
        self.calls.lock().unwrap().push(OracleCall {
            system_context: system_context.to_string(),
            question: question.to_string(),
            prior_error: prior_error.map(str::to_string),
        });

        match self.script.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(OracleError::RequestFailed {
                provider: "scripted".to_string(),
                message,
            }
            .into()),
            None => Err(OracleError::RequestFailed {
                provider: "scripted".to_string(),
                message: "script exhausted".to_string(),
            }
            .into()),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// SCRIPTED DATABASE
// ============================================================================

/// Connection provider returning scripted results in order, then a default.
///
/// Every executed statement is recorded, so tests can assert that nothing
/// reached the database or that a cached statement ran only once.
#[derive(Debug, Clone)]
pub struct ScriptedConnectionProvider {
    inner: Arc<ScriptedDb>,
}

#[derive(Debug)]
struct ScriptedDb {
    script: Mutex<VecDeque<Result<Vec<Row>, DatabaseError>>>,
    default_rows: Vec<Row>,
    executed: Mutex<Vec<String>>,
    acquisitions: AtomicUsize,
    unavailable: AtomicBool,
}

impl ScriptedConnectionProvider {
    /// Every statement returns `rows` unless scripted otherwise.
    pub fn returning(rows: Vec<Row>) -> Self {
        Self {
            inner: Arc::new(ScriptedDb {
                script: Mutex::new(VecDeque::new()),
                default_rows: rows,
                executed: Mutex::new(Vec::new()),
                acquisitions: AtomicUsize::new(0),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a result for the next execution.
    pub fn push_result(&self, result: Result<Vec<Row>, DatabaseError>) {
        self.inner.script.lock().unwrap().push_back(result);
    }

    /// Make `acquire` fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn executed(&self) -> Vec<String> {
        self.inner.executed.lock().unwrap().clone()
    }

    pub fn execution_count(&self) -> usize {
        self.inner.executed.lock().unwrap().len()
    }

    pub fn acquisitions(&self) -> usize {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedConnectionProvider {
    async fn acquire(&self) -> Result<Box<dyn ReadConnection>, DatabaseError> {
        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::ConnectionUnavailable {
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(ScriptedConnection {
            db: Arc::clone(&self.inner),
        }))
    }
}

struct ScriptedConnection {
    db: Arc<ScriptedDb>,
}

#[async_trait]
impl ReadConnection for ScriptedConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, DatabaseError> {
        self.db.executed.lock().unwrap().push(sql.to_string());
        match self.db.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.db.default_rows.clone()),
        }
    }
}

// ============================================================================
// STATIC TABLE DIRECTORY
// ============================================================================

/// Table directory over a fixed set of names. Can be switched to fail.
#[derive(Debug)]
pub struct StaticTableDirectory {
    tables: Mutex<HashSet<String>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StaticTableDirectory {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: Mutex::new(tables.into_iter().map(Into::into).collect()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn add_table(&self, table: impl Into<String>) {
        self.tables.lock().unwrap().insert(table.into());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TableDirectory for StaticTableDirectory {
    async fn list_tables(&self) -> QuarryResult<HashSet<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DirectoryError::ListingFailed {
                reason: "directory offline".to_string(),
            }
            .into());
        }
        Ok(self.tables.lock().unwrap().clone())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for identities and SQL shapes.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::SuperAdmin),
            Just(Role::Admin),
            Just(Role::CollegeAdmin),
            Just(Role::Staff),
            Just(Role::Trainer),
            Just(Role::ContentCreator),
            Just(Role::Student),
        ]
    }

    pub fn arb_identity() -> impl Strategy<Value = CallerIdentity> {
        (
            arb_role(),
            "[a-z0-9]{1,12}",
            prop::collection::vec("[a-z]{2,8}", 0..3),
        )
            .prop_map(|(role, user, scopes)| {
                scopes
                    .into_iter()
                    .fold(CallerIdentity::new(role, user), |id, s| id.with_scope(s))
            })
    }

    pub fn arb_identifier() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,10}".prop_filter("not a keyword", |s| {
            !matches!(
                s.as_str(),
                "select" | "from" | "where" | "join" | "on" | "as" | "by" | "in" | "is" | "or"
                    | "and" | "not" | "group" | "order" | "limit" | "having" | "with" | "union"
            )
        })
    }

    /// Simple balanced SELECT over one table.
    pub fn arb_select_sql() -> impl Strategy<Value = String> {
        (arb_identifier(), arb_identifier(), 0u32..1000).prop_map(|(col, table, n)| {
            format!("SELECT {col} FROM {table} WHERE ({col} > {n})")
        })
    }

    /// SELECT with more opening than closing parentheses.
    pub fn arb_unbalanced_sql() -> impl Strategy<Value = String> {
        (arb_identifier(), arb_identifier(), 1usize..4).prop_map(|(col, table, extra)| {
            format!("SELECT {col} FROM {table} WHERE {}{col} = 1", "(".repeat(extra))
        })
    }

    pub fn arb_destructive_keyword() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "RENAME", "REPLACE",
            "EXEC", "EXECUTE", "CALL",
        ])
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use serde_json::json;

    pub fn admin_identity() -> CallerIdentity {
        CallerIdentity::new(Role::Admin, "admin-1")
    }

    pub fn staff_identity(college: &str) -> CallerIdentity {
        CallerIdentity::new(Role::Staff, "staff-1").with_scope(college)
    }

    pub fn student_identity(user_id: &str, college: &str) -> CallerIdentity {
        CallerIdentity::new(Role::Student, user_id).with_scope(college)
    }

    /// Single row `{"count": n}`.
    pub fn count_row(n: i64) -> Vec<Row> {
        let mut row = Row::new();
        row.insert("count".to_string(), json!(n));
        vec![row]
    }

    /// `n` rows of `{"id": i, "name": "user-i"}`.
    pub fn user_rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| {
                let mut row = Row::new();
                row.insert("id".to_string(), json!(i));
                row.insert("name".to_string(), json!(format!("user-{}", i)));
                row
            })
            .collect()
    }

    /// Tables present in most scenarios.
    pub fn default_tables() -> Vec<&'static str> {
        vec!["users", "colleges", "departments", "batches", "course_wise_segregations"]
    }

    /// Config with the default budget and confidence model.
    pub fn test_config() -> QuarryConfig {
        QuarryConfig::default()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over `ProcessResponse`.

    use super::*;

    /// Assert the response carries rows from the database route.
    #[track_caller]
    pub fn assert_succeeded(response: &ProcessResponse) {
        assert!(
            response.is_success(),
            "Expected success, got {:?} with error {:?}",
            response.data_quality,
            response.error
        );
        assert!(response.error.is_none());
    }

    /// Assert the budget was exhausted with the given final kind.
    #[track_caller]
    pub fn assert_failed_with(response: &ProcessResponse, kind: ErrorKind) {
        assert_eq!(response.data_quality, DataQuality::Failed);
        assert_eq!(response.confidence, 0.0);
        match &response.error {
            Some(error) => assert_eq!(error.kind, kind, "Wrong final error kind"),
            None => panic!("Expected failure {:?}, got no error", kind),
        }
    }

    #[track_caller]
    pub fn assert_confidence(response: &ProcessResponse, expected: f32) {
        assert!(
            (response.confidence - expected).abs() < 1e-6,
            "Expected confidence {}, got {}",
            expected,
            response.confidence
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_oracle_replays_then_fails() {
        let oracle = ScriptedOracle::new(["SELECT 1"]).then_fail("rate limited");
        assert_eq!(oracle.complete("ctx", "q", None).await.unwrap(), "SELECT 1");
        assert!(oracle.complete("ctx", "q", Some("err")).await.is_err());
        assert!(oracle.complete("ctx", "q", None).await.is_err());

        let calls = oracle.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].prior_error.as_deref(), Some("err"));
    }

    #[tokio::test]
    async fn test_scripted_provider_records_statements() {
        let provider = ScriptedConnectionProvider::returning(fixtures::count_row(3));
        provider.push_result(Err(DatabaseError::driver(Some("1064"), "syntax")));

        let mut conn = provider.acquire().await.unwrap();
        assert!(conn.query("SELECT bad").await.is_err());
        assert_eq!(conn.query("SELECT 1").await.unwrap().len(), 1);
        assert_eq!(provider.executed(), vec!["SELECT bad", "SELECT 1"]);

        provider.set_unavailable(true);
        assert!(provider.acquire().await.is_err());
        assert_eq!(provider.acquisitions(), 2);
    }

    #[tokio::test]
    async fn test_static_directory_failure_toggle() {
        let directory = StaticTableDirectory::new(["users"]);
        assert!(directory.list_tables().await.unwrap().contains("users"));
        directory.set_failing(true);
        assert!(directory.list_tables().await.is_err());
        assert_eq!(directory.call_count(), 2);
    }
}
