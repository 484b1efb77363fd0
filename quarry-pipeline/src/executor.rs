//! Query executor: runs a validated statement and classifies failures.

use crate::taxonomy::classify_database_error;
use quarry_core::{
    CleanStatement, ComplexityTier, ExecutionOutcome, QueryType, QuerySuccess,
};
use quarry_sql::clause::depths;
use quarry_sql::lexer::tokenize;
use quarry_sql::{complexity_score, extract_tables, query_type};
use quarry_storage::ConnectionProvider;
use std::sync::Arc;
use std::time::Instant;

/// Executes statements on scoped connections.
///
/// A connection is acquired per call and released before returning. Rows are
/// materialized eagerly and bounded by `row_limit`: SELECTs without a
/// top-level LIMIT get one appended, and any excess rows are dropped.
pub struct QueryExecutor {
    provider: Arc<dyn ConnectionProvider>,
    row_limit: usize,
}

impl QueryExecutor {
    pub fn new(provider: Arc<dyn ConnectionProvider>, row_limit: usize) -> Self {
        Self {
            provider,
            row_limit: row_limit.max(1),
        }
    }

    pub fn row_limit(&self) -> usize {
        self.row_limit
    }

    pub async fn execute(&self, statement: &CleanStatement) -> ExecutionOutcome {
        let sql = enforce_limit(statement.as_str(), self.row_limit);
        let complexity = complexity_score(&sql);
        let complexity_tier = ComplexityTier::from_table_count(extract_tables(&sql).len());

        tracing::debug!(
            score = complexity.score,
            subqueries = complexity.subqueries,
            joins = complexity.joins,
            json_functions = complexity.json_functions,
            aggregates = complexity.aggregates,
            "executing statement"
        );

        let start = Instant::now();
        let result = match self.provider.acquire().await {
            Ok(mut conn) => conn.query(&sql).await,
            Err(e) => Err(e),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(mut rows) => {
                if rows.len() > self.row_limit {
                    tracing::warn!(
                        returned = rows.len(),
                        row_limit = self.row_limit,
                        "truncating result set"
                    );
                    rows.truncate(self.row_limit);
                }
                let row_count = rows.len();
                tracing::info!(row_count, elapsed_ms, tier = ?complexity_tier, "statement executed");
                ExecutionOutcome::Success(QuerySuccess {
                    rows,
                    row_count,
                    elapsed_ms,
                    complexity_tier,
                    complexity,
                    cached: false,
                })
            }
            Err(err) => {
                let failure = classify_database_error(&err);
                tracing::warn!(
                    kind = %failure.kind,
                    detail = %failure.technical_detail,
                    elapsed_ms,
                    "statement failed"
                );
                ExecutionOutcome::Failure(failure)
            }
        }
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("row_limit", &self.row_limit)
            .finish()
    }
}

/// Append `LIMIT row_limit` to a SELECT that has no top-level LIMIT or FETCH.
/// Other statement types are returned unchanged, minus a trailing semicolon.
pub fn enforce_limit(sql: &str, row_limit: usize) -> String {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    if query_type(trimmed) != QueryType::Select {
        return trimmed.to_string();
    }

    let tokens = tokenize(trimmed);
    let depth = depths(&tokens);
    let limited = tokens
        .iter()
        .zip(depth)
        .any(|(tok, d)| d == 0 && tok.is_any_word(&["LIMIT", "FETCH"]));

    if limited {
        trimmed.to_string()
    } else {
        format!("{} LIMIT {}", trimmed, row_limit)
    }
}
