//! Query execution and result handling.

use crate::config::QueryConfig;
use crate::constants::{LOG_SQL_TRUNCATE_LEN, METADATA_TIMEOUT};
use crate::database::pool::PoolManager;
use crate::database::types::{Record, TypeMapper};
use crate::error::ServerError;
use crate::security::{classify_query, has_multiple_statements, QueryKind};
use serde::Serialize;
use sqlx::{Column, Row, TypeInfo};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of a read query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    /// Result columns in order. Empty when no rows were returned.
    pub columns: Vec<ColumnInfo>,

    /// Result rows, in the order the database returned them.
    pub rows: Vec<Record>,

    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
}

/// Information about a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// SQL type name.
    pub sql_type: String,
}

impl QueryResult {
    /// Column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Number of rows returned.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Runs classified statements against the shared pool.
///
/// Read statements go through [`execute_query`](Self::execute_query) and
/// writes through [`execute_write_query`](Self::execute_write_query); a
/// statement sent down the wrong path is rejected before a connection is
/// borrowed. Statements are never retried here.
///
/// Statements run over the simple query protocol, which executes every
/// `;`-separated statement in the text. The read path therefore only accepts
/// a single statement.
pub struct QueryExecutor {
    pool: Arc<PoolManager>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl QueryExecutor {
    /// Create a new query executor.
    pub fn new(pool: Arc<PoolManager>, config: &QueryConfig) -> Self {
        Self {
            pool,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        }
    }

    /// The pool this executor borrows from.
    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    /// Execute a read statement and return its rows.
    pub async fn execute_query(&self, sql: &str) -> Result<QueryResult, ServerError> {
        if let QueryKind::Write(op) = classify_query(sql) {
            return Err(ServerError::not_allowed(format!(
                "write operation not allowed in read-query: {}",
                op
            )));
        }
        if has_multiple_statements(sql) {
            return Err(ServerError::not_allowed(
                "multiple statements not allowed in read-query",
            ));
        }

        debug!("Executing query: {}", truncate_for_log(sql, LOG_SQL_TRUNCATE_LEN));
        let start = Instant::now();

        let mut result = with_deadline("Query", self.read_timeout, self.fetch(sql)).await?;
        result.execution_time_ms = start.elapsed().as_millis() as u64;

        debug!(
            "Query completed: {} rows in {} ms",
            result.rows.len(),
            result.execution_time_ms
        );
        Ok(result)
    }

    /// Execute a write statement and return the number of affected rows.
    pub async fn execute_write_query(&self, sql: &str) -> Result<u64, ServerError> {
        let op = match classify_query(sql) {
            QueryKind::Write(op) => op,
            QueryKind::Read => {
                return Err(ServerError::not_allowed(
                    "not a write operation: expected INSERT, UPDATE, DELETE, CREATE, DROP, ALTER, etc",
                ))
            }
        };

        debug!(
            operation = %op,
            "Executing write: {}",
            truncate_for_log(sql, LOG_SQL_TRUNCATE_LEN)
        );

        let rows_affected = with_deadline("Write operation", self.write_timeout, async {
            let pool = self.pool.get_connection().await?;
            let done = sqlx::raw_sql(sql).execute(&pool).await?;
            Ok::<_, ServerError>(done.rows_affected())
        })
        .await?;

        debug!("Write completed: {} rows affected", rows_affected);
        Ok(rows_affected)
    }

    /// Run an internal catalog statement without classification.
    ///
    /// Used by metadata lookups; the SQL is built by this crate, never taken
    /// verbatim from a client.
    pub(crate) async fn fetch_records(&self, sql: &str) -> Result<Vec<Record>, ServerError> {
        let result = with_deadline("Metadata query", METADATA_TIMEOUT, self.fetch(sql)).await?;
        Ok(result.rows)
    }

    /// Borrow a connection and collect every row of `sql`.
    async fn fetch(&self, sql: &str) -> Result<QueryResult, ServerError> {
        let pool = self.pool.get_connection().await?;
        let rows = sqlx::raw_sql(sql).fetch_all(&pool).await?;

        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| ColumnInfo {
                        name: c.name().to_string(),
                        sql_type: c.type_info().name().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(QueryResult {
            columns,
            rows: rows.iter().map(TypeMapper::row_to_record).collect(),
            execution_time_ms: 0,
        })
    }
}

/// Bound `fut` by `limit`, mapping expiry to a timeout error.
///
/// Expiry drops the in-flight future. The statement may still complete on
/// the server.
async fn with_deadline<T>(
    operation: &str,
    limit: Duration,
    fut: impl Future<Output = Result<T, ServerError>>,
) -> Result<T, ServerError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ServerError::timeout(operation, limit.as_secs())),
    }
}

/// Truncate a string for logging purposes.
pub(crate) fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::types::SqlValue;

    fn executor(pool: Arc<PoolManager>) -> QueryExecutor {
        QueryExecutor::new(pool, &QueryConfig::default())
    }

    #[tokio::test]
    async fn test_write_rejected_by_read_path_before_driver() {
        // Uninitialized pool: reaching the driver would fail with NotInitialized
        let exec = executor(Arc::new(PoolManager::new()));
        for sql in ["INSERT INTO t VALUES (1)", "drop table t", "  GRANT ALL ON t TO u"] {
            let err = exec.execute_query(sql).await.unwrap_err();
            assert!(
                matches!(err, ServerError::OperationNotAllowed(_)),
                "unexpected error for {}: {:?}",
                sql,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_stacked_statement_rejected_by_read_path_before_driver() {
        let exec = executor(Arc::new(PoolManager::new()));
        for sql in [
            "SELECT 1 AS one LIMIT 1; DROP TABLE victim",
            "SHOW TABLES; DELETE FROM t",
        ] {
            let err = exec.execute_query(sql).await.unwrap_err();
            assert!(
                matches!(err, ServerError::OperationNotAllowed(ref msg) if msg.contains("multiple statements")),
                "unexpected error for {}: {:?}",
                sql,
                err
            );
        }

        // A semicolon inside a literal is not a separator
        let err = exec
            .execute_query("SELECT 'a; DROP TABLE victim'")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn test_read_rejected_by_write_path() {
        let exec = executor(Arc::new(PoolManager::new()));
        for sql in ["SELECT 1", "SHOW TABLES", "EXPLAIN SELECT 1"] {
            let err = exec.execute_write_query(sql).await.unwrap_err();
            assert!(matches!(err, ServerError::OperationNotAllowed(_)));
        }
    }

    #[tokio::test]
    async fn test_read_on_uninitialized_pool() {
        let exec = executor(Arc::new(PoolManager::new()));
        let err = exec.execute_query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, ServerError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn test_deadline_maps_to_timeout() {
        let err = with_deadline("Query", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ServerError>(())
        })
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_query_result_accessors() {
        let mut record = Record::default();
        record.push("id", SqlValue::Int(1));
        let result = QueryResult {
            columns: vec![ColumnInfo {
                name: "id".to_string(),
                sql_type: "INT8".to_string(),
            }],
            rows: vec![record],
            execution_time_ms: 3,
        };
        assert_eq!(result.column_names(), vec!["id".to_string()]);
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("short", 10), "short");
        assert_eq!(truncate_for_log("this is a long string", 10), "this is a ...");
        // Never split a multi-byte character
        assert_eq!(truncate_for_log("数据库查询", 4), "数...");
    }
}
