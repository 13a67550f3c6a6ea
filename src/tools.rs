//! MCP tools for KWDB statement execution.
//!
//! - `read-query`: SELECT, SHOW, EXPLAIN and other read-only statements.
//!   Unbounded SELECTs get `LIMIT n` appended.
//! - `write-query`: DML and DDL statements, reporting affected rows.
//!
//! Both tools always answer with a JSON envelope in a successful tool
//! result. Failures are described inside the envelope, never raised as
//! protocol errors.

mod inputs;
mod limit;

pub use inputs::*;
pub use limit::{add_limit_to_query, apply_auto_limit, is_select_without_limit};

use crate::config::QueryConfig;
use crate::database::{truncate_for_log, QueryExecutor, Record};
use crate::error::ServerError;
use crate::security::validate_query_input;
use crate::server::KwdbMcpServer;
use crate::telemetry::{
    generate_short_correlation_id, QueryOutcome, QueryPath, QueryTimer, SharedMetrics,
};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content};
use rmcp::{tool, tool_router, ErrorData};
use serde::Serialize;
use tracing::{debug, info, warn};

const READ_TIMEOUT_MESSAGE: &str = "Query timeout: the query took too long to execute";
const WRITE_TIMEOUT_MESSAGE: &str =
    "Write operation timeout: the operation took too long to complete";

/// Response envelope shared by both tools.
#[derive(Debug, Clone, Serialize)]
pub struct ToolEnvelope<D, E> {
    pub status: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: Option<D>,
    pub error: Option<E>,
}

impl<D, E> ToolEnvelope<D, E> {
    fn success(kind: &'static str, data: D) -> Self {
        Self {
            status: "success",
            kind,
            data: Some(data),
            error: None,
        }
    }

    fn failure(kind: &'static str, error: E) -> Self {
        Self {
            status: "error",
            kind,
            data: None,
            error: Some(error),
        }
    }

    /// Whether the envelope reports success.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

pub type ReadQueryEnvelope = ToolEnvelope<ReadQueryData, ReadQueryError>;
pub type WriteQueryEnvelope = ToolEnvelope<WriteQueryData, WriteQueryError>;

#[derive(Debug, Clone, Serialize)]
pub struct ReadQueryData {
    pub result_type: &'static str,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub metadata: ReadQueryMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadQueryMetadata {
    pub affected_rows: u64,
    pub row_count: usize,
    /// Statement actually executed.
    pub query: String,
    /// Statement as submitted.
    pub original_query: String,
    pub auto_limited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadQueryError {
    pub message: String,
    pub query: String,
    pub original_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteQueryData {
    pub result_type: &'static str,
    pub affected_rows: u64,
    pub metadata: WriteQueryMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteQueryMetadata {
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteQueryError {
    pub message: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
}

#[tool_router(vis = "pub(crate)")]
impl KwdbMcpServer {
    #[tool(
        name = "read-query",
        description = "Execute SELECT, SHOW, EXPLAIN and other read-only queries on KWDB (KaiwuDB). SELECT queries without a LIMIT clause will automatically have LIMIT 20 added to prevent large result sets."
    )]
    async fn read_query(
        &self,
        Parameters(input): Parameters<ReadQueryInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let _in_flight = self.metrics.begin_request();
        let envelope =
            run_read_query(&self.executor, &self.metrics, &self.config.query, &input.sql).await;
        envelope_result(&envelope)
    }

    #[tool(
        name = "write-query",
        description = "Execute data modification queries including DML and DDL operations on KWDB (KaiwuDB)"
    )]
    async fn write_query(
        &self,
        Parameters(input): Parameters<WriteQueryInput>,
    ) -> Result<CallToolResult, ErrorData> {
        let _in_flight = self.metrics.begin_request();
        let envelope =
            run_write_query(&self.executor, &self.metrics, &self.config.query, &input.sql).await;
        envelope_result(&envelope)
    }
}

/// Execute a read statement and build its envelope.
pub async fn run_read_query(
    executor: &QueryExecutor,
    metrics: &SharedMetrics,
    config: &QueryConfig,
    sql: &str,
) -> ReadQueryEnvelope {
    let request_id = generate_short_correlation_id();
    let failure = |error: &ServerError, message: String, query: &str| {
        ReadQueryEnvelope::failure(
            "query_result",
            ReadQueryError {
                message,
                query: query.to_string(),
                original_query: sql.to_string(),
                suggestion: error.suggestion(),
            },
        )
    };

    let timer = QueryTimer::start(metrics.clone(), QueryPath::Read);
    if let Err(e) = validate_query_input(sql, config.max_query_length) {
        timer.stop(QueryOutcome::Rejected);
        return failure(&e, e.to_string(), sql);
    }

    let (query, auto_limited) = apply_auto_limit(sql, config.auto_limit);
    if auto_limited {
        debug!(request_id = %request_id, limit = config.auto_limit, "Added automatic LIMIT");
    }

    match executor.execute_query(&query).await {
        Ok(result) => {
            let elapsed = timer.stop(QueryOutcome::Success);
            info!(
                request_id = %request_id,
                rows = result.row_count(),
                elapsed_ms = elapsed.as_millis() as u64,
                "read-query completed"
            );
            ReadQueryEnvelope::success(
                "query_result",
                ReadQueryData {
                    result_type: "table",
                    columns: result.column_names(),
                    metadata: ReadQueryMetadata {
                        affected_rows: 0,
                        row_count: result.row_count(),
                        query,
                        original_query: sql.to_string(),
                        auto_limited,
                    },
                    rows: result.rows,
                },
            )
        }
        Err(e) => {
            timer.stop(outcome_for(&e));
            warn!(
                request_id = %request_id,
                error = %e,
                transient = e.is_transient(),
                "read-query failed: {}",
                truncate_for_log(&query, 100)
            );
            let message = if e.is_timeout() {
                READ_TIMEOUT_MESSAGE.to_string()
            } else {
                e.to_string()
            };
            failure(&e, message, &query)
        }
    }
}

/// Execute a write statement and build its envelope.
pub async fn run_write_query(
    executor: &QueryExecutor,
    metrics: &SharedMetrics,
    config: &QueryConfig,
    sql: &str,
) -> WriteQueryEnvelope {
    let request_id = generate_short_correlation_id();
    let failure = |error: &ServerError, message: String| {
        WriteQueryEnvelope::failure(
            "write_result",
            WriteQueryError {
                message,
                query: sql.to_string(),
                suggestion: error.suggestion(),
            },
        )
    };

    let timer = QueryTimer::start(metrics.clone(), QueryPath::Write);
    if let Err(e) = validate_query_input(sql, config.max_query_length) {
        timer.stop(QueryOutcome::Rejected);
        return failure(&e, e.to_string());
    }

    match executor.execute_write_query(sql).await {
        Ok(affected_rows) => {
            let elapsed = timer.stop(QueryOutcome::Success);
            info!(
                request_id = %request_id,
                affected_rows,
                elapsed_ms = elapsed.as_millis() as u64,
                "write-query completed"
            );
            WriteQueryEnvelope::success(
                "write_result",
                WriteQueryData {
                    result_type: "write",
                    affected_rows,
                    metadata: WriteQueryMetadata {
                        query: sql.to_string(),
                    },
                },
            )
        }
        Err(e) => {
            timer.stop(outcome_for(&e));
            warn!(
                request_id = %request_id,
                error = %e,
                transient = e.is_transient(),
                "write-query failed: {}",
                truncate_for_log(sql, 100)
            );
            let message = if e.is_timeout() {
                WRITE_TIMEOUT_MESSAGE.to_string()
            } else {
                e.to_string()
            };
            failure(&e, message)
        }
    }
}

fn outcome_for(error: &ServerError) -> QueryOutcome {
    match error {
        ServerError::OperationNotAllowed(_) => QueryOutcome::Rejected,
        e if e.is_timeout() => QueryOutcome::TimedOut,
        _ => QueryOutcome::Failed,
    }
}

/// Render an envelope as the text content of a successful tool result.
fn envelope_result<T: Serialize>(envelope: &T) -> Result<CallToolResult, ErrorData> {
    let text = serde_json::to_string_pretty(envelope).map_err(|e| {
        ErrorData::internal_error(format!("Failed to serialize tool result: {}", e), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}
