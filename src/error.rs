//! Error types for the KWDB MCP Server.
//!
//! This module defines the semantic error taxonomy shared by the pool manager,
//! the query executor and the protocol layer, with SQLSTATE mapping for
//! user-friendly error messages.

use rmcp::ErrorData;
use thiserror::Error;

/// Domain-specific errors for the KWDB MCP Server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Bad or empty connection string, or an invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The connection pool was never configured, or has been closed.
    #[error("Database pool not initialized: {0}")]
    NotInitialized(String),

    /// Health check and reinitialization both failed.
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement kind does not match the requested path (read vs write).
    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    /// Deadline exceeded while borrowing a connection or executing.
    #[error("{operation} timeout: exceeded {timeout_seconds} seconds")]
    Timeout {
        operation: String,
        timeout_seconds: u64,
    },

    /// Error reported by the database engine (syntax, constraint, ...).
    #[error("Database error: {message}")]
    Driver {
        message: String,
        sql_state: Option<String>,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not-initialized error.
    pub fn not_initialized(msg: impl Into<String>) -> Self {
        Self::NotInitialized(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error with a source.
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation-not-allowed error.
    pub fn not_allowed(msg: impl Into<String>) -> Self {
        Self::OperationNotAllowed(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_seconds: seconds,
        }
    }

    /// Create a driver error.
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver {
            message: msg.into(),
            sql_state: None,
        }
    }

    /// Create a driver error carrying a SQLSTATE code.
    pub fn driver_with_state(msg: impl Into<String>, sql_state: impl Into<String>) -> Self {
        Self::Driver {
            message: msg.into(),
            sql_state: Some(sql_state.into()),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a resource not found error.
    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::ResourceNotFound(uri.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this is a deadline error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Statement-level failures are never transient: a write may not be
    /// idempotent and must not be re-issued.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Timeout { .. } => true,
            Self::Driver {
                sql_state: Some(state),
                ..
            } => is_transient_sql_state(state),
            _ => false,
        }
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check the connection string and environment variables"),
            Self::NotInitialized(_) => Some("Start the server with a valid connection string"),
            Self::Connection { .. } => {
                Some("Check database hostname, port, credentials and network connectivity")
            }
            Self::OperationNotAllowed(_) => {
                Some("Use read-query for SELECT/SHOW/EXPLAIN and write-query for DML/DDL")
            }
            Self::Timeout { .. } => Some("Try a simpler query or add a more selective filter"),
            Self::Driver {
                sql_state: Some(state),
                ..
            } if state.starts_with("42") => Some("Check the statement syntax and object names"),
            Self::Driver {
                sql_state: Some(state),
                ..
            } if state.starts_with("23") => {
                Some("Check the constraint definition and your data values")
            }
            _ => None,
        }
    }
}

/// SQLSTATE classes that indicate a transient condition.
fn is_transient_sql_state(state: &str) -> bool {
    state.starts_with("08") // connection exception
        || state == "40001" // serialization failure
        || state == "40P01" // deadlock detected
        || state == "57P01" // admin shutdown
        || state == "53300" // too many connections
}

impl From<sqlx::Error> for ServerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => {
                let message = db.message().to_string();
                match db.code() {
                    Some(code) => ServerError::driver_with_state(message, code.into_owned()),
                    None => ServerError::driver(message),
                }
            }
            sqlx::Error::Configuration(source) => ServerError::config(source.to_string()),
            sqlx::Error::PoolClosed => ServerError::connection("Connection pool closed"),
            sqlx::Error::PoolTimedOut => {
                ServerError::connection("Timed out waiting for a pooled connection")
            }
            e @ sqlx::Error::Io(_) => ServerError::connection_with_source("IO error", e),
            e @ sqlx::Error::Tls(_) => ServerError::connection_with_source("TLS error", e),
            e @ sqlx::Error::Protocol(_) => {
                ServerError::connection_with_source("Protocol error", e)
            }
            sqlx::Error::WorkerCrashed => {
                ServerError::connection("Connection background worker crashed")
            }
            e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
                ServerError::driver(format!("Type conversion error: {}", e))
            }
            other => ServerError::driver(other.to_string()),
        }
    }
}

/// Convert ServerError to the protocol error payload.
///
/// Tool errors are returned as a well-formed envelope instead of using this
/// conversion. This is used for resource and prompt faults.
impl From<ServerError> for ErrorData {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::InvalidInput(msg) => ErrorData::invalid_params(msg, None),
            ServerError::OperationNotAllowed(msg) => ErrorData::invalid_params(msg, None),
            ServerError::ResourceNotFound(uri) => {
                ErrorData::resource_not_found(format!("Resource not found: {}", uri), None)
            }
            other => ErrorData::internal_error(other.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(ServerError::timeout("Query", 30).is_transient());
        assert!(ServerError::connection("down").is_transient());
        assert!(ServerError::driver_with_state("deadlock", "40P01").is_transient());
        assert!(!ServerError::driver_with_state("syntax error", "42601").is_transient());
        assert!(!ServerError::not_allowed("INSERT").is_transient());
    }

    #[test]
    fn test_error_suggestions() {
        assert!(ServerError::config("empty").suggestion().is_some());
        assert!(ServerError::driver_with_state("bad", "42601")
            .suggestion()
            .is_some());
        assert!(ServerError::internal("unknown").suggestion().is_none());
    }

    #[test]
    fn test_timeout_display() {
        let err = ServerError::timeout("Write operation", 60);
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "Write operation timeout: exceeded 60 seconds"
        );
    }

    #[test]
    fn test_sqlx_pool_errors_map_to_connection() {
        let err: ServerError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, ServerError::Connection { .. }));

        let err: ServerError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ServerError::Connection { .. }));
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_driver() {
        let err: ServerError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ServerError::Driver { sql_state: None, .. }));
    }
}
