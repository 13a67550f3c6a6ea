//! Centralized constants for the KWDB MCP Server.
//!
//! This module contains all magic numbers and default values used throughout
//! the codebase, making them easy to find, understand, and modify.

use std::time::Duration;

// =============================================================================
// Connection Pool Constants
// =============================================================================

/// Default maximum number of open connections.
pub const DEFAULT_MAX_OPEN_CONNECTIONS: u32 = 25;

/// Default maximum number of idle connections.
pub const DEFAULT_MAX_IDLE_CONNECTIONS: u32 = 5;

/// Default maximum connection lifetime in seconds (5 minutes).
pub const DEFAULT_CONN_MAX_LIFETIME_SECS: u64 = 300;

/// Default maximum idle time of a connection in seconds.
pub const DEFAULT_CONN_MAX_IDLE_TIME_SECS: u64 = 30;

/// Default time to wait for a pooled connection, in seconds.
///
/// Never below the write deadline, so a borrow is cut short by the statement
/// deadline rather than by the pool.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = DEFAULT_WRITE_TIMEOUT_SECS;

/// Upper bound of opening a connection and of the ping performed on every
/// borrow. Waiting for a busy pool is not covered.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// Query Constants
// =============================================================================

/// Default deadline for read queries in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Default deadline for write queries in seconds.
///
/// DDL and DML may legitimately run longer than reads.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 60;

/// Deadline for catalog lookups backing resources and prompts.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Row limit appended to plain SELECT statements without a LIMIT clause.
pub const DEFAULT_AUTO_LIMIT: u32 = 20;

/// Default maximum statement length in bytes (1 MiB).
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 1_048_576;

/// Length at which SQL text is truncated in log lines.
pub const LOG_SQL_TRUNCATE_LEN: usize = 200;

// =============================================================================
// Transport Constants
// =============================================================================

/// Default port for the HTTP transport.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default bind address for the HTTP transport.
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

// =============================================================================
// Shutdown Constants
// =============================================================================

/// Default time allowed for in-flight requests to finish on shutdown.
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Interval between drain progress checks.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// Product Constants
// =============================================================================

/// Product name reported in resources and prompts.
pub const PRODUCT_NAME: &str = "KWDB (KaiwuDB)";

/// Engine type reported when `SHOW DATABASES` cannot tell us.
pub const DEFAULT_ENGINE_TYPE: &str = "KaiwuDB";

/// Table type for KWDB time-series tables.
pub const TIME_SERIES_TABLE: &str = "TIME SERIES TABLE";

/// Table type for relational tables.
pub const BASE_TABLE: &str = "BASE TABLE";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_deadline_shorter_than_write() {
        assert!(DEFAULT_READ_TIMEOUT_SECS < DEFAULT_WRITE_TIMEOUT_SECS);
    }

    #[test]
    fn test_pool_defaults() {
        assert_eq!(DEFAULT_MAX_OPEN_CONNECTIONS, 25);
        assert_eq!(DEFAULT_MAX_IDLE_CONNECTIONS, 5);
        assert_eq!(DEFAULT_CONN_MAX_LIFETIME_SECS, 300);
        assert_eq!(DEFAULT_CONN_MAX_IDLE_TIME_SECS, 30);
    }
}
