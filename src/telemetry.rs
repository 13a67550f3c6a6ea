//! Request counters and correlation ids.
//!
//! Counters are plain atomics shared through [`SharedMetrics`]; a snapshot is
//! served alongside pool statistics by the `kwdb://pool_stats` resource. The
//! in-flight gauge is what graceful shutdown waits on.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Generate a short correlation ID (8 characters) for compact logging.
pub fn generate_short_correlation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Which tool a query went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPath {
    Read,
    Write,
}

/// How a tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Success,
    Failed,
    /// Sent to the wrong tool and refused before reaching the database.
    Rejected,
    TimedOut,
}

/// Server request counters.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    pub read_queries_total: AtomicU64,
    pub read_queries_success: AtomicU64,
    pub read_queries_failed: AtomicU64,
    pub write_queries_total: AtomicU64,
    pub write_queries_success: AtomicU64,
    pub write_queries_failed: AtomicU64,

    /// Statements refused because they went through the wrong tool.
    pub rejected_total: AtomicU64,

    /// Statements that exceeded their deadline.
    pub timeouts_total: AtomicU64,

    /// Total query execution time in milliseconds.
    pub query_time_ms_total: AtomicU64,

    /// Tool calls currently being handled.
    pub in_flight: AtomicU64,
}

impl ServerMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the end of a tool call.
    ///
    /// Rejected and timed-out calls also count as failures of their path.
    pub fn record_query(&self, path: QueryPath, outcome: QueryOutcome, duration: Duration) {
        let (total, success, failed) = match path {
            QueryPath::Read => (
                &self.read_queries_total,
                &self.read_queries_success,
                &self.read_queries_failed,
            ),
            QueryPath::Write => (
                &self.write_queries_total,
                &self.write_queries_success,
                &self.write_queries_failed,
            ),
        };

        total.fetch_add(1, Ordering::Relaxed);
        match outcome {
            QueryOutcome::Success => {
                success.fetch_add(1, Ordering::Relaxed);
            }
            QueryOutcome::Failed => {
                failed.fetch_add(1, Ordering::Relaxed);
            }
            QueryOutcome::Rejected => {
                failed.fetch_add(1, Ordering::Relaxed);
                self.rejected_total.fetch_add(1, Ordering::Relaxed);
            }
            QueryOutcome::TimedOut => {
                failed.fetch_add(1, Ordering::Relaxed);
                self.timeouts_total.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.query_time_ms_total
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Mark a tool call as started. The call counts as in flight until the
    /// returned guard is dropped.
    pub fn begin_request(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            metrics: Arc::clone(self),
        }
    }

    /// Number of tool calls currently being handled.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            read_queries_total: self.read_queries_total.load(Ordering::Relaxed),
            read_queries_success: self.read_queries_success.load(Ordering::Relaxed),
            read_queries_failed: self.read_queries_failed.load(Ordering::Relaxed),
            write_queries_total: self.write_queries_total.load(Ordering::Relaxed),
            write_queries_success: self.write_queries_success.load(Ordering::Relaxed),
            write_queries_failed: self.write_queries_failed.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
            query_time_ms_total: self.query_time_ms_total.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}

/// Decrements the in-flight gauge on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    metrics: Arc<ServerMetrics>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub read_queries_total: u64,
    pub read_queries_success: u64,
    pub read_queries_failed: u64,
    pub write_queries_total: u64,
    pub write_queries_success: u64,
    pub write_queries_failed: u64,
    pub rejected_total: u64,
    pub timeouts_total: u64,
    pub query_time_ms_total: u64,
    pub in_flight: u64,
}

impl MetricsSnapshot {
    /// Average query time in milliseconds across both tools.
    pub fn avg_query_time_ms(&self) -> f64 {
        let total = self.read_queries_total + self.write_queries_total;
        if total == 0 {
            return 0.0;
        }
        self.query_time_ms_total as f64 / total as f64
    }
}

/// Shared metrics type for thread-safe access.
pub type SharedMetrics = Arc<ServerMetrics>;

/// Create a new shared metrics collector.
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(ServerMetrics::new())
}

/// Query timer for measuring execution duration.
pub struct QueryTimer {
    start: Instant,
    path: QueryPath,
    metrics: SharedMetrics,
}

impl QueryTimer {
    /// Start a new query timer.
    pub fn start(metrics: SharedMetrics, path: QueryPath) -> Self {
        Self {
            start: Instant::now(),
            path,
            metrics,
        }
    }

    /// Stop the timer and record the outcome.
    pub fn stop(self, outcome: QueryOutcome) -> Duration {
        let duration = self.start.elapsed();
        self.metrics.record_query(self.path, outcome, duration);
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_correlation_id() {
        let id = generate_short_correlation_id();
        assert_eq!(id.len(), 8);
        assert_ne!(id, generate_short_correlation_id());
    }

    #[test]
    fn test_record_outcomes() {
        let metrics = ServerMetrics::new();
        metrics.record_query(QueryPath::Read, QueryOutcome::Success, Duration::from_millis(10));
        metrics.record_query(QueryPath::Read, QueryOutcome::TimedOut, Duration::from_millis(30));
        metrics.record_query(QueryPath::Write, QueryOutcome::Rejected, Duration::ZERO);

        let snap = metrics.snapshot();
        assert_eq!(snap.read_queries_total, 2);
        assert_eq!(snap.read_queries_success, 1);
        assert_eq!(snap.read_queries_failed, 1);
        assert_eq!(snap.timeouts_total, 1);
        assert_eq!(snap.write_queries_failed, 1);
        assert_eq!(snap.rejected_total, 1);
        assert!((snap.avg_query_time_ms() - 40.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_in_flight_guard() {
        let metrics = new_shared_metrics();
        let first = metrics.begin_request();
        let second = metrics.begin_request();
        assert_eq!(metrics.in_flight(), 2);
        drop(first);
        assert_eq!(metrics.in_flight(), 1);
        drop(second);
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn test_query_timer() {
        let metrics = new_shared_metrics();
        let timer = QueryTimer::start(metrics.clone(), QueryPath::Write);
        timer.stop(QueryOutcome::Success);
        assert_eq!(metrics.snapshot().write_queries_success, 1);
    }
}
