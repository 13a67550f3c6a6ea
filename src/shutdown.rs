//! Graceful shutdown handling with request draining.
//!
//! A signal (SIGINT, SIGTERM or SIGHUP) flips a watch channel. The
//! transports stop serving, in-flight tool calls get up to the drain timeout
//! to finish, and the pool is closed last.

use crate::constants::{DEFAULT_DRAIN_TIMEOUT_SECS, DRAIN_POLL_INTERVAL};
use crate::database::PoolManager;
use crate::telemetry::ServerMetrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Shutdown signal that can be awaited.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn recv(&mut self) {
        let _ = self.receiver.wait_for(|&v| v).await;
    }

    /// Check if shutdown has been signaled without blocking.
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Shutdown phases for coordinated cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Initiated,
    DrainingRequests,
    ClosingPool,
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Initiated => write!(f, "initiated"),
            ShutdownPhase::DrainingRequests => write!(f, "draining_requests"),
            ShutdownPhase::ClosingPool => write!(f, "closing_pool"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

/// Controller for managing graceful shutdown.
pub struct ShutdownController {
    sender: watch::Sender<bool>,
    shutting_down: AtomicBool,
    drain_timeout: Duration,
}

impl ShutdownController {
    /// Create a controller with the given drain timeout.
    pub fn new(drain_timeout: Duration) -> Self {
        let (sender, _) = watch::channel(false);

        Self {
            sender,
            shutting_down: AtomicBool::new(false),
            drain_timeout,
        }
    }

    /// Get a shutdown signal receiver.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Check if shutdown is in progress.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Initiate shutdown. Only the first call has any effect.
    pub fn shutdown(&self) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating graceful shutdown...");
            let _ = self.sender.send(true);
            self.notify_phase(ShutdownPhase::Initiated);
        }
    }

    fn notify_phase(&self, phase: ShutdownPhase) {
        info!("Shutdown phase: {}", phase);
    }

    /// Drain in-flight tool calls, then close the pool.
    pub async fn graceful_shutdown(&self, metrics: &ServerMetrics, pool: &PoolManager) {
        self.shutdown();

        self.notify_phase(ShutdownPhase::DrainingRequests);
        self.drain_requests(metrics).await;

        self.notify_phase(ShutdownPhase::ClosingPool);
        pool.close().await;

        self.notify_phase(ShutdownPhase::Complete);
        info!("Graceful shutdown complete");
    }

    async fn drain_requests(&self, metrics: &ServerMetrics) {
        let start = Instant::now();

        loop {
            let in_flight = metrics.in_flight();
            if in_flight == 0 {
                info!("All requests drained");
                break;
            }

            if start.elapsed() >= self.drain_timeout {
                warn!(
                    "Drain timeout exceeded with {} requests still running",
                    in_flight
                );
                break;
            }

            info!("Waiting for {} in-flight requests to complete...", in_flight);
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// Get the drain timeout.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS))
    }
}

/// Shared shutdown controller type.
pub type SharedShutdownController = Arc<ShutdownController>;

/// Install signal handlers that trigger `controller`.
///
/// SIGTERM and SIGHUP are only handled on Unix.
pub fn install_signal_handlers(controller: SharedShutdownController) {
    let ctrl_c_controller = controller.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                ctrl_c_controller.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl+C signal: {}", e),
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        for (kind, name) in [
            (SignalKind::terminate(), "SIGTERM"),
            (SignalKind::hangup(), "SIGHUP"),
        ] {
            let controller = controller.clone();
            tokio::spawn(async move {
                match signal(kind) {
                    Ok(mut stream) => {
                        stream.recv().await;
                        info!("Received {}, initiating shutdown...", name);
                        controller.shutdown();
                    }
                    Err(e) => error!("Failed to install {} handler: {}", name, e),
                }
            });
        }
    }
}

/// Whether a transport error only means the client went away.
///
/// Such errors end the session normally and are logged at info level.
pub fn is_normal_shutdown_error(message: &str) -> bool {
    const NORMAL: [&str; 7] = [
        "eof",
        "closed pipe",
        "use of closed network connection",
        "connection reset",
        "broken pipe",
        "context canceled",
        "connection closed",
    ];
    let lower = message.to_lowercase();
    NORMAL.iter().any(|pattern| lower.contains(pattern))
}

/// Shutdown configuration.
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Timeout for draining in-flight requests.
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(DEFAULT_DRAIN_TIMEOUT_SECS),
        }
    }
}

impl ShutdownConfig {
    /// Read `KWDB_SHUTDOWN_DRAIN_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(drain) = std::env::var("KWDB_SHUTDOWN_DRAIN_TIMEOUT") {
            if let Ok(secs) = drain.trim().parse::<u64>() {
                config.drain_timeout = Duration::from_secs(secs);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::new_shared_metrics;

    #[test]
    fn test_shutdown_signal() {
        let controller = ShutdownController::default();
        let signal = controller.signal();
        assert!(!signal.is_shutdown());
        assert_eq!(controller.drain_timeout(), Duration::from_secs(30));

        controller.shutdown();
        assert!(controller.is_shutting_down());
        assert!(signal.is_shutdown());

        // Second call is a no-op
        controller.shutdown();
        assert!(controller.is_shutting_down());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_closes_pool() {
        let controller = ShutdownController::new(Duration::from_millis(100));
        let signal = controller.signal();
        let metrics = new_shared_metrics();
        let pool = PoolManager::new();
        pool.initialize_pool("postgresql://root@127.0.0.1:1/defaultdb", None)
            .unwrap();

        controller.graceful_shutdown(&metrics, &pool).await;

        assert!(signal.is_shutdown());
        assert!(controller.is_shutting_down());
        assert!(!pool.is_initialized());
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight() {
        let controller = ShutdownController::new(Duration::from_secs(5));
        let metrics = new_shared_metrics();
        let guard = metrics.begin_request();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        let start = Instant::now();
        controller.drain_requests(&metrics).await;
        assert_eq!(metrics.in_flight(), 0);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_timeout() {
        let controller = ShutdownController::new(Duration::from_millis(50));
        let metrics = new_shared_metrics();
        let _guard = metrics.begin_request();

        controller.drain_requests(&metrics).await;
        assert_eq!(metrics.in_flight(), 1);
    }

    #[test]
    fn test_normal_shutdown_errors() {
        assert!(is_normal_shutdown_error("unexpected EOF"));
        assert!(is_normal_shutdown_error("write: Broken pipe (os error 32)"));
        assert!(is_normal_shutdown_error("Connection reset by peer"));
        assert!(!is_normal_shutdown_error("invalid JSON-RPC message"));
    }

    #[test]
    fn test_shutdown_phase_display() {
        assert_eq!(ShutdownPhase::DrainingRequests.to_string(), "draining_requests");
        assert_eq!(ShutdownPhase::ClosingPool.to_string(), "closing_pool");
    }
}
