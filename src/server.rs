//! MCP server struct definition and initialization.

use crate::config::Config;
use crate::database::{MetadataQueries, PoolManager, QueryExecutor};
use crate::error::ServerError;
use crate::telemetry::{new_shared_metrics, SharedMetrics};
use rmcp::handler::server::router::tool::ToolRouter;
use std::sync::Arc;
use tracing::info;

/// The KWDB MCP Server instance.
///
/// Cloned per session by the transports; the pool, executor and counters are
/// shared through `Arc` so every clone sees the same connections.
#[derive(Clone)]
pub struct KwdbMcpServer {
    /// Configuration.
    pub(crate) config: Arc<Config>,

    /// Lazily connected, self-healing pool.
    pub(crate) pool: Arc<PoolManager>,

    /// Query executor.
    pub(crate) executor: Arc<QueryExecutor>,

    /// Catalog lookups for resources and prompts.
    pub(crate) metadata: Arc<MetadataQueries>,

    /// Tool router for dispatching tool calls.
    pub(crate) tool_router: ToolRouter<Self>,

    /// Request counters.
    pub(crate) metrics: SharedMetrics,
}

impl KwdbMcpServer {
    /// Create a server and configure its pool.
    ///
    /// No connection is opened here; the first tool call or resource read
    /// connects. Must be called from within a Tokio runtime.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let pool = Arc::new(PoolManager::new());
        pool.initialize_pool(&config.connection_string, Some(config.pool.clone()))?;
        info!(
            max_open = config.pool.max_open_connections,
            auto_limit = config.query.auto_limit,
            "KWDB MCP server configured"
        );
        Ok(Self::with_pool(config, pool))
    }

    /// Create a server around an existing pool manager.
    pub fn with_pool(config: Config, pool: Arc<PoolManager>) -> Self {
        let executor = Arc::new(QueryExecutor::new(pool.clone(), &config.query));
        let metadata = Arc::new(MetadataQueries::new(executor.clone()));

        Self {
            config: Arc::new(config),
            pool,
            executor,
            metadata,
            tool_router: Self::tool_router(),
            metrics: new_shared_metrics(),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the pool manager.
    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    /// Get a reference to the query executor.
    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Get a reference to the metadata queries.
    pub fn metadata(&self) -> &MetadataQueries {
        &self.metadata
    }

    /// Get a reference to the metrics collector.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolConfig, QueryConfig};

    fn test_config(connection_string: &str) -> Config {
        Config {
            connection_string: connection_string.to_string(),
            pool: PoolConfig::default(),
            query: QueryConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_new_does_not_connect() {
        let server = KwdbMcpServer::new(test_config("postgresql://root@127.0.0.1:1/defaultdb"))
            .expect("lazy init should succeed");
        assert!(server.pool().is_initialized());
        assert_eq!(server.metrics().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_new_rejects_malformed_url() {
        let result = KwdbMcpServer::new(test_config("not a url"));
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_clones_share_pool() {
        let server = KwdbMcpServer::new(test_config("postgresql://root@127.0.0.1:1/defaultdb"))
            .expect("lazy init should succeed");
        let clone = server.clone();
        assert!(Arc::ptr_eq(server.pool(), clone.pool()));
        assert!(Arc::ptr_eq(server.metrics(), clone.metrics()));
    }
}
