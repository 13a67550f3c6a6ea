//! Transport selection for the MCP server.
//!
//! - stdio: Standard input/output (default, for desktop MCP clients)
//! - http: Streamable HTTP at `/mcp` (requires the `http` feature)
//!
//! `sse` is still accepted on the command line and served as `http`.

use crate::constants::{DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT};

/// Transport configuration.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Transport type to use.
    pub transport_type: TransportType,

    /// HTTP server configuration (only used for HTTP transport).
    pub http: HttpConfig,
}

/// Available transport types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportType {
    /// Standard input/output transport (default).
    #[default]
    Stdio,

    /// Streamable HTTP transport.
    Http,
}

impl TransportType {
    /// Whether `name` is a deprecated spelling that still parses.
    pub fn is_deprecated_name(name: &str) -> bool {
        name.eq_ignore_ascii_case("sse")
    }
}

/// Error returned when parsing a transport type fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTransportTypeError(String);

impl std::fmt::Display for ParseTransportTypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transport type: '{}' (expected stdio or http)",
            self.0
        )
    }
}

impl std::error::Error for ParseTransportTypeError {}

impl std::str::FromStr for TransportType {
    type Err = ParseTransportTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdio" => Ok(TransportType::Stdio),
            "http" | "sse" => Ok(TransportType::Http),
            _ => Err(ParseTransportTypeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Stdio => write!(f, "stdio"),
            TransportType::Http => write!(f, "http"),
        }
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Enable permissive CORS.
    pub enable_cors: bool,

    /// Trace every HTTP request via tower-http `TraceLayer`.
    pub enable_tracing: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

impl HttpConfig {
    /// Apply `KWDB_HTTP_CORS` and `KWDB_HTTP_TRACING` on top of `self`.
    pub fn with_env(mut self) -> Self {
        if let Ok(cors) = std::env::var("KWDB_HTTP_CORS") {
            self.enable_cors = cors.to_lowercase() == "true" || cors == "1";
        }

        if let Ok(tracing) = std::env::var("KWDB_HTTP_TRACING") {
            self.enable_tracing = tracing.to_lowercase() == "true" || tracing == "1";
        }

        self
    }

    /// Socket address string to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Streamable HTTP server (only available with the `http` feature).
#[cfg(feature = "http")]
pub mod http_server {
    use super::*;
    use crate::server::KwdbMcpServer;
    use crate::shutdown::SharedShutdownController;
    use axum::{response::IntoResponse, routing::get, Json, Router};
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    };
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;
    use tracing::info;

    /// Serve `mcp_server` over streamable HTTP until the shutdown signal.
    ///
    /// Endpoints:
    /// - `/mcp` - MCP streamable HTTP endpoint
    /// - `/health` and `/` - Health check
    pub async fn start_http_server(
        mcp_server: KwdbMcpServer,
        config: HttpConfig,
        shutdown_controller: SharedShutdownController,
    ) -> Result<(), anyhow::Error> {
        let mcp_service = StreamableHttpService::new(
            move || Ok(mcp_server.clone()),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        let mut app = Router::new()
            .route("/health", get(health_handler))
            .route("/", get(health_handler))
            .nest_service("/mcp", mcp_service);

        if config.enable_cors {
            app = app.layer(CorsLayer::permissive());
        }
        if config.enable_tracing {
            app = app.layer(TraceLayer::new_for_http());
        }

        let addr = config.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!("HTTP server listening on http://{}", addr);
        info!("MCP endpoint: http://{}/mcp", addr);

        let mut shutdown_signal = shutdown_controller.signal();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal.recv().await;
                info!("HTTP server received shutdown signal");
            })
            .await?;

        Ok(())
    }

    async fn health_handler() -> impl IntoResponse {
        Json(serde_json::json!({
            "status": "healthy",
            "server": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "transport": "http",
            "endpoints": {
                "mcp": "/mcp",
                "health": "/health"
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport() {
        assert_eq!("stdio".parse::<TransportType>().unwrap(), TransportType::Stdio);
        assert_eq!("HTTP".parse::<TransportType>().unwrap(), TransportType::Http);
        assert_eq!("sse".parse::<TransportType>().unwrap(), TransportType::Http);
        assert!("websocket".parse::<TransportType>().is_err());
    }

    #[test]
    fn test_deprecated_names() {
        assert!(TransportType::is_deprecated_name("SSE"));
        assert!(!TransportType::is_deprecated_name("http"));
    }

    #[test]
    fn test_http_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(TransportConfig::default().transport_type, TransportType::Stdio);
    }
}
