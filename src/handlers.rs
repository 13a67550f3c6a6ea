//! ServerHandler implementation for the KWDB MCP Server.
//!
//! This module implements the rmcp `ServerHandler` trait which defines how
//! the server responds to MCP protocol requests.

use crate::constants::PRODUCT_NAME;
use crate::prompts::{build_prompt_list, get_prompt};
use crate::resources::{build_resource_list, build_resource_templates, read_resource};
use crate::server::KwdbMcpServer;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    GetPromptRequestParam, GetPromptResult, Implementation, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, PaginatedRequestParam, ProtocolVersion,
    ReadResourceRequestParam, ReadResourceResult, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{tool_handler, ErrorData};
use std::collections::HashMap;
use tracing::{debug, info};

/// The `#[tool_handler]` macro wires up tool routing automatically.
/// It generates the `list_tools` and `call_tool` method implementations.
#[tool_handler]
impl ServerHandler for KwdbMcpServer {
    fn get_info(&self) -> ServerInfo {
        info!("MCP client requesting server info");

        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: format!("{} MCP Server", PRODUCT_NAME),
                title: Some(format!("{} MCP Server", PRODUCT_NAME)),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(build_instructions(self)),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let resources = build_resource_list(self).await;
        debug!(count = resources.len(), "Listing resources");
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, ErrorData> {
        Ok(ListResourceTemplatesResult::with_all_items(
            build_resource_templates(),
        ))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        debug!(uri = %request.uri, "Reading resource");
        read_resource(self, &request.uri).await.map_err(Into::into)
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, ErrorData> {
        Ok(ListPromptsResult::with_all_items(build_prompt_list()))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, ErrorData> {
        // Prompt arguments arrive as JSON values; non-strings are stringified
        let arguments: Option<HashMap<String, String>> = request.arguments.map(|map| {
            map.into_iter()
                .map(|(k, v)| match v {
                    serde_json::Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect()
        });

        get_prompt(self, &request.name, arguments.as_ref())
            .await
            .map_err(Into::into)
    }
}

/// Build server instructions from the active configuration.
fn build_instructions(server: &KwdbMcpServer) -> String {
    let query = &server.config().query;
    format!(
        "This server allows you to interact with {product} databases using SQL.\n\n\
         ## Tools\n\
         - `read-query`: SELECT, SHOW, EXPLAIN and other read-only statements. \
         SELECT statements without a LIMIT get `LIMIT {limit}` appended.\n\
         - `write-query`: INSERT, UPDATE, DELETE, CREATE, DROP, ALTER and other \
         data or schema changes.\n\n\
         ## Resources\n\
         - `kwdb://product_info`, `kwdb://db_info/{{database_name}}`, \
         `kwdb://table/{{table_name}}`, `kwdb://pool_stats`\n\n\
         ## Limits\n\
         - Read queries time out after {read}s, write queries after {write}s.\n",
        product = PRODUCT_NAME,
        limit = query.auto_limit,
        read = query.read_timeout.as_secs(),
        write = query.write_timeout.as_secs(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, PoolConfig, QueryConfig};

    #[tokio::test]
    async fn test_server_info() {
        let server = KwdbMcpServer::new(Config {
            connection_string: "postgresql://root@127.0.0.1:1/defaultdb".to_string(),
            pool: PoolConfig::default(),
            query: QueryConfig::default(),
        })
        .unwrap();

        let info = server.get_info();
        assert_eq!(info.server_info.name, "KWDB (KaiwuDB) MCP Server");
        let instructions = info.instructions.unwrap();
        assert!(instructions
            .starts_with("This server allows you to interact with KWDB (KaiwuDB) databases using SQL."));
        assert!(instructions.contains("LIMIT 20"));
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_some());
        assert!(info.capabilities.prompts.is_some());
    }

    #[tokio::test]
    async fn test_tool_router_lists_both_tools() {
        let server = KwdbMcpServer::new(Config {
            connection_string: "postgresql://root@127.0.0.1:1/defaultdb".to_string(),
            pool: PoolConfig::default(),
            query: QueryConfig::default(),
        })
        .unwrap();

        let mut names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["read-query", "write-query"]);
    }
}
