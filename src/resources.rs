//! MCP Resources for KWDB metadata.
//!
//! Resources provide passive read-only access to product, database and
//! table information.
//!
//! ## URI Scheme
//!
//! - `kwdb://product_info` - Product name, features and server version
//! - `kwdb://db_info/{database_name}` - Database engine type and properties
//! - `kwdb://table/{table_name}` - Table columns, indexes and example queries
//! - `kwdb://pool_stats` - Connection pool statistics and request counters
//!
//! Listing queries the database for concrete `db_info` and `table` entries.
//! When the database cannot be reached only the static resources and the
//! templates are listed.

use crate::constants::PRODUCT_NAME;
use crate::database::{PoolStats, TableSchema};
use crate::error::ServerError;
use crate::security::validate_identifier;
use crate::server::KwdbMcpServer;
use crate::telemetry::MetricsSnapshot;
use rmcp::model::{
    AnnotateAble, RawResource, RawResourceTemplate, ReadResourceResult, Resource, ResourceContents,
    ResourceTemplate,
};
use serde::Serialize;
use tracing::warn;

const SCHEME: &str = "kwdb://";
const JSON_MIME: &str = "application/json";

/// Build the list of available resources.
pub async fn build_resource_list(server: &KwdbMcpServer) -> Vec<Resource> {
    let mut resources = vec![
        create_resource(
            "kwdb://product_info",
            &format!("{} Product Information", PRODUCT_NAME),
            &format!(
                "General information about the {} product, version, and capabilities",
                PRODUCT_NAME
            ),
        ),
        create_resource(
            "kwdb://pool_stats",
            "Connection Pool Statistics",
            "Connection pool usage, health-check counters and server request metrics",
        ),
    ];

    match server.metadata().list_databases().await {
        Ok(databases) => resources.extend(databases.iter().map(|db| {
            create_resource(
                &format!("kwdb://db_info/{}", db),
                &format!("{} Database: {}", PRODUCT_NAME, db),
                &format!("Information about the {} database", db),
            )
        })),
        Err(e) => {
            warn!(error = %e, "Failed to list databases for resources");
            return resources;
        }
    }

    match server.metadata().list_tables().await {
        Ok(tables) => resources.extend(tables.iter().map(|table| {
            create_resource(
                &format!("kwdb://table/{}", table),
                &format!("Table: {}", table),
                &format!("Schema of the {} table in {}", table, PRODUCT_NAME),
            )
        })),
        Err(e) => warn!(error = %e, "Failed to list tables for resources"),
    }

    resources
}

/// Build resource templates for dynamic resources.
pub fn build_resource_templates() -> Vec<ResourceTemplate> {
    vec![
        create_resource_template(
            "kwdb://db_info/{database_name}",
            &format!("{} Database Information", PRODUCT_NAME),
            &format!(
                "Information about a {} database, including engine type and properties",
                PRODUCT_NAME
            ),
        ),
        create_resource_template(
            "kwdb://table/{table_name}",
            "Table Schema",
            &format!(
                "Columns, indexes and example queries for a table in {}",
                PRODUCT_NAME
            ),
        ),
    ]
}

/// Read a resource by URI.
pub async fn read_resource(
    server: &KwdbMcpServer,
    uri: &str,
) -> Result<ReadResourceResult, ServerError> {
    let parsed = parse_resource_uri(uri).map_err(|e| ServerError::invalid_input(e.to_string()))?;

    let content = match parsed {
        ResourceUri::ProductInfo => to_json(&server.metadata().product_info().await?)?,
        ResourceUri::DatabaseInfo { database } => {
            to_json(&server.metadata().database_info(&database).await?)?
        }
        ResourceUri::Table { table } => {
            let schema = server.metadata().table_schema(&table).await?;
            to_json(&TableSchemaEnvelope::success(schema))?
        }
        ResourceUri::PoolStats => to_json(&PoolStatsPayload {
            pool: server.pool().get_stats(),
            server: server.metrics().snapshot(),
        })?,
    };

    Ok(ReadResourceResult {
        contents: vec![ResourceContents::text(content, uri.to_string())],
    })
}

/// Envelope for `kwdb://table/{table_name}`.
#[derive(Debug, Serialize)]
struct TableSchemaEnvelope {
    status: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    data: TableSchema,
    error: Option<String>,
}

impl TableSchemaEnvelope {
    fn success(data: TableSchema) -> Self {
        Self {
            status: "success",
            kind: "table_schema",
            data,
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct PoolStatsPayload {
    pool: PoolStats,
    server: MetricsSnapshot,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ServerError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ServerError::internal(format!("Failed to serialize resource: {}", e)))
}

// =========================================================================
// Resource URI Parsing
// =========================================================================

/// Parsed resource URI variants.
#[derive(Debug, PartialEq, Eq)]
enum ResourceUri {
    ProductInfo,
    PoolStats,
    DatabaseInfo { database: String },
    Table { table: String },
}

/// Error type for resource URI parsing with detailed context.
#[derive(Debug)]
struct ResourceParseError {
    uri: String,
    reason: ParseErrorReason,
}

#[derive(Debug)]
enum ParseErrorReason {
    InvalidScheme,
    EmptyPath,
    UnknownResourceType { segment: String },
    InvalidIdentifier { identifier: String, reason: String },
    MissingComponent { expected: &'static str },
}

impl std::fmt::Display for ResourceParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid resource URI '{}': ", self.uri)?;
        match &self.reason {
            ParseErrorReason::InvalidScheme => write!(f, "URI must start with '{}'", SCHEME),
            ParseErrorReason::EmptyPath => write!(f, "URI path is empty"),
            ParseErrorReason::UnknownResourceType { segment } => write!(
                f,
                "unknown resource type '{}'. Valid types: product_info, pool_stats, db_info, table",
                segment
            ),
            ParseErrorReason::InvalidIdentifier { identifier, reason } => {
                write!(f, "invalid identifier '{}': {}", identifier, reason)
            }
            ParseErrorReason::MissingComponent { expected } => {
                write!(f, "missing required component: {}", expected)
            }
        }
    }
}

impl std::error::Error for ResourceParseError {}

fn parse_resource_uri(uri: &str) -> Result<ResourceUri, ResourceParseError> {
    let fail = |reason: ParseErrorReason| ResourceParseError {
        uri: uri.to_string(),
        reason,
    };

    let path = uri
        .strip_prefix(SCHEME)
        .ok_or_else(|| fail(ParseErrorReason::InvalidScheme))?;
    if path.is_empty() {
        return Err(fail(ParseErrorReason::EmptyPath));
    }

    let (kind, rest) = match path.split_once('/') {
        Some((kind, rest)) => (kind, Some(rest)),
        None => (path, None),
    };

    match (kind, rest) {
        ("product_info", None) => Ok(ResourceUri::ProductInfo),
        ("pool_stats", None) => Ok(ResourceUri::PoolStats),
        ("db_info", Some(name)) | ("table", Some(name)) if !name.is_empty() => {
            validate_identifier(name).map_err(|e| {
                fail(ParseErrorReason::InvalidIdentifier {
                    identifier: name.to_string(),
                    reason: e.to_string(),
                })
            })?;
            if kind == "db_info" {
                Ok(ResourceUri::DatabaseInfo {
                    database: name.to_string(),
                })
            } else {
                Ok(ResourceUri::Table {
                    table: name.to_string(),
                })
            }
        }
        ("db_info", _) => Err(fail(ParseErrorReason::MissingComponent {
            expected: "database name (kwdb://db_info/{database_name})",
        })),
        ("table", _) => Err(fail(ParseErrorReason::MissingComponent {
            expected: "table name (kwdb://table/{table_name})",
        })),
        (other, _) => Err(fail(ParseErrorReason::UnknownResourceType {
            segment: other.to_string(),
        })),
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn create_resource(uri: &str, name: &str, description: &str) -> Resource {
    let mut resource = RawResource::new(uri, name);
    resource.description = Some(description.to_string());
    resource.mime_type = Some(JSON_MIME.to_string());
    resource.no_annotation()
}

fn create_resource_template(uri_template: &str, name: &str, description: &str) -> ResourceTemplate {
    RawResourceTemplate {
        uri_template: uri_template.to_string(),
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        mime_type: Some(JSON_MIME.to_string()),
    }
    .no_annotation()
}
