//! KWDB catalog lookups backing resources and prompts.
//!
//! Every lookup borrows through the shared pool via [`QueryExecutor`], so it
//! benefits from the same health check and reinitialization as tool calls.
//! Secondary details (encoding, owner, table type, indexes) degrade to
//! defaults with a warning instead of failing the whole lookup.

use crate::constants::{DEFAULT_ENGINE_TYPE, PRODUCT_NAME};
use crate::database::query::QueryExecutor;
use crate::database::schema::{
    extract_partition_info, generate_read_examples, generate_write_examples,
    indexes_from_catalog_rows, indexes_from_create_sql, infer_table_type, parse_version,
    ColumnSpec, IndexInfo, PartitionInfo, VersionInfo,
};
use crate::database::types::{Record, SqlValue};
use crate::error::ServerError;
use crate::security::{parse_qualified_name, quote_literal, safe_identifier};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Product-level information served by `kwdb://product_info`.
#[derive(Debug, Clone, Serialize)]
pub struct ProductInfo {
    pub product_name: String,
    pub description: String,
    pub features: Vec<String>,
    pub version_info: VersionInfo,
}

/// Database information served by `kwdb://db_info/{database_name}`.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub version: String,
    pub engine_type: String,
    pub comment: String,
    pub properties: BTreeMap<String, String>,
    /// Only listed for the database the pool is connected to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<String>>,
}

/// Structural metadata derived from `SHOW CREATE TABLE`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableMetadata {
    pub table_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_info: Option<PartitionInfo>,
}

/// Example statements for a table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExampleQueries {
    pub read: Vec<String>,
    pub write: Vec<String>,
}

/// Everything `kwdb://table/{table_name}` reports about a table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<Record>,
    pub read_example_queries: Vec<String>,
    pub write_example_queries: Vec<String>,
    #[serde(flatten)]
    pub metadata: TableMetadata,
}

/// Catalog lookups against the connected KWDB instance.
pub struct MetadataQueries {
    executor: Arc<QueryExecutor>,
}

impl MetadataQueries {
    /// Create a new metadata query helper.
    pub fn new(executor: Arc<QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Product name, feature list and parsed server version.
    pub async fn product_info(&self) -> Result<ProductInfo, ServerError> {
        let version = self.server_version().await?;

        Ok(ProductInfo {
            product_name: PRODUCT_NAME.to_string(),
            description: "Time-series database with advanced analytics capabilities".to_string(),
            features: vec![
                "Time-series data storage".to_string(),
                "SQL query support".to_string(),
                "High-performance analytics".to_string(),
                "Scalable architecture".to_string(),
            ],
            version_info: parse_version(&version),
        })
    }

    /// All non-template databases.
    pub async fn list_databases(&self) -> Result<Vec<String>, ServerError> {
        let rows = self
            .executor
            .fetch_records("SELECT datname FROM pg_database WHERE datistemplate = false")
            .await?;
        Ok(first_column_strings(&rows))
    }

    /// Name of the database the pool is connected to, if it can be read.
    pub async fn current_database(&self) -> Option<String> {
        match self.scalar("SELECT current_database()").await {
            Ok(name) => name,
            Err(e) => {
                warn!(error = %e, "Failed to get current database name");
                None
            }
        }
    }

    /// Tables in the `public` schema of the current database.
    pub async fn list_tables(&self) -> Result<Vec<String>, ServerError> {
        let rows = self
            .executor
            .fetch_records(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'public' ORDER BY table_name",
            )
            .await?;
        Ok(first_column_strings(&rows))
    }

    /// Tables of a named database.
    ///
    /// Falls back to `pg_catalog.pg_tables`, which only covers the current
    /// database, when `information_schema` cannot be queried.
    pub async fn tables_for_database(&self, database: &str) -> Result<Vec<String>, ServerError> {
        let sql = format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_catalog = {} AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            quote_literal(database)
        );

        match self.executor.fetch_records(&sql).await {
            Ok(rows) => Ok(first_column_strings(&rows)),
            Err(e) => {
                warn!(database, error = %e, "information_schema lookup failed, trying pg_tables");
                if self.current_database().await.as_deref() != Some(database) {
                    return Err(ServerError::invalid_input(format!(
                        "cannot list tables for database {}: not connected to this database",
                        database
                    )));
                }
                let rows = self
                    .executor
                    .fetch_records(
                        "SELECT tablename FROM pg_catalog.pg_tables \
                         WHERE schemaname = 'public' ORDER BY tablename",
                    )
                    .await?;
                Ok(first_column_strings(&rows))
            }
        }
    }

    /// Version, engine type and properties of a database.
    pub async fn database_info(&self, name: &str) -> Result<DatabaseInfo, ServerError> {
        let version = self.server_version().await?;
        let engine_type = self.engine_type(name).await;
        let literal = quote_literal(name);

        let mut properties = BTreeMap::new();
        let encoding = format!(
            "SELECT pg_encoding_to_char(encoding) FROM pg_database WHERE datname = {}",
            literal
        );
        if let Ok(Some(encoding)) = self.scalar(&encoding).await {
            properties.insert("encoding".to_string(), encoding);
        }
        let owner = format!(
            "SELECT pg_catalog.pg_get_userbyid(d.datdba) AS owner \
             FROM pg_catalog.pg_database d WHERE d.datname = {}",
            literal
        );
        if let Ok(Some(owner)) = self.scalar(&owner).await {
            properties.insert("owner".to_string(), owner);
        }
        let created = format!(
            "SELECT MIN(mod_time) AS creation_time FROM kwdb_internal.tables \
             WHERE database_name = {}",
            literal
        );
        let creation_time = self.scalar(&created).await.ok().flatten().unwrap_or_default();
        properties.insert("creation_time".to_string(), creation_time);

        let tables = if self.current_database().await.as_deref() == Some(name) {
            match self.tables_for_database(name).await {
                Ok(tables) => Some(tables),
                Err(e) => {
                    warn!(database = name, error = %e, "Failed to list tables");
                    None
                }
            }
        } else {
            None
        };

        Ok(DatabaseInfo {
            name: name.to_string(),
            version,
            engine_type,
            comment: String::new(),
            properties,
            tables,
        })
    }

    /// Column listing from `SHOW COLUMNS ... WITH COMMENT`.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<Record>, ServerError> {
        let ident = safe_identifier(table)?;
        self.executor
            .fetch_records(&format!("SHOW COLUMNS FROM {} WITH COMMENT", ident))
            .await
    }

    /// Table type, primary key, indexes and partitioning.
    pub async fn table_metadata(&self, table: &str) -> Result<TableMetadata, ServerError> {
        let create_sql = self.create_statement(table).await?;
        let table_type = self.table_type(table, &create_sql).await;

        let (indexes, primary_key) = match self.indexes(table, &create_sql, &table_type).await {
            Ok(found) => found,
            Err(e) => {
                warn!(table, error = %e, "Failed to get indexes");
                (Vec::new(), Vec::new())
            }
        };

        Ok(TableMetadata {
            partition_info: extract_partition_info(&create_sql),
            table_type,
            primary_key,
            indexes,
        })
    }

    /// Read and write examples derived from the table's column types.
    pub async fn example_queries(&self, table: &str) -> Result<ExampleQueries, ServerError> {
        let (_, bare_name) = parse_qualified_name(table)?;
        let exists = format!(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = {})",
            quote_literal(&bare_name)
        );
        let found = self
            .executor
            .fetch_records(&exists)
            .await?
            .first()
            .and_then(|r| r.iter().next().map(|(_, v)| is_true(v)))
            .unwrap_or(false);
        if !found {
            return Err(ServerError::resource_not_found(format!(
                "table {} does not exist",
                table
            )));
        }

        let columns = self.column_specs(table).await?;
        Ok(ExampleQueries {
            read: generate_read_examples(table, &columns),
            write: generate_write_examples(table, &columns),
        })
    }

    /// Columns, metadata and examples in one payload.
    ///
    /// Only the column listing is required; metadata and examples fall back
    /// to empty values with a warning.
    pub async fn table_schema(&self, table: &str) -> Result<TableSchema, ServerError> {
        let columns = self.table_columns(table).await?;

        let metadata = self.table_metadata(table).await.unwrap_or_else(|e| {
            warn!(table, error = %e, "Failed to get table metadata");
            TableMetadata::default()
        });
        let examples = self.example_queries(table).await.unwrap_or_else(|e| {
            warn!(table, error = %e, "Failed to get example queries");
            ExampleQueries::default()
        });

        Ok(TableSchema {
            table_name: table.to_string(),
            columns,
            read_example_queries: examples.read,
            write_example_queries: examples.write,
            metadata,
        })
    }

    /// Column specs used by the example generators.
    pub async fn column_specs(&self, table: &str) -> Result<Vec<ColumnSpec>, ServerError> {
        let rows = self.table_columns(table).await?;
        Ok(rows.iter().filter_map(ColumnSpec::from_record).collect())
    }

    async fn server_version(&self) -> Result<String, ServerError> {
        self.scalar("SELECT version()")
            .await?
            .ok_or_else(|| ServerError::internal("failed to get database version"))
    }

    /// Engine type from `SHOW DATABASES`, defaulting to KaiwuDB.
    async fn engine_type(&self, name: &str) -> String {
        let rows = match self.executor.fetch_records("SHOW DATABASES").await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to execute SHOW DATABASES");
                return DEFAULT_ENGINE_TYPE.to_string();
            }
        };

        rows.iter()
            .find(|r| r.get_string("database_name").as_deref() == Some(name))
            .and_then(|r| r.get_string("engine_type"))
            .unwrap_or_else(|| DEFAULT_ENGINE_TYPE.to_string())
    }

    async fn create_statement(&self, table: &str) -> Result<String, ServerError> {
        let ident = safe_identifier(table)?;
        let rows = self
            .executor
            .fetch_records(&format!("SHOW CREATE TABLE {}", ident))
            .await?;
        let row = rows.first().ok_or_else(|| {
            ServerError::resource_not_found(format!("no rows returned by SHOW CREATE TABLE {}", table))
        })?;
        let create_sql = row
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case("create_statement"))
            .and_then(|(_, v)| v.as_str().map(str::to_string))
            .ok_or_else(|| {
                ServerError::internal("create_statement column not found in SHOW CREATE TABLE result")
            });
        create_sql
    }

    /// Table type from `SHOW TABLES`, else inferred from the DDL.
    async fn table_type(&self, table: &str, create_sql: &str) -> String {
        let bare_name = parse_qualified_name(table)
            .map(|(_, name)| name)
            .unwrap_or_else(|_| table.to_string());

        match self.executor.fetch_records("SHOW TABLES").await {
            Ok(rows) => rows
                .iter()
                .find_map(|r| {
                    let mut values = r.iter().map(|(_, v)| v.to_display_string());
                    match (values.next(), values.next()) {
                        (Some(name), Some(kind)) if name == bare_name => Some(kind),
                        _ => None,
                    }
                })
                .unwrap_or_else(|| infer_table_type(create_sql).to_string()),
            Err(e) => {
                warn!(error = %e, "Failed to get table types from SHOW TABLES");
                infer_table_type(create_sql).to_string()
            }
        }
    }

    /// Indexes from the DDL, falling back to the system catalog.
    async fn indexes(
        &self,
        table: &str,
        create_sql: &str,
        table_type: &str,
    ) -> Result<(Vec<IndexInfo>, Vec<String>), ServerError> {
        let first_column = self
            .table_columns(table)
            .await
            .ok()
            .and_then(|cols| cols.first().and_then(|c| c.get_string("column_name")));

        let (indexes, primary_key) =
            indexes_from_create_sql(create_sql, table_type, first_column.as_deref());
        if !indexes.is_empty() {
            return Ok((indexes, primary_key));
        }

        let (_, bare_name) = parse_qualified_name(table)?;
        let sql = format!(
            "SELECT i.relname AS index_name, a.attname AS column_name, \
                    ix.indisprimary AS is_primary, ix.indisunique AS is_unique, \
                    am.amname AS index_type \
             FROM pg_index ix \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
             JOIN pg_am am ON am.oid = i.relam \
             WHERE t.relname = {} \
             ORDER BY i.relname, a.attnum",
            quote_literal(&bare_name)
        );
        let rows = self.executor.fetch_records(&sql).await?;
        Ok(indexes_from_catalog_rows(&rows))
    }

    /// First column of the first row, rendered as text.
    async fn scalar(&self, sql: &str) -> Result<Option<String>, ServerError> {
        let rows = self.executor.fetch_records(sql).await?;
        Ok(rows.first().and_then(|r| {
            r.iter()
                .next()
                .filter(|(_, v)| !v.is_null())
                .map(|(_, v)| v.to_display_string())
        }))
    }
}

fn first_column_strings(rows: &[Record]) -> Vec<String> {
    rows.iter()
        .filter_map(|r| r.iter().next())
        .filter(|(_, v)| !v.is_null())
        .map(|(_, v)| v.to_display_string())
        .collect()
}

fn is_true(value: &SqlValue) -> bool {
    match value {
        SqlValue::Bool(b) => *b,
        SqlValue::Text(s) => matches!(s.as_str(), "t" | "true"),
        SqlValue::Int(i) => *i != 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::database::pool::PoolManager;

    fn offline_metadata() -> MetadataQueries {
        let pool = Arc::new(PoolManager::new());
        MetadataQueries::new(Arc::new(QueryExecutor::new(pool, &QueryConfig::default())))
    }

    #[tokio::test]
    async fn test_table_metadata_requires_pool() {
        let err = offline_metadata().table_metadata("sensors").await.unwrap_err();
        assert!(matches!(err, ServerError::NotInitialized(_)), "{:?}", err);
    }

    #[test]
    fn test_first_column_strings_skips_nulls() {
        let mut a = Record::default();
        a.push("datname", SqlValue::Text("defaultdb".to_string()));
        let mut b = Record::default();
        b.push("datname", SqlValue::Null);
        let mut c = Record::default();
        c.push("datname", SqlValue::Text("tsdb".to_string()));

        assert_eq!(first_column_strings(&[a, b, c]), vec!["defaultdb", "tsdb"]);
    }

    #[test]
    fn test_is_true() {
        assert!(is_true(&SqlValue::Bool(true)));
        assert!(is_true(&SqlValue::Text("t".to_string())));
        assert!(!is_true(&SqlValue::Text("f".to_string())));
        assert!(!is_true(&SqlValue::Null));
    }

    #[test]
    fn test_table_schema_serializes_flat() {
        let schema = TableSchema {
            table_name: "sensors".to_string(),
            columns: Vec::new(),
            read_example_queries: vec!["SELECT * FROM sensors LIMIT 10;".to_string()],
            write_example_queries: Vec::new(),
            metadata: TableMetadata {
                table_type: "TIME SERIES TABLE".to_string(),
                primary_key: vec!["site".to_string()],
                indexes: Vec::new(),
                partition_info: None,
            },
        };
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["table_type"], "TIME SERIES TABLE");
        assert_eq!(json["primary_key"][0], "site");
        assert!(json.get("partition_info").is_none());
    }
}
