//! Database connectivity and query execution.

pub mod metadata;
mod pool;
mod query;
pub mod schema;
pub mod types;

pub use metadata::{
    DatabaseInfo, ExampleQueries, MetadataQueries, ProductInfo, TableMetadata, TableSchema,
};
pub use pool::{ConnectionPool, PoolManager, PoolStats};
pub use query::{ColumnInfo, QueryExecutor, QueryResult};
pub(crate) use query::truncate_for_log;
pub use types::{Record, SqlValue, TypeMapper};
