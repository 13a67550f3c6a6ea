//! # KWDB MCP Server
//!
//! A Model Context Protocol (MCP) server for KWDB (KaiwuDB) time-series
//! databases.
//!
//! This crate provides:
//! - **Tools**: `read-query` and `write-query` statement execution
//! - **Resources**: Product, database and table metadata plus pool statistics
//! - **Prompts**: Syntax guide and operational guides
//!
//! ## Architecture
//!
//! A single [`database::PoolManager`] owns the connection pool. It connects
//! lazily, health-checks on every borrow and rebuilds itself once when a
//! check fails. [`database::QueryExecutor`] routes statements by kind and
//! enforces per-kind deadlines on top of it.

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod handlers;
pub mod prompts;
pub mod resources;
pub mod security;
pub mod server;
pub mod shutdown;
pub mod telemetry;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::ServerError;
pub use server::KwdbMcpServer;
