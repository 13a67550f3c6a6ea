//! Tool input types with JSON Schema generation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input for the `read-query` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadQueryInput {
    /// SQL query to execute. Only read operations like SELECT, SHOW, EXPLAIN are allowed.
    pub sql: String,
}

/// Input for the `write-query` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriteQueryInput {
    /// SQL query to execute. Supports all write operations including INSERT, UPDATE, DELETE, CREATE, DROP, ALTER, etc.
    pub sql: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_input_schema_requires_sql() {
        let schema = serde_json::to_value(schemars::schema_for!(ReadQueryInput)).unwrap();
        assert_eq!(schema["required"][0], "sql");
        assert!(schema["properties"]["sql"]["description"]
            .as_str()
            .unwrap()
            .contains("SELECT, SHOW, EXPLAIN"));
    }

    #[test]
    fn test_write_input_deserializes() {
        let input: WriteQueryInput =
            serde_json::from_value(serde_json::json!({"sql": "DELETE FROM t"})).unwrap();
        assert_eq!(input.sql, "DELETE FROM t");
    }
}
