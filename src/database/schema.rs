//! Text heuristics over KWDB catalog output.
//!
//! Everything here is pure: version strings, `SHOW CREATE TABLE` text and
//! column listings go in, structured metadata and example statements come
//! out. Nothing in this module talks to the database.

use crate::constants::{BASE_TABLE, TIME_SERIES_TABLE};
use crate::database::types::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern)
        .unwrap_or_else(|e| panic!("Internal error: invalid regex pattern '{}': {}", pattern, e))
}

static PRIMARY_TAGS: Lazy<Regex> = Lazy::new(|| compile(r"PRIMARY\s+TAGS\s*\(\s*([^)]+)\s*\)"));
static PRIMARY_KEY: Lazy<Regex> = Lazy::new(|| compile(r"PRIMARY\s+KEY\s*\(\s*([^)]+)\s*\)"));
static TAG_COLUMN: Lazy<Regex> = Lazy::new(|| compile(r"^\s*(\w+)\s+\S"));
static INDEX_DEF: Lazy<Regex> = Lazy::new(|| {
    compile(r"(UNIQUE\s+)?(?:KEY|INDEX)\s+(\S+)\s*\(([^)]+)\)(?:\s+(?:USING\s+(\S+)))?")
});
static PARTITION_BY: Lazy<Regex> = Lazy::new(|| compile(r"(?i)PARTITION\s+BY\s+(\w+)\s*\(([^)]+)\)"));
static PARTITION_INTERVAL: Lazy<Regex> =
    Lazy::new(|| compile(r#"(?i)INTERVAL\s+(['"]?)([^'"]+)(['"]?)"#));

// =============================================================================
// Version string
// =============================================================================

/// Version details parsed from `SELECT version()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub full_version: String,
    pub build_date: String,
    pub platform: String,
    pub api_version: String,
}

/// Parse a version string such as
/// `KaiwuDB 2.1.1 (x86_64-linux-gnu, built 2024/12/04 07:44:35, go1.16.15)`.
///
/// Fields that cannot be found are reported as `"unknown"`.
pub fn parse_version(full: &str) -> VersionInfo {
    let unknown = || "unknown".to_string();

    let version = if full.contains("KaiwuDB") {
        full.split(' ').nth(1).map(str::to_string)
    } else {
        None
    };

    let build_date = full.find("built ").and_then(|start| {
        let rest = &full[start + "built ".len()..];
        rest.find(',')
            .filter(|&end| end > 0)
            .map(|end| rest[..end].trim().to_string())
    });

    let platform = match (full.find('('), full.find(',')) {
        (Some(open), Some(comma)) if open > 0 && comma > open && full.contains(')') => {
            Some(full[open + 1..comma].trim().to_string())
        }
        _ => None,
    };

    VersionInfo {
        version: version.unwrap_or_else(unknown),
        full_version: full.to_string(),
        build_date: build_date.unwrap_or_else(unknown),
        platform: platform.unwrap_or_else(unknown),
        api_version: "v1".to_string(),
    }
}

// =============================================================================
// CREATE TABLE inspection
// =============================================================================

/// An index described by a table's DDL or the system catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>,
}

impl IndexInfo {
    fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            unique: false,
            index_type: None,
        }
    }
}

/// Partitioning declared in a table's DDL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub partition_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

/// Guess the table type from DDL when `SHOW TABLES` cannot tell us.
pub fn infer_table_type(create_sql: &str) -> &'static str {
    if create_sql.contains("TAGS") || create_sql.contains("TIME SERIES") {
        TIME_SERIES_TABLE
    } else {
        BASE_TABLE
    }
}

/// Whether a table type names a time-series table.
pub fn is_time_series(table_type: &str) -> bool {
    table_type.eq_ignore_ascii_case(TIME_SERIES_TABLE)
}

/// Extract partition details, or `None` if the table is not partitioned.
pub fn extract_partition_info(create_sql: &str) -> Option<PartitionInfo> {
    let upper = create_sql.to_uppercase();
    if !upper.contains("PARTITION BY") {
        return None;
    }

    let mut info = PartitionInfo::default();
    if let Some(caps) = PARTITION_BY.captures(create_sql) {
        info.partition_type = Some(caps[1].to_uppercase());
        info.key = Some(trim_quotes(&caps[2]).to_string());
    }
    if upper.contains("INTERVAL") {
        if let Some(caps) = PARTITION_INTERVAL.captures(create_sql) {
            info.interval = Some(caps[2].trim().to_string());
        }
    }
    Some(info)
}

/// Derive indexes and primary key columns from DDL.
///
/// Time-series tables get a time index on their first column, a primary tag
/// index, and one index per remaining tag. Relational tables get their
/// primary key and any `KEY`/`INDEX` definitions.
pub fn indexes_from_create_sql(
    create_sql: &str,
    table_type: &str,
    first_column: Option<&str>,
) -> (Vec<IndexInfo>, Vec<String>) {
    if is_time_series(table_type) {
        time_series_indexes(create_sql, first_column)
    } else {
        relational_indexes(create_sql)
    }
}

fn time_series_indexes(
    create_sql: &str,
    first_column: Option<&str>,
) -> (Vec<IndexInfo>, Vec<String>) {
    let mut indexes = Vec::new();
    let mut primary_key = Vec::new();

    if let Some(column) = first_column {
        indexes.push(IndexInfo::new("time index", vec![column.to_string()]));
    }

    if let Some(caps) = PRIMARY_TAGS.captures(create_sql) {
        primary_key = split_column_list(&caps[1]);
        indexes.push(IndexInfo::new("primary tag", primary_key.clone()));
    }

    if let Some(section) = tag_section(create_sql) {
        for def in split_top_level(section) {
            if let Some(caps) = TAG_COLUMN.captures(def) {
                let name = &caps[1];
                if !primary_key.iter().any(|pk| pk == name) {
                    indexes.push(IndexInfo::new("tag", vec![name.to_string()]));
                }
            }
        }
    }

    (indexes, primary_key)
}

fn relational_indexes(create_sql: &str) -> (Vec<IndexInfo>, Vec<String>) {
    let mut indexes = Vec::new();
    let mut primary_key = Vec::new();

    if let Some(caps) = PRIMARY_KEY.captures(create_sql) {
        primary_key = split_column_list(&caps[1]);
        indexes.push(IndexInfo::new("primary key", primary_key.clone()));
    }

    for caps in INDEX_DEF.captures_iter(create_sql) {
        let columns = caps[3]
            .split(',')
            .map(|col| {
                // `column`(10) on prefix indexes
                let col = col.split('(').next().unwrap_or(col);
                column_name(col)
            })
            .collect();

        indexes.push(IndexInfo {
            name: trim_quotes(&caps[2]).to_string(),
            columns,
            unique: caps.get(1).is_some(),
            index_type: caps.get(4).map(|m| m.as_str().to_string()),
        });
    }

    (indexes, primary_key)
}

/// Body of the first `TAGS (...)` clause that is not `PRIMARY TAGS`,
/// with nested parentheses balanced.
fn tag_section(create_sql: &str) -> Option<&str> {
    let bytes = create_sql.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = create_sql[search_from..].find("TAGS") {
        let start = search_from + offset;
        search_from = start + "TAGS".len();

        let preceded_by_primary = create_sql[..start].trim_end().ends_with("PRIMARY");
        let word_boundary = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
        if preceded_by_primary || !word_boundary {
            continue;
        }

        let after = &create_sql[search_from..];
        let open = after.len() - after.trim_start().len();
        if !after[open..].starts_with('(') {
            continue;
        }

        let body_start = search_from + open + 1;
        let mut depth = 1usize;
        for (i, ch) in create_sql[body_start..].char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&create_sql[body_start..body_start + i]);
                    }
                }
                _ => {}
            }
        }
        return None;
    }
    None
}

/// Split on commas that are not nested in parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn split_column_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(column_name)
        .filter(|c| !c.is_empty())
        .collect()
}

/// Strip quoting and a trailing sort direction from an index column.
fn column_name(def: &str) -> String {
    let def = def.trim();
    let upper = def.to_ascii_uppercase();
    let bare = [" ASC", " DESC"]
        .iter()
        .find(|suffix| upper.ends_with(*suffix))
        .map(|suffix| def[..def.len() - suffix.len()].trim_end())
        .unwrap_or(def);
    trim_quotes(bare).to_string()
}

fn trim_quotes(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '`' || c == '"' || c == '\'')
}

/// Group system-catalog index rows (one row per index column) into indexes.
///
/// Expects `index_name`, `column_name`, `is_primary`, `is_unique` and
/// `index_type` columns. Index order follows first appearance.
pub fn indexes_from_catalog_rows(rows: &[Record]) -> (Vec<IndexInfo>, Vec<String>) {
    let mut indexes: Vec<IndexInfo> = Vec::new();
    let mut primary_key = Vec::new();

    for row in rows {
        let (Some(index_name), Some(column_name)) =
            (row.get_string("index_name"), row.get_string("column_name"))
        else {
            continue;
        };
        let is_primary = row.get_string("is_primary").is_some_and(|v| is_truthy(&v));
        let is_unique = row.get_string("is_unique").is_some_and(|v| is_truthy(&v));

        if is_primary {
            primary_key.push(column_name.clone());
        }

        match indexes.iter_mut().find(|idx| idx.name == index_name) {
            Some(index) => index.columns.push(column_name),
            None => indexes.push(IndexInfo {
                name: index_name,
                columns: vec![column_name],
                unique: is_unique,
                index_type: row.get_string("index_type"),
            }),
        }
    }

    (indexes, primary_key)
}

fn is_truthy(v: &str) -> bool {
    matches!(v, "true" | "t" | "1")
}

// =============================================================================
// Example queries
// =============================================================================

/// Column name and declared type, as listed by `SHOW COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: String,
    pub generated: bool,
}

impl ColumnSpec {
    /// Build from a `SHOW COLUMNS` record; `None` if the name is missing.
    pub fn from_record(record: &Record) -> Option<Self> {
        let name = record.get_string("column_name")?;
        let data_type = record.get_string("data_type").unwrap_or_default();
        let generated = record
            .get_string("generation_expression")
            .is_some_and(|expr| !expr.is_empty());
        Some(Self {
            name,
            data_type,
            generated,
        })
    }

    fn type_contains(&self, needle: &str) -> bool {
        self.data_type.to_lowercase().contains(needle)
    }

    fn is_integer(&self) -> bool {
        self.type_contains("int")
    }

    fn is_text(&self) -> bool {
        self.type_contains("char") || self.type_contains("text")
    }

    fn is_temporal(&self) -> bool {
        self.type_contains("date") || self.type_contains("time")
    }

    fn is_id(&self) -> bool {
        self.name == "id" || self.name.ends_with("_id")
    }
}

/// Example read statements for a table, driven by its column types.
pub fn generate_read_examples(table: &str, columns: &[ColumnSpec]) -> Vec<String> {
    let mut examples = vec![format!("SELECT * FROM {} LIMIT 10;", table)];
    if columns.is_empty() {
        return examples;
    }

    let projected: Vec<&str> = columns.iter().take(3).map(|c| c.name.as_str()).collect();
    examples.push(format!(
        "SELECT {} FROM {} LIMIT 10;",
        projected.join(", "),
        table
    ));

    let filter = columns.iter().find_map(|c| {
        if c.is_integer() {
            Some(format!("{} > 0", c.name))
        } else if c.is_text() {
            Some(format!("{} LIKE 'A%'", c.name))
        } else if c.is_temporal() {
            Some(format!("{} > NOW() - INTERVAL '1 month'", c.name))
        } else {
            None
        }
    });
    if let Some(filter) = filter {
        examples.push(format!("SELECT * FROM {} WHERE {} LIMIT 10;", table, filter));
    }

    examples.push(format!(
        "SELECT * FROM {} ORDER BY {} DESC LIMIT 10;",
        table, columns[0].name
    ));

    if columns.len() > 1 {
        let group_by = columns.iter().find(|c| c.is_text());
        let aggregate = columns.iter().find(|c| c.is_integer());
        if let (Some(group_by), Some(aggregate)) = (group_by, aggregate) {
            examples.push(format!(
                "SELECT {g}, COUNT(*), AVG({a}) FROM {t} GROUP BY {g} LIMIT 10;",
                g = group_by.name,
                a = aggregate.name,
                t = table
            ));
        }
    }

    examples
}

/// Example write statements for a table, driven by its column types.
pub fn generate_write_examples(table: &str, columns: &[ColumnSpec]) -> Vec<String> {
    let mut examples = Vec::new();
    if columns.is_empty() {
        return examples;
    }

    let insertable: Vec<&ColumnSpec> = columns.iter().filter(|c| !c.generated).collect();
    if !insertable.is_empty() {
        let names: Vec<&str> = insertable.iter().map(|c| c.name.as_str()).collect();
        let values: Vec<&str> = insertable.iter().map(|c| sample_value(c)).collect();
        examples.push(format!(
            "INSERT INTO {} ({}) VALUES ({});",
            table,
            names.join(", "),
            values.join(", ")
        ));
    }

    let update_col = columns.iter().find(|c| c.is_text());
    let update_key = columns
        .iter()
        .find(|c| !c.is_text() && (c.is_integer() || c.is_id()));
    match (update_col, update_key) {
        (Some(col), Some(key)) => examples.push(format!(
            "UPDATE {} SET {} = 'new_value' WHERE {} = 1;",
            table, col.name, key.name
        )),
        (Some(col), None) => examples.push(format!(
            "UPDATE {} SET {} = 'new_value' LIMIT 1;",
            table, col.name
        )),
        _ => {}
    }

    match columns.iter().find(|c| c.is_id() || c.is_integer()) {
        Some(key) => examples.push(format!("DELETE FROM {} WHERE {} = 1;", table, key.name)),
        None => examples.push(format!(
            "DELETE FROM {} WHERE false; -- Add your condition here",
            table
        )),
    }

    examples
}

fn sample_value(column: &ColumnSpec) -> &'static str {
    if column.is_integer() {
        "42"
    } else if column.is_text() {
        "'example_value'"
    } else if column.is_temporal() {
        "NOW()"
    } else if column.type_contains("bool") {
        "true"
    } else if column.type_contains("numeric") || column.type_contains("decimal") {
        "123.45"
    } else {
        "NULL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::types::SqlValue;

    const TS_DDL: &str = "CREATE TABLE sensors (\n  ts TIMESTAMPTZ NOT NULL,\n  value FLOAT8 NULL\n) TAGS (\n  site VARCHAR(20) NOT NULL,\n  device INT4 NOT NULL,\n  region VARCHAR(10)\n) PRIMARY TAGS(site, device)\n  retentions 0s\n  activetime 1d\n  partition interval 10d";

    fn col(name: &str, data_type: &str) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            data_type: data_type.to_string(),
            generated: false,
        }
    }

    #[test]
    fn test_parse_version() {
        let info = parse_version(
            "KaiwuDB 2.1.1 (x86_64-linux-gnu, built 2024/12/04 07:44:35, go1.16.15, gcc 13.2.0)",
        );
        assert_eq!(info.version, "2.1.1");
        assert_eq!(info.build_date, "2024/12/04 07:44:35");
        assert_eq!(info.platform, "x86_64-linux-gnu");
        assert_eq!(info.api_version, "v1");
    }

    #[test]
    fn test_parse_version_unrecognised() {
        let info = parse_version("PostgreSQL 16.2");
        assert_eq!(info.version, "unknown");
        assert_eq!(info.build_date, "unknown");
        assert_eq!(info.platform, "unknown");
        assert_eq!(info.full_version, "PostgreSQL 16.2");
    }

    #[test]
    fn test_infer_table_type() {
        assert_eq!(infer_table_type(TS_DDL), TIME_SERIES_TABLE);
        assert_eq!(
            infer_table_type("CREATE TABLE t (id INT8 PRIMARY KEY)"),
            BASE_TABLE
        );
    }

    #[test]
    fn test_time_series_indexes() {
        let (indexes, pk) = indexes_from_create_sql(TS_DDL, TIME_SERIES_TABLE, Some("ts"));
        assert_eq!(pk, vec!["site", "device"]);

        let names: Vec<_> = indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["time index", "primary tag", "tag"]);
        assert_eq!(indexes[0].columns, vec!["ts"]);
        // Only the non-primary tag gets its own index
        assert_eq!(indexes[2].columns, vec!["region"]);
    }

    #[test]
    fn test_relational_indexes() {
        let ddl = "CREATE TABLE orders (\n  id INT8 NOT NULL,\n  customer STRING,\n  CONSTRAINT \"primary\" PRIMARY KEY (id ASC),\n  UNIQUE INDEX orders_customer_key (customer ASC),\n  INDEX orders_by_customer (customer)\n)";
        let (indexes, pk) = indexes_from_create_sql(ddl, BASE_TABLE, None);
        assert_eq!(pk, vec!["id"]);
        assert_eq!(indexes.len(), 3);
        assert_eq!(indexes[1].name, "orders_customer_key");
        assert!(indexes[1].unique);
        assert_eq!(indexes[1].columns, vec!["customer"]);
        assert_eq!(indexes[2].name, "orders_by_customer");
        assert!(!indexes[2].unique);
        assert_eq!(indexes[2].columns, vec!["customer"]);
    }

    #[test]
    fn test_partition_info() {
        assert_eq!(extract_partition_info("CREATE TABLE t (a INT)"), None);

        let info =
            extract_partition_info("CREATE TABLE t (a INT) PARTITION BY range (a) INTERVAL '1d'")
                .unwrap();
        assert_eq!(info.partition_type.as_deref(), Some("RANGE"));
        assert_eq!(info.key.as_deref(), Some("a"));
        assert_eq!(info.interval.as_deref(), Some("1d"));
    }

    #[test]
    fn test_catalog_rows_grouped() {
        let mut rows = Vec::new();
        for (index, column, primary) in [
            ("orders_pkey", "id", "t"),
            ("orders_idx", "customer", "f"),
            ("orders_idx", "created", "f"),
        ] {
            let mut r = Record::default();
            r.push("index_name", SqlValue::Text(index.to_string()));
            r.push("column_name", SqlValue::Text(column.to_string()));
            r.push("is_primary", SqlValue::Text(primary.to_string()));
            r.push("is_unique", SqlValue::Bool(primary == "t"));
            r.push("index_type", SqlValue::Text("btree".to_string()));
            rows.push(r);
        }

        let (indexes, pk) = indexes_from_catalog_rows(&rows);
        assert_eq!(pk, vec!["id"]);
        assert_eq!(indexes.len(), 2);
        assert!(indexes[0].unique);
        assert_eq!(indexes[1].columns, vec!["customer", "created"]);
    }

    #[test]
    fn test_read_examples() {
        let columns = [
            col("ts", "TIMESTAMPTZ"),
            col("device", "VARCHAR(20)"),
            col("reading", "INT4"),
        ];
        let examples = generate_read_examples("sensors", &columns);
        assert_eq!(examples[0], "SELECT * FROM sensors LIMIT 10;");
        assert_eq!(examples[1], "SELECT ts, device, reading FROM sensors LIMIT 10;");
        assert_eq!(
            examples[2],
            "SELECT * FROM sensors WHERE ts > NOW() - INTERVAL '1 month' LIMIT 10;"
        );
        assert!(examples
            .contains(&"SELECT device, COUNT(*), AVG(reading) FROM sensors GROUP BY device LIMIT 10;".to_string()));
    }

    #[test]
    fn test_write_examples() {
        let columns = [
            col("id", "INT8"),
            col("name", "STRING"),
            col("label", "VARCHAR(10)"),
            col("active", "BOOL"),
        ];
        let examples = generate_write_examples("devices", &columns);
        assert_eq!(
            examples[0],
            "INSERT INTO devices (id, name, label, active) VALUES (42, NULL, 'example_value', true);"
        );
        assert_eq!(
            examples[1],
            "UPDATE devices SET label = 'new_value' WHERE id = 1;"
        );
        assert_eq!(examples[2], "DELETE FROM devices WHERE id = 1;");
    }

    #[test]
    fn test_write_examples_without_key() {
        let examples = generate_write_examples("notes", &[col("body", "TEXT")]);
        assert_eq!(examples[1], "UPDATE notes SET body = 'new_value' LIMIT 1;");
        assert_eq!(
            examples[2],
            "DELETE FROM notes WHERE false; -- Add your condition here"
        );
    }
}
