//! KWDB column type mapping to Rust values.
//!
//! Rows arrive over the PostgreSQL wire protocol. Each column is decoded by
//! its reported type name; anything the mapper does not recognise, and any
//! binary payload, is normalised to text. Bytes that are not valid UTF-8 are
//! rendered in PostgreSQL's `\x` hex form.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use sqlx::postgres::{PgRow, PgValueRef};
use sqlx::{Column, Decode, Postgres, Row, TypeInfo, ValueRef};
use uuid::Uuid;

/// A SQL value that can be serialized to JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Normalise a raw byte payload to text.
    ///
    /// Valid UTF-8 is kept as is; anything else becomes `\x` followed by
    /// lowercase hex so no byte is lost.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text.to_string()),
            Err(_) => SqlValue::Text(format!("\\x{}", bytes_to_hex(bytes))),
        }
    }

    /// Borrow the value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a display string.
    pub fn to_display_string(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::Int(v) => v.to_string(),
            SqlValue::Float(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Date(v) => v.to_string(),
            SqlValue::Time(v) => v.to_string(),
            SqlValue::Timestamp(v) => v.to_string(),
            SqlValue::TimestampTz(v) => v.to_rfc3339(),
            SqlValue::Json(v) => v.to_string(),
        }
    }
}

/// One result row: ordered column-name/value pairs.
///
/// Serializes as a JSON object whose keys keep the column order of the
/// result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, SqlValue)>,
}

impl Record {
    /// Create an empty record with room for `capacity` columns.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Append a column value.
    pub fn push(&mut self, column: impl Into<String>, value: SqlValue) {
        self.fields.push((column.into(), value));
    }

    /// Look up a value by column name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Look up a column and render it as a string; NULL and missing become `None`.
    pub fn get_string(&self, column: &str) -> Option<String> {
        match self.get(column) {
            None | Some(SqlValue::Null) => None,
            Some(value) => Some(value.to_display_string()),
        }
    }

    /// Column names in result-set order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Type mapper for converting KWDB column values to [`SqlValue`].
pub struct TypeMapper;

impl TypeMapper {
    /// Convert a whole row into a [`Record`].
    pub fn row_to_record(row: &PgRow) -> Record {
        let mut record = Record::with_capacity(row.columns().len());
        for column in row.columns() {
            let value = Self::extract_column(row, column.ordinal());
            record.push(column.name(), value);
        }
        record
    }

    /// Extract a single column value.
    ///
    /// Decoding is driven by the column's type name. A value that fails to
    /// decode as its declared type is returned as its raw text.
    pub fn extract_column(row: &PgRow, idx: usize) -> SqlValue {
        let Ok(raw) = row.try_get_raw(idx) else {
            return SqlValue::Null;
        };
        if raw.is_null() {
            return SqlValue::Null;
        }

        let type_name = raw.type_info().name().to_ascii_uppercase();
        let decoded = match type_name.as_str() {
            "BOOL" => decode::<bool>(&raw).map(SqlValue::Bool),
            "INT2" => decode::<i16>(&raw).map(|v| SqlValue::Int(v.into())),
            "INT4" => decode::<i32>(&raw).map(|v| SqlValue::Int(v.into())),
            "INT8" => decode::<i64>(&raw).map(SqlValue::Int),
            "FLOAT4" => decode::<f32>(&raw).map(|v| SqlValue::Float(v.into())),
            "FLOAT8" => decode::<f64>(&raw).map(SqlValue::Float),
            "NUMERIC" => decode::<Decimal>(&raw).map(SqlValue::Decimal),
            "UUID" => decode::<Uuid>(&raw).map(SqlValue::Uuid),
            "DATE" => decode::<NaiveDate>(&raw).map(SqlValue::Date),
            "TIME" => decode::<NaiveTime>(&raw).map(SqlValue::Time),
            "TIMESTAMP" => decode::<NaiveDateTime>(&raw).map(SqlValue::Timestamp),
            "TIMESTAMPTZ" => decode::<DateTime<Utc>>(&raw).map(SqlValue::TimestampTz),
            "JSON" | "JSONB" => decode::<serde_json::Value>(&raw).map(SqlValue::Json),
            "BYTEA" => decode::<Vec<u8>>(&raw).map(|v| SqlValue::from_bytes(&v)),
            _ => None,
        };

        decoded.unwrap_or_else(|| Self::raw_text(&raw))
    }

    fn raw_text(raw: &PgValueRef<'_>) -> SqlValue {
        match raw.as_bytes() {
            Ok(bytes) => SqlValue::from_bytes(bytes),
            Err(_) => SqlValue::Null,
        }
    }
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn decode<'r, T: Decode<'r, Postgres>>(raw: &PgValueRef<'r>) -> Option<T> {
    T::decode(raw.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_display() {
        assert_eq!(SqlValue::Null.to_display_string(), "NULL");
        assert_eq!(SqlValue::Int(42).to_display_string(), "42");
        assert_eq!(
            SqlValue::Text("hello".to_string()).to_display_string(),
            "hello"
        );
        assert_eq!(SqlValue::Bool(true).to_display_string(), "true");
    }

    #[test]
    fn test_binary_normalised_to_text() {
        assert_eq!(
            SqlValue::from_bytes(b"sensor-01"),
            SqlValue::Text("sensor-01".to_string())
        );
        // Invalid UTF-8 keeps every byte as hex
        let value = SqlValue::from_bytes(&[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(value.as_str(), Some("\\xdeadbeef"));
        let value = SqlValue::from_bytes(&[0x61, 0xFF, 0x62]);
        assert_eq!(value.as_str(), Some("\\x61ff62"));
    }

    #[test]
    fn test_record_preserves_column_order() {
        let mut record = Record::with_capacity(3);
        record.push("ts", SqlValue::Text("2024-01-01".to_string()));
        record.push("value", SqlValue::Float(1.5));
        record.push("active", SqlValue::Null);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"ts":"2024-01-01","value":1.5,"active":null}"#);
        assert_eq!(record.columns().collect::<Vec<_>>(), ["ts", "value", "active"]);
    }

    #[test]
    fn test_record_lookup() {
        let mut record = Record::default();
        record.push("column_name", SqlValue::Text("id".to_string()));
        record.push("comment", SqlValue::Null);

        assert_eq!(record.get_string("column_name").as_deref(), Some("id"));
        assert_eq!(record.get_string("comment"), None);
        assert_eq!(record.get_string("missing"), None);
        assert_eq!(record.len(), 2);
    }
}
