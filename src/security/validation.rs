//! Statement classification and input validation.
//!
//! Classification is syntactic: the statement is trimmed and lowercased and
//! its leading keyword compared against the write verbs. Nothing past the
//! first keyword is parsed, so a read must also be checked with
//! [`has_multiple_statements`] before it is sent as a simple query.

use crate::error::ServerError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Write operation detected by [`classify_query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteOperation {
    Insert,
    Update,
    Delete,
    Drop,
    Create,
    Alter,
    Truncate,
    Grant,
    Revoke,
}

impl WriteOperation {
    /// Operation name as reported to callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOperation::Insert => "INSERT",
            WriteOperation::Update => "UPDATE",
            WriteOperation::Delete => "DELETE",
            WriteOperation::Drop => "DROP",
            WriteOperation::Create => "CREATE",
            WriteOperation::Alter => "ALTER",
            WriteOperation::Truncate => "TRUNCATE",
            WriteOperation::Grant => "GRANT",
            WriteOperation::Revoke => "REVOKE",
        }
    }
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of statement classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Unclassified statements are treated as reads.
    Read,
    Write(WriteOperation),
}

/// Write verb patterns, checked in order against trimmed, lowercased SQL.
static WRITE_PATTERNS: Lazy<Vec<(Regex, WriteOperation)>> = Lazy::new(|| {
    fn compile(pattern: &str) -> Regex {
        Regex::new(pattern).unwrap_or_else(|e| {
            panic!("Internal error: invalid regex pattern '{}': {}", pattern, e)
        })
    }

    vec![
        // DML
        (compile(r"^insert\s"), WriteOperation::Insert),
        (compile(r"^update\s"), WriteOperation::Update),
        (compile(r"^delete\s"), WriteOperation::Delete),
        // DDL
        (compile(r"^drop\s"), WriteOperation::Drop),
        (compile(r"^create\s"), WriteOperation::Create),
        (compile(r"^alter\s"), WriteOperation::Alter),
        (compile(r"^truncate\s"), WriteOperation::Truncate),
        // DCL
        (compile(r"^grant\s"), WriteOperation::Grant),
        (compile(r"^revoke\s"), WriteOperation::Revoke),
    ]
});

/// Classify a statement as a read or a specific write operation.
pub fn classify_query(sql: &str) -> QueryKind {
    let normalized = sql.trim().to_lowercase();

    WRITE_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&normalized))
        .map(|(_, op)| QueryKind::Write(*op))
        .unwrap_or(QueryKind::Read)
}

/// Reject empty statements and statements over `max_length` bytes.
pub fn validate_query_input(sql: &str, max_length: usize) -> Result<(), ServerError> {
    if sql.trim().is_empty() {
        return Err(ServerError::invalid_input("SQL statement cannot be empty"));
    }
    if sql.len() > max_length {
        return Err(ServerError::invalid_input(format!(
            "SQL statement is {} bytes, exceeding the maximum of {} bytes",
            sql.len(),
            max_length
        )));
    }
    Ok(())
}

/// Whether `sql` holds more than one statement.
///
/// A `;` only separates statements outside string literals, quoted
/// identifiers, dollar-quoted bodies and comments. Trailing semicolons and
/// comments after the last statement do not count.
pub fn has_multiple_statements(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut terminated = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();

        if b == b'-' && next == Some(b'-') {
            i = skip_line_comment(bytes, i);
            continue;
        }
        if b == b'/' && next == Some(b'*') {
            i = skip_block_comment(bytes, i);
            continue;
        }
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if b == b';' {
            terminated = true;
            i += 1;
            continue;
        }
        if terminated {
            return true;
        }

        i = match b {
            b'\'' => skip_quoted(bytes, i, b'\'', is_escape_string(bytes, i)),
            b'"' => skip_quoted(bytes, i, b'"', false),
            b'$' => skip_dollar_quoted(bytes, i),
            _ => i + 1,
        };
    }

    false
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// `E'...'` strings treat backslash as an escape.
fn is_escape_string(bytes: &[u8], quote: usize) -> bool {
    quote > 0
        && matches!(bytes[quote - 1], b'e' | b'E')
        && (quote < 2 || !is_ident_byte(bytes[quote - 2]))
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |pos| start + pos + 1)
}

/// Block comments nest in PostgreSQL dialects.
fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Skip a quoted run starting at `start`. A doubled quote stays inside.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash_escapes && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Skip `$tag$ ... $tag$`. A `$` that does not open a tag (e.g. `$1`) is
/// skipped on its own.
fn skip_dollar_quoted(bytes: &[u8], start: usize) -> usize {
    if start > 0 && is_ident_byte(bytes[start - 1]) {
        return start + 1;
    }
    let mut end = start + 1;
    while end < bytes.len() && is_ident_byte(bytes[end]) {
        end += 1;
    }
    let opens_tag = end < bytes.len()
        && bytes[end] == b'$'
        && !bytes.get(start + 1).is_some_and(u8::is_ascii_digit);
    if !opens_tag {
        return start + 1;
    }

    let tag = &bytes[start..=end];
    let body = end + 1;
    bytes[body..]
        .windows(tag.len())
        .position(|w| w == tag)
        .map_or(bytes.len(), |pos| body + pos + tag.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_statements_classified() {
        let cases = [
            ("INSERT INTO t VALUES (1)", WriteOperation::Insert),
            ("  update t SET a = 1", WriteOperation::Update),
            ("Delete FROM t", WriteOperation::Delete),
            ("DROP TABLE t", WriteOperation::Drop),
            ("CREATE TABLE t (a INT)", WriteOperation::Create),
            ("ALTER TABLE t ADD COLUMN b INT", WriteOperation::Alter),
            ("TRUNCATE t", WriteOperation::Truncate),
            ("GRANT SELECT ON t TO u", WriteOperation::Grant),
            ("REVOKE SELECT ON t FROM u", WriteOperation::Revoke),
            ("\n\tinsert\ninto t values (1)", WriteOperation::Insert),
        ];

        for (sql, expected) in cases {
            assert_eq!(classify_query(sql), QueryKind::Write(expected), "for: {}", sql);
        }
    }

    #[test]
    fn test_read_statements_classified() {
        for sql in [
            "SELECT * FROM t",
            "SHOW TABLES",
            "EXPLAIN SELECT 1",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "",
        ] {
            assert_eq!(classify_query(sql), QueryKind::Read, "for: {}", sql);
        }
    }

    #[test]
    fn test_keyword_must_be_followed_by_whitespace() {
        // Identifiers that merely start with a verb are not writes
        assert_eq!(classify_query("inserted_rows"), QueryKind::Read);
        assert_eq!(classify_query("DROP"), QueryKind::Read);
        assert_eq!(classify_query("update;"), QueryKind::Read);
    }

    #[test]
    fn test_keyword_must_lead() {
        assert_eq!(
            classify_query("SELECT 'INSERT INTO t' AS text"),
            QueryKind::Read
        );
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(WriteOperation::Truncate.to_string(), "TRUNCATE");
        assert_eq!(WriteOperation::Revoke.as_str(), "REVOKE");
    }

    #[test]
    fn test_validate_query_input() {
        assert!(validate_query_input("SELECT 1", 100).is_ok());
        assert!(validate_query_input("   ", 100).is_err());
        assert!(validate_query_input("SELECT 1", 4).is_err());
    }

    #[test]
    fn test_single_statements() {
        for sql in [
            "SELECT 1",
            "SELECT 1;",
            "SELECT 1 ;;  \n",
            "SELECT 1; -- trailing note",
            "SELECT 1; /* done */",
            "SELECT * FROM t WHERE note = 'a; DROP TABLE t'",
            "SELECT * FROM t WHERE note = 'it''s; fine'",
            "SELECT E'escaped \\'; still inside' AS s",
            r#"SELECT "odd;name" FROM t"#,
            "SELECT $$; DROP TABLE t$$",
            "SELECT $body$ ; DELETE FROM t $body$ AS s",
            "SELECT 1 -- ; DROP TABLE t",
            "SELECT /* ; /* nested ; */ still comment ; */ 1",
        ] {
            assert!(!has_multiple_statements(sql), "single statement: {}", sql);
        }
    }

    #[test]
    fn test_stacked_statements() {
        for sql in [
            "SELECT 1; DROP TABLE t",
            "SELECT 1 AS one LIMIT 1; DROP TABLE victim",
            "SHOW TABLES;DELETE FROM t",
            "SELECT 'a'; SELECT 'b'",
            "SELECT $$x$$; UPDATE t SET a = 1",
            "SELECT 1; /* hidden */ INSERT INTO t VALUES (1)",
            "SELECT 1;\n-- note\nTRUNCATE t",
        ] {
            assert!(has_multiple_statements(sql), "stacked: {}", sql);
        }
    }

    #[test]
    fn test_positional_dollar_is_not_a_tag() {
        assert!(!has_multiple_statements("SELECT $1, $2"));
        assert!(has_multiple_statements("SELECT $1; DROP TABLE t"));
    }

    #[test]
    fn test_unterminated_quote_swallows_rest() {
        assert!(!has_multiple_statements("SELECT 'open; DROP TABLE t"));
    }
}
