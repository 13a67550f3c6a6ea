//! KWDB identifier and literal quoting utilities.
//!
//! Catalog lookups interpolate table and database names into `SHOW`
//! statements, which cannot take bind parameters. Names are validated first
//! and then quoted with PostgreSQL double-quote notation when needed.

use crate::error::ServerError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length for identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Identifiers that need no quoting: they survive case folding unchanged.
static PLAIN_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_$]*$")
        .unwrap_or_else(|e| panic!("Internal error: invalid identifier pattern: {}", e))
});

/// Validate that an identifier contains only allowed characters.
///
/// Accepts optionally qualified names such as `db.table`.
pub fn validate_identifier(identifier: &str) -> Result<(), ServerError> {
    if identifier.trim().is_empty() {
        return Err(ServerError::invalid_input("Identifier cannot be empty"));
    }

    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ServerError::invalid_input(format!(
            "Identifier exceeds maximum length of {} characters",
            MAX_IDENTIFIER_LENGTH
        )));
    }

    let dangerous_patterns = [
        "--",   // SQL comment
        "/*",   // Multi-line comment start
        "*/",   // Multi-line comment end
        ";",    // Statement separator
        "'",    // String delimiter
        "\"",   // Quoted identifier delimiter
        "\\",   // Escape character
        "\x00", // Null byte
    ];

    for pattern in &dangerous_patterns {
        if identifier.contains(pattern) {
            return Err(ServerError::invalid_input(format!(
                "Identifier contains forbidden character sequence: {}",
                pattern
            )));
        }
    }

    if identifier.split('.').any(|part| part.trim().is_empty()) {
        return Err(ServerError::invalid_input(format!(
            "Identifier has an empty name part: {}",
            identifier
        )));
    }

    Ok(())
}

/// Quote a single name part, leaving plain lowercase names untouched.
fn quote_part(part: &str) -> String {
    if PLAIN_IDENTIFIER.is_match(part) {
        part.to_string()
    } else {
        format!("\"{}\"", part.replace('"', "\"\""))
    }
}

/// Quote an optionally qualified identifier part by part.
///
/// ```
/// use kwdb_mcp_server::security::quote_identifier;
///
/// assert_eq!(quote_identifier("sensors"), "sensors");
/// assert_eq!(quote_identifier("tsdb.Sensors"), "tsdb.\"Sensors\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    identifier
        .split('.')
        .map(|part| quote_part(part.trim()))
        .collect::<Vec<_>>()
        .join(".")
}

/// Validate and quote an identifier for safe use in SQL.
pub fn safe_identifier(identifier: &str) -> Result<String, ServerError> {
    validate_identifier(identifier)?;
    Ok(quote_identifier(identifier))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Parse a potentially qualified identifier.
///
/// Returns (qualifier, name). Qualifier is None if not specified.
pub fn parse_qualified_name(identifier: &str) -> Result<(Option<String>, String), ServerError> {
    validate_identifier(identifier)?;

    match identifier.rsplit_once('.') {
        Some((qualifier, name)) => Ok((Some(qualifier.to_string()), name.to_string())),
        None => Ok((None, identifier.to_string())),
    }
}
