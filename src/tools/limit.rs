//! Automatic row limiting for unbounded SELECT statements.

use once_cell::sync::Lazy;
use regex::Regex;

static LIMIT_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bLIMIT\b")
        .unwrap_or_else(|e| panic!("Internal error: invalid LIMIT pattern: {}", e))
});

/// Whether `sql` is a SELECT that carries no LIMIT clause.
///
/// EXPLAIN and SHOW statements are never limited. The LIMIT check is a word
/// match over the whole statement, so a `LIMIT` inside a subquery also counts.
pub fn is_select_without_limit(sql: &str) -> bool {
    let upper = sql.trim().to_uppercase();

    if upper.starts_with("EXPLAIN") || upper.starts_with("SHOW") {
        return false;
    }

    upper.starts_with("SELECT") && !LIMIT_KEYWORD.is_match(&upper)
}

/// Append `LIMIT n` to `sql`, keeping a trailing semicolon at the end.
pub fn add_limit_to_query(sql: &str, limit: u32) -> String {
    let trimmed = sql.trim();

    match trimmed.strip_suffix(';') {
        Some(body) => format!("{} LIMIT {};", body.trim_end(), limit),
        None => format!("{} LIMIT {}", trimmed, limit),
    }
}

/// Apply the auto-limit policy, returning the statement to run and whether it
/// was rewritten.
pub fn apply_auto_limit(sql: &str, limit: u32) -> (String, bool) {
    if is_select_without_limit(sql) {
        (add_limit_to_query(sql, limit), true)
    } else {
        (sql.to_string(), false)
    }
}
