//! Security module for statement classification and identifier handling.

mod identifiers;
mod validation;

pub use identifiers::{
    parse_qualified_name, quote_identifier, quote_literal, safe_identifier, validate_identifier,
};
pub use validation::{
    classify_query, has_multiple_statements, validate_query_input, QueryKind, WriteOperation,
};
