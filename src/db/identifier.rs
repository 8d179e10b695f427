//! Identifier validation and quoting.
//!
//! Table, schema and column names supplied by callers are checked against
//! `[A-Za-z_][A-Za-z0-9_]*` (at most 63 bytes, PostgreSQL's NAMEDATALEN - 1)
//! and always emitted double-quoted.

use crate::error::{DbError, DbResult};

pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Check that `name` is a plain identifier. `what` names the role in error messages.
pub fn validate_identifier(what: &str, name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::validation(format!("{what} name must not be empty")));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(DbError::validation(format!(
            "{what} name '{name}' exceeds {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    let mut bytes = name.bytes();
    let first_ok = bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_');
    if !first_ok || !bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(DbError::validation(format!(
            "Invalid {what} name '{name}': only letters, digits and underscores are allowed, and it must not start with a digit"
        )));
    }
    Ok(())
}

/// Validate and double-quote an identifier.
pub fn quote_identifier(what: &str, name: &str) -> DbResult<String> {
    validate_identifier(what, name)?;
    Ok(format!("\"{name}\""))
}

/// `"schema"."table"`, both parts validated.
pub fn qualified_table(schema: &str, table: &str) -> DbResult<String> {
    Ok(format!(
        "{}.{}",
        quote_identifier("schema", schema)?,
        quote_identifier("table", table)?
    ))
}
