//! Identifier handling: SQL identifier validation and quoting, plus the
//! row-identifier format checks used when rewriting keys.
//!
//! SQL identifiers (table names, column names, schema names) cannot be passed
//! as parameters in prepared statements. Table and column names here come
//! from configuration and introspection, so every name is validated and
//! quoted before it is spliced into SQL:
//! 1. Reject suspicious patterns (null bytes, excessive length)
//! 2. Wrap in double quotes (both SQLite and PostgreSQL accept them)
//! 3. Escape embedded double quotes by doubling them

use uuid::Uuid;

use crate::core::schema::TypeCategory;
use crate::error::{MigrateError, Result};

/// Maximum identifier length.
/// - PostgreSQL: 63 bytes (longer names are truncated server-side)
/// - SQLite: no practical limit
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
///
/// # Errors
///
/// Returns `MigrateError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote an identifier with ANSI double quotes.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(quote_ident("users")?, "\"users\"");
/// assert_eq!(quote_ident("table\"name")?, "\"table\"\"name\"");
/// ```
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with schema.
///
/// Returns `schema.table` with proper quoting.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

/// Whether `value` is a well-formed UUID.
pub fn is_uuid(value: &str) -> bool {
    Uuid::parse_str(value.trim()).is_ok()
}

/// Whether `value` is a legal identifier for a column of `category`.
///
/// UUID columns need a well-formed UUID and integer columns a base-10
/// integer. Every other category accepts any string.
pub fn matches_id_format(value: &str, category: TypeCategory) -> bool {
    match category {
        TypeCategory::Uuid => is_uuid(value),
        TypeCategory::Integer => value.trim().parse::<i64>().is_ok(),
        _ => true,
    }
}
