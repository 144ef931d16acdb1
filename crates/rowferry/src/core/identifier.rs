//! Identifier validation and quoting.
//!
//! Identifiers (table and column names) cannot be bound as statement
//! parameters, so every one that ends up in generated SQL is validated and
//! quoted here first.

use crate::error::{Result, TransferError};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - SQLite: unlimited
/// - SQL Server: 128 characters
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers exceeding [`MAX_IDENTIFIER_LENGTH`].
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TransferError::config("Identifier cannot be empty"));
    }

    if name.contains('\0') {
        return Err(TransferError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(TransferError::Config(format!(
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
/// ```ignore
/// assert_eq!(quote_double("users")?, "\"users\"");
/// assert_eq!(quote_double("odd\"name")?, "\"odd\"\"name\"");
/// ```
pub fn quote_double(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a string literal with single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
