//! Table name validation for SQL templates.
//!
//! Table names are substituted into SQL text, so they cannot be passed as
//! statement parameters. They come from the configuration file, which is
//! trusted, but are still restricted to plain (optionally schema-qualified)
//! identifiers so a config from another source cannot smuggle SQL through a
//! table key.

use crate::error::{CheckError, Result};

/// Maximum identifier length in PostgreSQL (NAMEDATALEN - 1).
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate a single unquoted identifier part.
///
/// Accepts `[A-Za-z_][A-Za-z0-9_$]*` up to 63 bytes.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CheckError::Config("Identifier cannot be empty".to_string()));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CheckError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if !first_ok || !rest_ok {
        return Err(CheckError::Config(format!(
            "SECURITY: Identifier contains characters outside [A-Za-z0-9_$]: {:?}",
            name
        )));
    }

    Ok(())
}

/// Validate a table name as used for config keys and template substitution.
///
/// Either `table` or `schema.table`.
pub fn validate_table_name(name: &str) -> Result<()> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(CheckError::Config(format!(
            "Table name may have at most one schema qualifier: {:?}",
            name
        )));
    }

    for part in parts {
        validate_identifier(part).map_err(|e| match e {
            CheckError::Config(msg) => {
                CheckError::Config(format!("Invalid table name {:?}: {}", name, msg))
            }
            other => other,
        })?;
    }

    Ok(())
}
