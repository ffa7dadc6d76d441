//! Identifier validation, bracket quoting, and qualified-name handling.
//!
//! Every object is identified across catalogs by its qualified name, rendered
//! as `[schema].[name]`. Names read from the system catalog are trusted and
//! go through [`bracket`]; names supplied by configuration are validated
//! first.

use crate::error::{MirrorError, Result};

/// SQL Server's identifier limit in characters.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers longer than SQL Server allows.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MirrorError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MirrorError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(MirrorError::Config(format!(
            "Identifier exceeds maximum length of {} characters: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }

    Ok(())
}

/// Bracket-quote a name already known to be a valid catalog identifier.
pub fn bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// The cross-catalog identity key for an object: `[schema].[name]`.
pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", bracket(schema), bracket(name))
}

/// Quote a value as a T-SQL string literal, doubling embedded quotes.
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Parse `schema.table` or `[schema].[table]` into its two parts.
pub fn parse_qualified(input: &str) -> Result<(String, String)> {
    let parts = split_parts(input.trim())?;
    match parts.as_slice() {
        [schema, name] => {
            validate_identifier(schema)?;
            validate_identifier(name)?;
            Ok((schema.clone(), name.clone()))
        }
        _ => Err(MirrorError::Config(format!(
            "expected a schema-qualified name, got {:?}",
            input
        ))),
    }
}

/// Normalise a configured table name to its qualified form.
pub fn normalize_qualified(input: &str) -> Result<String> {
    let (schema, name) = parse_qualified(input)?;
    Ok(qualified(&schema, &name))
}

fn split_parts(input: &str) -> Result<Vec<String>> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_bracket = false;

    while let Some(c) = chars.next() {
        match c {
            '[' if !in_bracket && current.is_empty() => in_bracket = true,
            ']' if in_bracket => {
                if chars.peek() == Some(&']') {
                    chars.next();
                    current.push(']');
                } else {
                    in_bracket = false;
                }
            }
            '.' if !in_bracket => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    if in_bracket {
        return Err(MirrorError::Config(format!(
            "unterminated bracket in {:?}",
            input
        )));
    }
    parts.push(current);
    Ok(parts)
}
