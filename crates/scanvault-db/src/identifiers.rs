//! Identifier validation for dynamically built SQL.
//!
//! Table, column and schema names cannot be bound as parameters, so every
//! identifier that reaches a statement is validated here and then quoted.

use scanvault_core::{Error, Result};

/// PostgreSQL identifier length limit.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Schema names that must never be targeted.
/// Note: "public" is intentionally allowed; it is the default schema.
const RESERVED_SCHEMAS: &[&str] = &[
    "pg_catalog",
    "information_schema",
    "pg_toast",
    "select",
    "insert",
    "update",
    "delete",
    "drop",
    "create",
    "alter",
    "grant",
    "revoke",
    "truncate",
];

/// Validate a table or column name.
///
/// Identifiers must be non-empty, at most 63 characters, start with an ASCII
/// letter or underscore, and contain only ASCII alphanumerics and underscores.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(format!("{} name cannot be empty", kind)));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "{} name exceeds 63 character limit: {} characters",
            kind,
            name.len()
        )));
    }

    if let Some(first) = name.chars().next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::InvalidInput(format!(
                "{} name must start with a letter or underscore, found: '{}'",
                kind, first
            )));
        }
    }

    if let Some(ch) = name
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_')
    {
        return Err(Error::InvalidInput(format!(
            "{} name contains invalid character: '{}'. Only alphanumeric and underscore allowed",
            kind, ch
        )));
    }

    Ok(())
}

/// Validate a schema name: identifier rules plus a reserved-name check.
///
/// ```
/// use scanvault_db::validate_schema_name;
///
/// assert!(validate_schema_name("public").is_ok());
/// assert!(validate_schema_name("tenant_42").is_ok());
/// assert!(validate_schema_name("pg_catalog").is_err());
/// assert!(validate_schema_name("").is_err());
/// ```
pub fn validate_schema_name(name: &str) -> Result<()> {
    validate_identifier("Schema", name)?;

    let lowercase = name.to_lowercase();
    if RESERVED_SCHEMAS.contains(&lowercase.as_str()) {
        return Err(Error::InvalidInput(format!(
            "Schema name '{}' is a reserved SQL keyword",
            name
        )));
    }

    Ok(())
}

/// Validate and double-quote an identifier.
pub fn quote_ident(kind: &str, name: &str) -> Result<String> {
    validate_identifier(kind, name)?;
    Ok(format!("\"{}\"", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        for name in ["projects", "created_at", "_private", "Scan2026", "a"] {
            assert!(validate_identifier("Column", name).is_ok(), "{}", name);
        }
    }

    #[test]
    fn test_empty_identifier() {
        match validate_identifier("Table", "") {
            Err(Error::InvalidInput(msg)) => assert!(msg.contains("empty")),
            other => panic!("Expected InvalidInput error, got {:?}", other),
        }
    }

    #[test]
    fn test_identifier_length_limit() {
        assert!(validate_identifier("Table", &"a".repeat(63)).is_ok());
        match validate_identifier("Table", &"a".repeat(64)) {
            Err(Error::InvalidInput(msg)) => assert!(msg.contains("63 character limit")),
            other => panic!("Expected InvalidInput error, got {:?}", other),
        }
    }

    #[test]
    fn test_identifier_starts_with_digit() {
        match validate_identifier("Column", "1st") {
            Err(Error::InvalidInput(msg)) => assert!(msg.contains("start with a letter")),
            other => panic!("Expected InvalidInput error, got {:?}", other),
        }
    }

    #[test]
    fn test_identifier_injection_attempts() {
        let attempts = [
            "name; DROP TABLE projects; --",
            "name\" OR \"1\"=\"1",
            "projects.id",
            "file-path",
            "naïve",
        ];
        for name in attempts {
            assert!(
                validate_identifier("Column", name).is_err(),
                "Expected error for: {}",
                name
            );
        }
    }

    #[test]
    fn test_schema_reserved_names() {
        for name in ["pg_catalog", "information_schema", "DROP"] {
            match validate_schema_name(name) {
                Err(Error::InvalidInput(msg)) => assert!(msg.contains("reserved"), "{}", msg),
                other => panic!("Expected reserved error for {}, got {:?}", name, other),
            }
        }
        assert!(validate_schema_name("public").is_ok());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("Table", "projects").unwrap(), "\"projects\"");
        assert!(quote_ident("Table", "bad name").is_err());
    }
}
