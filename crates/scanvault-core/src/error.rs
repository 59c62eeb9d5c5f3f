//! Error types for scanvault.

use thiserror::Error;

/// Result type alias using scanvault's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for scanvault operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Backing store unreachable at startup. Recovered by switching to emulated mode.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed statement or constraint violation detected outside the driver
    #[error("Query error: {0}")]
    Query(String),

    /// Transaction could not be committed
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// A schema migration failed; the schema is only partially migrated.
    #[error("Migration {id} failed: {reason}")]
    MigrationFailed { id: String, reason: String },

    /// A single entity's search failed
    #[error("Search unavailable for {entity}: {reason}")]
    SearchUnavailable { entity: String, reason: String },

    /// Operation requires the live backend but the store is emulated
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Whether the caller supplied something invalid (as opposed to a server-side failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::NotFound(_) | Error::Serialization(_)
        )
    }

    /// HTTP-style status code for upstream API layers.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) | Error::Serialization(_) => 400,
            Error::NotFound(_) => 404,
            Error::StoreUnavailable(_) | Error::Connectivity(_) => 503,
            _ => 500,
        }
    }

    /// Message safe to show to end users.
    ///
    /// Driver and internal errors are reduced to a generic message so that
    /// statement text and constraint names never leak.
    pub fn public_message(&self) -> String {
        match self {
            Error::Database(_) | Error::Query(_) | Error::Internal(_) => {
                "internal storage error".to_string()
            }
            Error::TransactionAborted(_) | Error::MigrationFailed { .. } => {
                "storage operation aborted".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_migration_failed() {
        let err = Error::MigrationFailed {
            id: "003_search_vectors".to_string(),
            reason: "relation does not exist".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Migration 003_search_vectors failed: relation does not exist"
        );
    }

    #[test]
    fn test_error_display_search_unavailable() {
        let err = Error::SearchUnavailable {
            entity: "files".to_string(),
            reason: "function search_files does not exist".to_string(),
        };
        assert!(err.to_string().starts_with("Search unavailable for files"));
    }

    #[test]
    fn test_error_display_store_unavailable() {
        let err = Error::StoreUnavailable("transactions require a live backend".to_string());
        assert_eq!(
            err.to_string(),
            "Store unavailable: transactions require a live backend"
        );
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("negative limit".to_string());
        assert_eq!(err.to_string(), "Invalid input: negative limit");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::StoreUnavailable("x".into()).status_code(), 503);
        assert_eq!(Error::Query("x".into()).status_code(), 500);
    }

    #[test]
    fn test_public_message_hides_query_details() {
        let err = Error::Query("duplicate key value violates \"projects_pkey\"".to_string());
        assert_eq!(err.public_message(), "internal storage error");
        assert!(!err.is_client_error());

        let err = Error::InvalidInput("limit must be positive".to_string());
        assert_eq!(err.public_message(), "Invalid input: limit must be positive");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
