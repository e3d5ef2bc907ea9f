//! Custom error types for the common library
//!
//! This module defines infrastructure error types shared by the services.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Whether a query failed because a unique constraint rejected the row
///
/// Repositories use this to turn duplicate usernames or emails into a
/// domain-level conflict instead of an opaque database failure.
pub fn is_unique_violation(err: &SqlxError) -> bool {
    match err {
        SqlxError::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Same check as [`is_unique_violation`] for errors already wrapped in `anyhow`
pub fn is_unique_violation_any(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SqlxError>()
        .is_some_and(is_unique_violation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&SqlxError::RowNotFound));
        assert!(!is_unique_violation_any(&anyhow::anyhow!("boom")));
    }

    #[test]
    fn migration_error_message_names_the_cause() {
        let err = DatabaseError::Migration("checksum mismatch".to_string());
        assert_eq!(err.to_string(), "Database migration error: checksum mismatch");
    }
}
