//! Error types for the data-access toolkit.
//!
//! This module defines all error types used throughout the toolkit, following
//! a hierarchy that separates validation errors, configuration errors,
//! transient (retryable) failures, and backend errors.

#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all repository operations.
///
/// Variants are organized by category. Only [`RepoError::Transient`] failures
/// are eligible for retry; every other variant propagates to the caller on
/// the first attempt.
#[derive(Error, Debug)]
pub enum RepoError {
    /// Input validation errors (unknown fields, operator misuse, immutable
    /// field writes, malformed cursors).
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The requested entity was not found (after tenant filtering).
    #[error("entity not found: {entity}/{id}")]
    NotFound { entity: String, id: String },

    /// A unique constraint was violated.
    #[error("duplicate entity: {entity} ({constraint})")]
    Duplicate { entity: String, constraint: String },

    /// Construction-time configuration errors.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Transient failures expected to succeed on retry.
    #[error(transparent)]
    Transient(#[from] TransientError),

    /// The circuit breaker is open; the wrapped operation was not invoked.
    #[error("circuit open: retry after {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 },

    /// A retried operation exhausted its attempt budget.
    #[error("operation failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<RepoError>,
    },

    /// Errors originating from the database driver.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors raised while validating caller input, before any query executes.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The filter or sort references a field outside the schema whitelist.
    #[error("unknown field '{field}' for entity '{entity}'")]
    UnknownField { field: String, entity: String },

    /// A value's type does not match what the operator expects.
    #[error("operator {operator} on field '{field}' expects {expected}")]
    OperatorMismatch {
        field: String,
        operator: String,
        expected: String,
    },

    /// The payload writes a field the repository owns.
    #[error("field '{field}' is immutable")]
    ImmutableField { field: String },

    /// The payload carries a tenant id that conflicts with the repository's.
    #[error("tenant mismatch: payload carries '{provided}', repository is scoped to '{scoped}'")]
    TenantMismatch { provided: String, scoped: String },

    /// A field value cannot be coerced to its declared type.
    #[error("invalid value for field '{field}': expected {expected}")]
    InvalidFieldValue { field: String, expected: String },

    /// A pagination cursor could not be decoded.
    #[error("invalid pagination cursor: {cursor}")]
    InvalidCursor { cursor: String },

    /// Pagination parameters are out of range.
    #[error("invalid pagination parameters: {message}")]
    InvalidPagination { message: String },
}

/// Errors raised when constructing a repository or manager.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// A tenant-scoped schema was used without a tenant id.
    #[error("entity '{entity}' is tenant-scoped but no tenant id was supplied")]
    MissingTenant { entity: String },

    /// A schema field redeclares a reserved metadata column.
    #[error("field '{field}' collides with a reserved column")]
    ReservedField { field: String },

    /// A policy or threshold is out of range.
    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Failures expected to succeed on retry.
///
/// These are the only errors `execute_with_retry` will re-attempt; everything
/// else is treated as terminal on the first occurrence.
#[derive(Error, Debug)]
pub enum TransientError {
    /// The store detected a deadlock and chose this operation as the victim.
    #[error("deadlock detected: {message}")]
    Deadlock { message: String },

    /// A lock wait exceeded the store's timeout.
    #[error("lock wait timed out: {message}")]
    LockTimeout { message: String },

    /// The connection was dropped mid-operation.
    #[error("connection lost: {message}")]
    ConnectionLost { message: String },

    /// A serializable transaction could not be serialized.
    #[error("serialization conflict: {message}")]
    SerializationConflict { message: String },
}

/// Errors originating from the database driver.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Query execution failed for a non-transient reason.
    #[error("query execution failed on {backend_name}: {message}")]
    Query {
        backend_name: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A value could not be converted between driver and toolkit types.
    #[error("value conversion failed: {message}")]
    Conversion { message: String },

    /// A transaction control statement (BEGIN/COMMIT/ROLLBACK) failed.
    #[error("transaction control failed on {backend_name}: {message}")]
    TransactionControl {
        backend_name: &'static str,
        message: String,
    },
}

impl RepoError {
    /// Returns `true` if this failure is expected to succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepoError::Transient(_))
    }

    /// Convenience constructor for not-found errors.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        RepoError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Convenience constructor for value-conversion failures.
    pub fn conversion(message: impl Into<String>) -> Self {
        RepoError::Backend(BackendError::Conversion {
            message: message.into(),
        })
    }
}

/// Result type alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

impl From<serde_json::Error> for RepoError {
    fn from(err: serde_json::Error) -> Self {
        RepoError::Backend(BackendError::Conversion {
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = RepoError::not_found("users", "abc-123");
        assert_eq!(err.to_string(), "entity not found: users/abc-123");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::UnknownField {
            field: "nme".to_string(),
            entity: "users".to_string(),
        };
        assert_eq!(err.to_string(), "unknown field 'nme' for entity 'users'");
    }

    #[test]
    fn test_transient_classification() {
        let transient: RepoError = TransientError::Deadlock {
            message: "victim".to_string(),
        }
        .into();
        assert!(transient.is_transient());

        let terminal: RepoError = ValidationError::ImmutableField {
            field: "id".to_string(),
        }
        .into();
        assert!(!terminal.is_transient());

        let not_found = RepoError::not_found("users", "1");
        assert!(!not_found.is_transient());
    }

    #[test]
    fn test_retries_exhausted_carries_source() {
        let err = RepoError::RetriesExhausted {
            attempts: 3,
            source: Box::new(
                TransientError::LockTimeout {
                    message: "busy".to_string(),
                }
                .into(),
            ),
        };
        assert!(err.to_string().contains("3 attempts"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_circuit_open_display() {
        let err = RepoError::CircuitOpen { retry_after_ms: 250 };
        assert!(err.to_string().contains("250ms"));
    }
}
