//! Error types for corral

use thiserror::Error;

/// Result type alias for corral operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for store, entity, and query operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Missing or duplicate registration of a connection, entity type, or
    /// foreign key. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid selector shape, composite-key misuse, identifier or codec
    /// conversion failure.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Ambiguous get, concurrent-modification row-count mismatch, or a
    /// missing-identity delete/refresh.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Wrapped driver failure. Always carries the failing SQL text.
    #[error("Backend error: {message} (sql: {sql})")]
    Backend { sql: String, message: String },
}

impl OrmError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency(message.into())
    }

    /// Create a backend error carrying the SQL that failed
    pub fn backend(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            sql: sql.into(),
            message: message.into(),
        }
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a consistency error
    pub fn is_consistency(&self) -> bool {
        matches!(self, Self::Consistency(_))
    }

    /// Check if this is a backend error
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}
