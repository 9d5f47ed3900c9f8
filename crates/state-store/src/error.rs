use thiserror::Error;

use crate::SagaId;

/// Errors that can occur when interacting with the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No saga row matched the given id.
    #[error("Saga not found: {0}")]
    SagaNotFound(SagaId),

    /// A stored status column held a value outside the known set.
    #[error("Invalid saga status: {0}")]
    InvalidStatus(String),

    /// The store cannot be reached.
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for state store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
