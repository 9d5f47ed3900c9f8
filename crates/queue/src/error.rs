use thiserror::Error;

/// Errors raised by message channels.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The receipt does not identify an in-flight message on this queue.
    #[error("Receipt not found on queue {queue}: {receipt}")]
    ReceiptNotFound { queue: String, receipt: String },

    /// The transport cannot be reached.
    #[error("Queue {queue} unavailable: {reason}")]
    Unavailable { queue: String, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A message could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
