//! Supervisor error types.

use thiserror::Error;

/// Why a supervised task ended abnormally.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task returned an error.
    #[error("task '{task}' failed: {source}")]
    Failed {
        task: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The task panicked.
    #[error("task '{task}' panicked: {message}")]
    Panicked { task: String, message: String },

    /// The task was cancelled by the runtime before it finished.
    #[error("task '{task}' was aborted")]
    Aborted { task: String },
}

impl TaskError {
    /// Name of the task this error belongs to.
    pub fn task(&self) -> &str {
        match self {
            TaskError::Failed { task, .. }
            | TaskError::Panicked { task, .. }
            | TaskError::Aborted { task } => task,
        }
    }
}
