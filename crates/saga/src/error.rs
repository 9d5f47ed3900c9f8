//! Saga error types.

use common::SagaId;
use queue::QueueError;
use state_store::StoreError;
use thiserror::Error;

use crate::workflow::WorkflowError;

/// Errors that can occur while starting or advancing a saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The workflow has no participants to start with.
    #[error("workflow has no participants")]
    EmptyWorkflow,

    /// The state store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Sending a command failed.
    #[error("transport error: {0}")]
    Transport(#[from] QueueError),

    /// The responding service is not part of the workflow.
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// A participant reported `error`; the saga is now failed.
    #[error("saga {saga_id} failed in a participant")]
    ParticipantFailed { saga_id: SagaId },

    /// A response carried a status other than `done` or `error`.
    #[error("unknown status '{status}' for saga {saga_id}")]
    UnknownStatus { status: String, saga_id: SagaId },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
