//! Saga orchestration over a static workflow.
//!
//! A saga visits every participant of a [`WorkflowDefinition`] in order.
//! The [`SagaCoordinator`] records the saga on the first participant and
//! sends it a `start` command. Each `done` response moves the saga to the
//! next participant, the last one completes it, and any `error` response
//! fails it. Progress lives in a `StateStore`; the coordinator is stateless
//! and safe to share between tasks.

pub mod coordinator;
pub mod error;
pub mod workflow;

pub use coordinator::SagaCoordinator;
pub use error::{Result, SagaError};
pub use workflow::{Next, Participant, ParticipantSpec, SAMPLE_WORKFLOW, WorkflowDefinition, WorkflowError};
