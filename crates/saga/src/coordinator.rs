//! Saga coordinator: the state machine driving sagas through the workflow.

use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use queue::{Command, MessageChannelExt, Processor, Response, ResponseStatus};
use state_store::{SagaStatus, ServiceUpdate, StateStore};

use crate::error::{Result, SagaError};
use crate::workflow::{Next, WorkflowDefinition};

/// Starts sagas and advances them on participant responses.
///
/// The coordinator keeps no saga state of its own: every decision reads from
/// and writes to the [`StateStore`]. Duplicate `done` responses are absorbed
/// by the store's conditional update, so only one delivery ever moves a saga
/// past a given service.
pub struct SagaCoordinator<S>
where
    S: StateStore,
{
    store: S,
    workflow: Arc<WorkflowDefinition>,
}

impl<S> SagaCoordinator<S>
where
    S: StateStore,
{
    /// Creates a new saga coordinator.
    pub fn new(store: S, workflow: Arc<WorkflowDefinition>) -> Self {
        Self { store, workflow }
    }

    pub fn workflow(&self) -> &WorkflowDefinition {
        &self.workflow
    }

    /// Starts a saga: records it on the first participant and sends that
    /// participant a `start` command.
    ///
    /// Starting an existing saga leaves its record alone but sends the first
    /// command again. If the send fails the record stays written.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, saga_id: SagaId) -> Result<()> {
        let first = self.workflow.first().ok_or(SagaError::EmptyWorkflow)?;

        self.store
            .insert_saga(saga_id, first.name(), SagaStatus::Started)
            .await?;
        first.channel().send(&Command::start(saga_id)).await?;

        metrics::counter!("saga_started_total").increment(1);
        tracing::info!(service = first.name(), "saga started");
        Ok(())
    }

    /// Applies one participant response to its saga.
    #[tracing::instrument(
        skip(self, response),
        fields(saga_id = %response.saga_id, service = %response.service, status = %response.status)
    )]
    pub async fn process_message(&self, response: Response) -> Result<()> {
        match response.status {
            ResponseStatus::Done => self.advance(response.saga_id, &response.service).await,
            ResponseStatus::Error => {
                self.store
                    .update_status(response.saga_id, SagaStatus::Error)
                    .await?;
                metrics::counter!("saga_failed_total").increment(1);
                tracing::warn!("participant reported an error, saga failed");
                Err(SagaError::ParticipantFailed {
                    saga_id: response.saga_id,
                })
            }
            ResponseStatus::Unknown(status) => Err(SagaError::UnknownStatus {
                status,
                saga_id: response.saga_id,
            }),
        }
    }

    async fn advance(&self, saga_id: SagaId, service: &str) -> Result<()> {
        let next = match self.workflow.next(service) {
            Ok(Next::Participant(next)) => next,
            Ok(Next::EndOfWorkflow) => {
                self.store
                    .update_status(saga_id, SagaStatus::Completed)
                    .await?;
                metrics::counter!("saga_completed_total").increment(1);
                tracing::info!("saga completed");
                return Ok(());
            }
            Err(e) => {
                self.store.update_status(saga_id, SagaStatus::Error).await?;
                metrics::counter!("saga_failed_total").increment(1);
                tracing::warn!(error = %e, "response from a service outside the workflow");
                return Err(e.into());
            }
        };

        match self.store.update_service(saga_id, service, next.name()).await? {
            ServiceUpdate::Unchanged => {
                metrics::counter!("saga_duplicate_responses_total").increment(1);
                tracing::info!("saga already moved past this service, ignoring response");
                Ok(())
            }
            ServiceUpdate::Advanced => {
                // The store has moved on even if this send fails
                next.channel().send(&Command::start(saga_id)).await?;
                metrics::counter!("saga_advanced_total").increment(1);
                tracing::info!(next = next.name(), "saga advanced");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<S> Processor<Response> for SagaCoordinator<S>
where
    S: StateStore,
{
    type Error = SagaError;

    async fn process(&self, message: Response) -> Result<()> {
        self.process_message(message).await
    }
}
