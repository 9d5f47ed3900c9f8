//! Stand-in participant that answers every command with `done`.

use std::sync::Arc;

use async_trait::async_trait;
use queue::{Command, MessageChannel, MessageChannelExt, Processor, QueueError, Response};

/// Replies `done` on the response channel for each command it receives.
pub struct StubParticipant {
    service: String,
    responses: Arc<dyn MessageChannel>,
}

impl StubParticipant {
    pub fn new(service: impl Into<String>, responses: Arc<dyn MessageChannel>) -> Self {
        Self {
            service: service.into(),
            responses,
        }
    }
}

#[async_trait]
impl Processor<Command> for StubParticipant {
    type Error = QueueError;

    async fn process(&self, command: Command) -> Result<(), QueueError> {
        tracing::info!(
            saga_id = %command.saga_id,
            command = %command.name,
            service = %self.service,
            "processing command"
        );
        self.responses
            .send(&Response::done(command.saga_id, &self.service))
            .await
    }
}
