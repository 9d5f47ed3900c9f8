//! Static, ordered workflow of saga participants.

use std::fmt;
use std::sync::Arc;

use queue::MessageChannel;
use thiserror::Error;

/// Participant/queue pairs of the three-service sample workflow.
pub const SAMPLE_WORKFLOW: &str = "service1=commands1,service2=commands2,service3=commands3";

/// Errors raised while building or walking a workflow.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    /// The named service is not part of the workflow.
    #[error("service not found in workflow: {0}")]
    ServiceNotFound(String),

    /// A textual workflow description could not be parsed.
    #[error("invalid workflow definition: {0}")]
    InvalidSpec(String),
}

/// One step of the workflow: a named service and the queue it takes commands on.
#[derive(Clone)]
pub struct Participant {
    name: String,
    queue: String,
    channel: Arc<dyn MessageChannel>,
}

impl Participant {
    /// Creates a participant whose commands go to `channel`.
    pub fn new(name: impl Into<String>, channel: Arc<dyn MessageChannel>) -> Self {
        let queue = channel.name().to_string();
        Self {
            name: name.into(),
            queue,
            channel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// The command channel for this participant.
    pub fn channel(&self) -> &Arc<dyn MessageChannel> {
        &self.channel
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.name)
            .field("queue", &self.queue)
            .finish()
    }
}

/// Result of asking the workflow what follows a service.
#[derive(Debug, Clone, Copy)]
pub enum Next<'a> {
    /// Hand the saga to this participant.
    Participant(&'a Participant),
    /// The service was the last one; the saga is complete.
    EndOfWorkflow,
}

/// Ordered list of participants. Order is the only traversal order.
#[derive(Debug, Clone, Default)]
pub struct WorkflowDefinition {
    participants: Vec<Participant>,
}

impl WorkflowDefinition {
    pub fn new(participants: Vec<Participant>) -> Self {
        Self { participants }
    }

    /// Builds a workflow from textual specs, opening one channel per queue.
    pub fn build<F>(specs: &[ParticipantSpec], mut channel_for: F) -> Self
    where
        F: FnMut(&str) -> Arc<dyn MessageChannel>,
    {
        let participants = specs
            .iter()
            .map(|spec| Participant::new(spec.name.clone(), channel_for(&spec.queue)))
            .collect();
        Self::new(participants)
    }

    pub fn first(&self) -> Option<&Participant> {
        self.participants.first()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Returns the participant after `current`.
    ///
    /// The first participant with a matching name wins.
    pub fn next(&self, current: &str) -> Result<Next<'_>, WorkflowError> {
        let position = self
            .participants
            .iter()
            .position(|p| p.name == current)
            .ok_or_else(|| WorkflowError::ServiceNotFound(current.to_string()))?;

        Ok(match self.participants.get(position + 1) {
            Some(next) => Next::Participant(next),
            None => Next::EndOfWorkflow,
        })
    }
}

/// A participant as written in configuration: `name=queue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSpec {
    pub name: String,
    pub queue: String,
}

impl ParticipantSpec {
    /// Parses a comma-separated `name=queue` list, keeping its order.
    pub fn parse_list(input: &str) -> Result<Vec<ParticipantSpec>, WorkflowError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (name, queue) = entry
                    .split_once('=')
                    .map(|(n, q)| (n.trim(), q.trim()))
                    .filter(|(n, q)| !n.is_empty() && !q.is_empty())
                    .ok_or_else(|| {
                        WorkflowError::InvalidSpec(format!("expected name=queue, got '{entry}'"))
                    })?;
                Ok(ParticipantSpec {
                    name: name.to_string(),
                    queue: queue.to_string(),
                })
            })
            .collect()
    }
}
