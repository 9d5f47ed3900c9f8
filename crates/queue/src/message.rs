//! Wire format of the messages exchanged with participants.

use common::SagaId;
use serde::{Deserialize, Serialize};

/// The only command name the coordinator emits.
pub const COMMAND_START: &str = "start";

/// Name of the queue every participant answers on.
pub const RESPONSES_QUEUE: &str = "responses";

/// Coordinator → participant: "do your step for this saga".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub saga_id: SagaId,
    pub name: String,
}

impl Command {
    /// Creates the `start` command for a saga.
    pub fn start(saga_id: SagaId) -> Self {
        Self {
            saga_id,
            name: COMMAND_START.to_string(),
        }
    }
}

/// Participant → coordinator: outcome of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub saga_id: SagaId,
    /// Name of the participant reporting.
    pub service: String,
    pub status: ResponseStatus,
}

impl Response {
    /// A successful step report.
    pub fn done(saga_id: SagaId, service: impl Into<String>) -> Self {
        Self {
            saga_id,
            service: service.into(),
            status: ResponseStatus::Done,
        }
    }

    /// A failed step report.
    pub fn error(saga_id: SagaId, service: impl Into<String>) -> Self {
        Self {
            saga_id,
            service: service.into(),
            status: ResponseStatus::Error,
        }
    }
}

/// Status carried by a [`Response`].
///
/// Any string decodes; values other than `done` and `error` land in
/// `Unknown` so the coordinator, not the decoder, rejects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResponseStatus {
    Done,
    Error,
    Unknown(String),
}

impl ResponseStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ResponseStatus::Done => "done",
            ResponseStatus::Error => "error",
            ResponseStatus::Unknown(s) => s,
        }
    }
}

impl From<String> for ResponseStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "done" => ResponseStatus::Done,
            "error" => ResponseStatus::Error,
            _ => ResponseStatus::Unknown(s),
        }
    }
}

impl From<ResponseStatus> for String {
    fn from(status: ResponseStatus) -> Self {
        match status {
            ResponseStatus::Unknown(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
