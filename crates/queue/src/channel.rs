use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::Result;

/// How long a received message stays hidden before it is redelivered.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Opaque handle identifying one delivery of a received message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt(String);

impl Receipt {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Receipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message taken off a queue, still owned by the queue until acknowledged.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Raw JSON payload.
    pub body: String,
    pub receipt: Receipt,
    /// How many times this message has been handed out, this delivery included.
    pub receive_count: u32,
}

/// Point-to-point queue with at-least-once delivery.
///
/// A received message is hidden from other receivers until its visibility
/// timeout elapses; only `acknowledge` removes it for good.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Name of the underlying queue.
    fn name(&self) -> &str;

    /// Enqueues an already-serialized payload.
    async fn send_raw(&self, body: String) -> Result<()>;

    /// Receives up to `max_messages`, waiting at most `wait_time` for the
    /// first one to arrive. An empty batch means the wait budget ran out.
    async fn receive(&self, max_messages: usize, wait_time: Duration)
    -> Result<Vec<ReceivedMessage>>;

    /// Removes a previously received message.
    async fn acknowledge(&self, receipt: &Receipt) -> Result<()>;
}

/// Typed convenience methods for message channels.
#[async_trait]
pub trait MessageChannelExt: MessageChannel {
    /// Serializes a message to JSON and enqueues it.
    async fn send<T>(&self, message: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let body = serde_json::to_string(message)?;
        self.send_raw(body).await
    }
}

// Blanket implementation for all MessageChannel implementations
impl<T: MessageChannel + ?Sized> MessageChannelExt for T {}
