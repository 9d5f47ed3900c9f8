use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use crate::channel::{DEFAULT_VISIBILITY_TIMEOUT, MessageChannel, ReceivedMessage, Receipt};
use crate::{QueueError, Result};

#[derive(Debug)]
struct StoredMessage {
    body: String,
    receipt: Option<Receipt>,
    receive_count: u32,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: Vec<StoredMessage>,
}

impl QueueState {
    fn take_visible(
        &mut self,
        max_messages: usize,
        now: Instant,
        visibility_timeout: Duration,
    ) -> Vec<ReceivedMessage> {
        self.messages
            .iter_mut()
            .filter(|m| m.visible_at <= now)
            .take(max_messages)
            .map(|m| {
                let receipt = Receipt::new(Uuid::new_v4().to_string());
                m.receipt = Some(receipt.clone());
                m.receive_count += 1;
                m.visible_at = now + visibility_timeout;
                ReceivedMessage {
                    body: m.body.clone(),
                    receipt,
                    receive_count: m.receive_count,
                }
            })
            .collect()
    }

    fn next_visible_at(&self, now: Instant) -> Option<Instant> {
        self.messages
            .iter()
            .map(|m| m.visible_at)
            .filter(|at| *at > now)
            .min()
    }
}

/// In-memory message channel for testing and local runs.
///
/// Mirrors the visibility-timeout semantics of a real queue: received
/// messages are hidden, unacknowledged ones come back after the timeout.
#[derive(Clone)]
pub struct InMemoryChannel {
    name: String,
    visibility_timeout: Duration,
    state: Arc<Mutex<QueueState>>,
    arrivals: Arc<Notify>,
    fail_on_send: Arc<AtomicBool>,
    fail_on_receive: Arc<AtomicBool>,
}

impl InMemoryChannel {
    /// Creates an empty queue with the default visibility timeout.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_visibility_timeout(name, DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// Creates an empty queue with a custom visibility timeout.
    pub fn with_visibility_timeout(name: impl Into<String>, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            visibility_timeout,
            state: Arc::new(Mutex::new(QueueState::default())),
            arrivals: Arc::new(Notify::new()),
            fail_on_send: Arc::new(AtomicBool::new(false)),
            fail_on_receive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configures the channel to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.fail_on_send.store(fail, Ordering::SeqCst);
    }

    /// Configures the channel to fail every receive.
    pub fn set_fail_on_receive(&self, fail: bool) {
        self.fail_on_receive.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of messages not yet acknowledged, in flight or not.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// Returns the raw bodies of all unacknowledged messages, oldest first.
    pub async fn bodies(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    /// Decodes all unacknowledged messages, oldest first.
    pub async fn messages<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.bodies()
            .await
            .iter()
            .map(|body| serde_json::from_str(body).map_err(QueueError::from))
            .collect()
    }

    fn unavailable(&self, reason: &str) -> QueueError {
        QueueError::Unavailable {
            queue: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_raw(&self, body: String) -> Result<()> {
        if self.fail_on_send.load(Ordering::SeqCst) {
            return Err(self.unavailable("send switched off"));
        }

        self.state.lock().await.messages.push(StoredMessage {
            body,
            receipt: None,
            receive_count: 0,
            visible_at: Instant::now(),
        });
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        if self.fail_on_receive.load(Ordering::SeqCst) {
            return Err(self.unavailable("receive switched off"));
        }

        let max_messages = max_messages.max(1);
        let deadline = Instant::now() + wait_time;

        loop {
            // Register interest before looking so a send in between is not missed
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let now = Instant::now();
            let next_visible = {
                let mut state = self.state.lock().await;
                let batch = state.take_visible(max_messages, now, self.visibility_timeout);
                if !batch.is_empty() {
                    return Ok(batch);
                }
                state.next_visible_at(now)
            };

            if now >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                () = &mut arrival => {}
                () = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn acknowledge(&self, receipt: &Receipt) -> Result<()> {
        let mut state = self.state.lock().await;
        let position = state
            .messages
            .iter()
            .position(|m| m.receipt.as_ref() == Some(receipt))
            .ok_or_else(|| QueueError::ReceiptNotFound {
                queue: self.name.clone(),
                receipt: receipt.to_string(),
            })?;
        state.messages.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageChannelExt;
    use crate::message::Command;
    use common::SagaId;

    #[tokio::test]
    async fn test_send_and_receive() {
        let channel = InMemoryChannel::new("commands1");
        let command = Command::start(SagaId::new());

        channel.send(&command).await.unwrap();

        let batch = channel.receive(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].receive_count, 1);
        let decoded: Command = serde_json::from_str(&batch[0].body).unwrap();
        assert_eq!(decoded, command);
    }

    #[tokio::test]
    async fn test_received_message_is_hidden_until_acknowledged() {
        let channel = InMemoryChannel::new("commands1");
        channel.send_raw("{}".to_string()).await.unwrap();

        let first = channel.receive(10, Duration::from_millis(10)).await.unwrap();
        let second = channel.receive(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(channel.pending_count().await, 1);

        channel.acknowledge(&first[0].receipt).await.unwrap();
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_message_is_redelivered() {
        let channel = InMemoryChannel::with_visibility_timeout("responses", Duration::from_secs(5));
        channel.send_raw("{}".to_string()).await.unwrap();

        let first = channel.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);

        // Waits past the visibility timeout and gets the same message back
        let again = channel.receive(10, Duration::from_secs(20)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].receive_count, 2);
        assert_ne!(again[0].receipt, first[0].receipt);

        // The stale receipt no longer removes the message
        assert!(matches!(
            channel.acknowledge(&first[0].receipt).await,
            Err(QueueError::ReceiptNotFound { .. })
        ));
        channel.acknowledge(&again[0].receipt).await.unwrap();
        assert_eq!(channel.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_receive_respects_batch_size() {
        let channel = InMemoryChannel::new("responses");
        for i in 0..5 {
            channel.send_raw(format!("{{\"n\":{i}}}")).await.unwrap();
        }

        let batch = channel.receive(3, Duration::ZERO).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].body, "{\"n\":0}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_receive_waits_for_budget() {
        let channel = InMemoryChannel::new("responses");
        let started = Instant::now();

        let batch = channel.receive(10, Duration::from_secs(20)).await.unwrap();

        assert!(batch.is_empty());
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_receive_wakes_on_send() {
        let channel = InMemoryChannel::new("responses");
        let sender = channel.clone();

        let receiver = tokio::spawn(async move {
            channel.receive(10, Duration::from_secs(30)).await.unwrap()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        sender.send_raw("{}".to_string()).await.unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), receiver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let channel = InMemoryChannel::new("commands2");
        channel.set_fail_on_send(true);
        channel.set_fail_on_receive(true);

        assert!(matches!(
            channel.send_raw("{}".to_string()).await,
            Err(QueueError::Unavailable { .. })
        ));
        assert!(channel.receive(1, Duration::ZERO).await.is_err());
        assert_eq!(channel.pending_count().await, 0);
    }
}
