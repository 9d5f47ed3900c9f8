//! Receive → decode → process → acknowledge loop.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::Result;
use crate::channel::{MessageChannel, ReceivedMessage};

/// Handles one decoded message.
///
/// Returning an error leaves the message on the queue; it will be delivered
/// again once its visibility timeout runs out.
#[async_trait]
pub trait Processor<M>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn process(&self, message: M) -> std::result::Result<(), Self::Error>;
}

/// Batch parameters for each receive call.
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    /// Upper bound on messages per receive.
    pub max_messages: usize,
    /// How long one receive may block waiting for the first message.
    pub wait_time: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(20),
        }
    }
}

/// Drains a channel into a [`Processor`], one message at a time.
///
/// Generic over the payload type `M`: the response queue feeds the saga
/// coordinator with `Response`s, a participant's command queue feeds the
/// participant with `Command`s.
pub struct MessagePump<M, P> {
    channel: Arc<dyn MessageChannel>,
    processor: Arc<P>,
    config: PumpConfig,
    _message: PhantomData<fn() -> M>,
}

impl<M, P> MessagePump<M, P>
where
    M: DeserializeOwned + Send + 'static,
    P: Processor<M>,
{
    /// Creates a pump reading from `channel` and feeding `processor`.
    pub fn new(channel: Arc<dyn MessageChannel>, processor: Arc<P>, config: PumpConfig) -> Self {
        Self {
            channel,
            processor,
            config,
            _message: PhantomData,
        }
    }

    /// Runs until `shutdown` turns true (or its sender is dropped).
    ///
    /// Receive failures are logged and retried immediately. A message whose
    /// body does not decode, or whose processing fails, is logged and left
    /// unacknowledged. Cancellation is checked before every message so a
    /// shutdown does not wait for the rest of a batch.
    #[tracing::instrument(skip_all, fields(queue = %self.channel.name()))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!("message pump started");

        while !is_cancelled(&shutdown) {
            let received = tokio::select! {
                result = self.channel.receive(self.config.max_messages, self.config.wait_time) => result,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let batch = match received {
                Ok(batch) => batch,
                Err(e) => {
                    metrics::counter!("pump_receive_errors_total").increment(1);
                    tracing::error!(error = %e, "receiving messages failed");
                    // A failing receive may never reach an await point
                    tokio::task::yield_now().await;
                    continue;
                }
            };

            for message in batch {
                if is_cancelled(&shutdown) {
                    tracing::info!("message pump stopped mid-batch");
                    return Ok(());
                }
                self.handle(message).await;
            }
        }

        tracing::info!("message pump stopped");
        Ok(())
    }

    async fn handle(&self, message: ReceivedMessage) {
        let decoded: M = match serde_json::from_str(&message.body) {
            Ok(decoded) => decoded,
            Err(e) => {
                metrics::counter!("pump_decode_failures_total").increment(1);
                tracing::error!(
                    error = %e,
                    receipt = %message.receipt,
                    body = %message.body,
                    "could not decode message"
                );
                return;
            }
        };

        tracing::debug!(
            receipt = %message.receipt,
            receive_count = message.receive_count,
            body = %message.body,
            "processing message"
        );

        if let Err(e) = self.processor.process(decoded).await {
            metrics::counter!("pump_messages_failed_total").increment(1);
            tracing::error!(
                error = %e,
                receipt = %message.receipt,
                receive_count = message.receive_count,
                "processing message failed, leaving it on the queue"
            );
            return;
        }

        metrics::counter!("pump_messages_processed_total").increment(1);
        if let Err(e) = self.channel.acknowledge(&message.receipt).await {
            tracing::error!(error = %e, receipt = %message.receipt, "acknowledging message failed");
        }
    }
}

/// True once cancellation was requested or the sending side is gone.
fn is_cancelled(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
