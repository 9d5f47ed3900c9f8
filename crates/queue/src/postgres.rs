use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::channel::{DEFAULT_VISIBILITY_TIMEOUT, MessageChannel, ReceivedMessage, Receipt};
use crate::{QueueError, Result};

/// Delay between two empty polls while a receive is waiting.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// PostgreSQL-backed message channel.
///
/// All queues share the `queue_messages` table. Receivers claim rows with
/// `FOR UPDATE SKIP LOCKED`, stamp a fresh receipt and push `visible_at`
/// forward, so concurrent consumers never get the same delivery.
#[derive(Clone)]
pub struct PostgresChannel {
    pool: PgPool,
    queue: String,
    visibility_timeout: Duration,
    poll_interval: Duration,
}

impl PostgresChannel {
    /// Creates a channel on the named queue.
    pub fn new(pool: PgPool, queue: impl Into<String>) -> Self {
        Self {
            pool,
            queue: queue.into(),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how long a received message stays hidden.
    pub fn with_visibility_timeout(mut self, visibility_timeout: Duration) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    /// Sets the delay between empty polls.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn claim_batch(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>> {
        let rows = sqlx::query(
            r#"
            UPDATE queue_messages
            SET receipt = md5(random()::text || clock_timestamp()::text || id::text)::uuid,
                receive_count = receive_count + 1,
                visible_at = NOW() + make_interval(secs => $3)
            WHERE id IN (
                SELECT id FROM queue_messages
                WHERE queue = $1 AND visible_at <= NOW()
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, body, receipt, receive_count
            "#,
        )
        .bind(&self.queue)
        .bind(max_messages as i64)
        .bind(self.visibility_timeout.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let receipt: Uuid = row.try_get("receipt")?;
            let receive_count: i32 = row.try_get("receive_count")?;
            claimed.push((
                id,
                ReceivedMessage {
                    body: row.try_get("body")?,
                    receipt: Receipt::new(receipt.to_string()),
                    receive_count: receive_count.max(0) as u32,
                },
            ));
        }

        // RETURNING does not preserve the subquery order
        claimed.sort_by_key(|(id, _)| *id);
        Ok(claimed.into_iter().map(|(_, message)| message).collect())
    }
}

#[async_trait]
impl MessageChannel for PostgresChannel {
    fn name(&self) -> &str {
        &self.queue
    }

    async fn send_raw(&self, body: String) -> Result<()> {
        sqlx::query("INSERT INTO queue_messages (queue, body) VALUES ($1, $2)")
            .bind(&self.queue)
            .bind(body)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn receive(
        &self,
        max_messages: usize,
        wait_time: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        let max_messages = max_messages.max(1);
        let deadline = tokio::time::Instant::now() + wait_time;

        loop {
            let batch = self.claim_batch(max_messages).await?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(batch);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn acknowledge(&self, receipt: &Receipt) -> Result<()> {
        let not_found = || QueueError::ReceiptNotFound {
            queue: self.queue.clone(),
            receipt: receipt.to_string(),
        };
        let receipt_id = Uuid::parse_str(receipt.as_str()).map_err(|_| not_found())?;

        let result = sqlx::query("DELETE FROM queue_messages WHERE queue = $1 AND receipt = $2")
            .bind(&self.queue)
            .bind(receipt_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found());
        }

        Ok(())
    }
}
