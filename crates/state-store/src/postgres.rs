use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, SagaId, SagaRecord, SagaStatus, StoreError,
    store::{ServiceUpdate, StateStore},
};

/// PostgreSQL-backed state store implementation.
#[derive(Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Creates a new PostgreSQL state store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations (saga table and queue table).
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<SagaRecord> {
        let status: String = row.try_get("status")?;

        Ok(SagaRecord {
            id: SagaId::from_uuid(row.try_get::<Uuid, _>("id")?),
            current_service: row.try_get("service")?,
            status: status.parse()?,
            created_at: row.try_get::<DateTime<Utc>, _>("date_created")?,
        })
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    #[tracing::instrument(skip(self))]
    async fn insert_saga(&self, saga_id: SagaId, service: &str, status: SagaStatus) -> Result<()> {
        // ON CONFLICT keeps a restarted saga untouched
        sqlx::query(
            r#"
            INSERT INTO sagas (id, status, service, date_created)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(saga_id.as_uuid())
        .bind(status.as_str())
        .bind(service)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn update_status(&self, saga_id: SagaId, status: SagaStatus) -> Result<()> {
        let result = sqlx::query("UPDATE sagas SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(saga_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SagaNotFound(saga_id));
        }

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn update_service(
        &self,
        saga_id: SagaId,
        expected: &str,
        next: &str,
    ) -> Result<ServiceUpdate> {
        let result = sqlx::query("UPDATE sagas SET service = $1 WHERE id = $2 AND service = $3")
            .bind(next)
            .bind(saga_id.as_uuid())
            .bind(expected)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            Ok(ServiceUpdate::Unchanged)
        } else {
            Ok(ServiceUpdate::Advanced)
        }
    }

    async fn get_saga(&self, saga_id: SagaId) -> Result<Option<SagaRecord>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, service, status, date_created
            FROM sagas
            WHERE id = $1
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn status_check(&self) -> Result<()> {
        let _: bool = sqlx::query_scalar("SELECT true")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
