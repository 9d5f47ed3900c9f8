use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Result, SagaId, SagaRecord, SagaStatus, StoreError,
    store::{ServiceUpdate, StateStore},
};

/// In-memory state store implementation for testing.
///
/// Provides the same contract as the PostgreSQL implementation. The
/// conditional update holds the write lock across compare and set, which
/// gives it the same atomicity as the SQL `WHERE` predicate.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    sagas: Arc<RwLock<HashMap<SagaId, SagaRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStateStore {
    /// Creates a new empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of stored sagas.
    pub async fn saga_count(&self) -> usize {
        self.sagas.read().await.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn insert_saga(&self, saga_id: SagaId, service: &str, status: SagaStatus) -> Result<()> {
        self.check_available()?;

        self.sagas
            .write()
            .await
            .entry(saga_id)
            .or_insert_with(|| SagaRecord {
                id: saga_id,
                current_service: service.to_string(),
                status,
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn update_status(&self, saga_id: SagaId, status: SagaStatus) -> Result<()> {
        self.check_available()?;

        let mut sagas = self.sagas.write().await;
        let record = sagas
            .get_mut(&saga_id)
            .ok_or(StoreError::SagaNotFound(saga_id))?;
        record.status = status;
        Ok(())
    }

    async fn update_service(
        &self,
        saga_id: SagaId,
        expected: &str,
        next: &str,
    ) -> Result<ServiceUpdate> {
        self.check_available()?;

        let mut sagas = self.sagas.write().await;
        match sagas.get_mut(&saga_id) {
            Some(record) if record.current_service == expected => {
                record.current_service = next.to_string();
                Ok(ServiceUpdate::Advanced)
            }
            _ => Ok(ServiceUpdate::Unchanged),
        }
    }

    async fn get_saga(&self, saga_id: SagaId) -> Result<Option<SagaRecord>> {
        self.check_available()?;
        Ok(self.sagas.read().await.get(&saga_id).cloned())
    }

    async fn status_check(&self) -> Result<()> {
        self.check_available()
    }
}
