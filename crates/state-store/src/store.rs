use async_trait::async_trait;

use crate::{Result, SagaId, SagaRecord, SagaStatus};

/// Outcome of a conditional service update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceUpdate {
    /// The stored service matched the expected one and was replaced.
    Advanced,
    /// The stored service did not match (or the saga is absent); nothing changed.
    Unchanged,
}

impl ServiceUpdate {
    /// Returns true if the row was moved to the next service.
    pub fn is_advanced(&self) -> bool {
        matches!(self, ServiceUpdate::Advanced)
    }
}

/// Durable storage for saga records.
///
/// The store is the single source of truth for saga progress and the only
/// synchronization point between concurrent responses. Implementations must
/// make `update_service` an atomic compare-and-set on the current service.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Inserts a new saga record.
    ///
    /// Idempotent: if a saga with this id already exists the call succeeds
    /// and leaves the existing row untouched.
    async fn insert_saga(&self, saga_id: SagaId, service: &str, status: SagaStatus) -> Result<()>;

    /// Sets the saga status.
    ///
    /// Fails with `SagaNotFound` when no row was affected.
    async fn update_status(&self, saga_id: SagaId, status: SagaStatus) -> Result<()>;

    /// Sets the current service to `next` only if it currently equals `expected`.
    ///
    /// A predicate miss is not an error; it is reported as `Unchanged`.
    async fn update_service(&self, saga_id: SagaId, expected: &str, next: &str)
    -> Result<ServiceUpdate>;

    /// Loads a saga record by id.
    async fn get_saga(&self, saga_id: SagaId) -> Result<Option<SagaRecord>>;

    /// Round-trips the store to check it is ready to serve requests.
    async fn status_check(&self) -> Result<()>;
}
