pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::SagaId;
pub use error::{Result, StoreError};
pub use memory::InMemoryStateStore;
pub use postgres::PostgresStateStore;
pub use record::{SagaRecord, SagaStatus};
pub use store::{ServiceUpdate, StateStore};
