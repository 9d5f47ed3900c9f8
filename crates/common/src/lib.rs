//! Identifiers shared by every crate in the workspace.

mod types;

pub use types::SagaId;
