//! Task supervision for the saga service binaries.
//!
//! A process is a handful of long-lived peers (HTTP server, message pump,
//! teardown hooks). [`TaskSupervisor`] spawns them with one shared shutdown
//! channel, turns errors and panics into [`TaskError`]s, cancels everyone as
//! soon as one peer stops, and waits for all of them before reporting.

pub mod error;
pub mod signal;
pub mod supervisor;

pub use error::TaskError;
pub use signal::{cancelled, drain_within, shutdown_signal};
pub use supervisor::{ExitStatus, RunReport, TaskResult, TaskSupervisor};
