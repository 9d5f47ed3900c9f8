//! Messaging for the saga service.
//!
//! Commands flow from the coordinator to participants, responses flow back on
//! a shared queue. Every queue is at-least-once: a received message stays
//! hidden for a visibility timeout and is redelivered unless acknowledged.
//! The [`MessagePump`] is the only consumer loop; it acknowledges a message
//! only after its processor succeeded.

pub mod channel;
pub mod error;
pub mod memory;
pub mod message;
pub mod postgres;
pub mod pump;

pub use channel::{MessageChannel, MessageChannelExt, ReceivedMessage, Receipt};
pub use error::{QueueError, Result};
pub use memory::InMemoryChannel;
pub use message::{COMMAND_START, Command, RESPONSES_QUEUE, Response, ResponseStatus};
pub use postgres::PostgresChannel;
pub use pump::{MessagePump, Processor, PumpConfig};
