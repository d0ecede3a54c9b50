//! Brokerq Core Library
//!
//! This crate provides the domain models, error taxonomy, and trigger
//! configuration shared by the queue source and listener crates.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{
    resolve_connection_string, TriggerConfig, DEFAULT_CONNECTION_REF, DELAY_WHEN_QUEUE_EMPTY,
    DELAY_WHEN_QUEUE_NOT_EMPTY, MESSAGE_BATCH_SIZE, READ_WAIT_PERIOD,
};
pub use error::ListenerError;
pub use models::{ListenerState, MessageDataType, QueueMessage};
