//! Queue store access for brokerq
//!
//! This crate provides the ports the listener consumes (`QueueSource`,
//! `QueueCycle`) and the concrete sqlx-backed Service Broker queue source.

pub mod broker;
pub mod source;

pub use broker::{receive_command, SqlBrokerQueue};
pub use source::{QueueCycle, QueueSource, ReceivedRow};
