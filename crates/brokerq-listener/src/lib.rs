//! Queue poll-and-dispatch listener
//!
//! A listener owns one background poll loop against one queue. Every cycle
//! is a single connection, transaction, and bounded receive; the received
//! message is dispatched to the registered [`MessageExecutor`], and the
//! transaction commits only when the handler succeeded. A failure rolls the
//! whole cycle back, so the store redelivers the message later.
//!
//! Shutdown: [`QueueListener::stop`] cancels the loop and waits for the
//! in-flight cycle to unwind; [`QueueListener::cancel`] raises the signal
//! without waiting. Dropping a listener cancels its loop.

pub mod executor;
pub mod listener;

pub use executor::{MessageExecutor, NoopExecutor};
pub use listener::QueueListener;
