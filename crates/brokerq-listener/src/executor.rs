//! Message executor trait
//!
//! The host implements this trait for whatever owns the user function. The
//! listener calls `try_execute` once per received message and awaits the
//! outcome before touching the next row.

use anyhow::Result;
use async_trait::async_trait;

use brokerq_core::QueueMessage;

/// The handler invoked once per received message.
///
/// An error return rolls back the enclosing cycle's transaction, so the
/// message becomes receivable again on a later cycle.
#[async_trait]
pub trait MessageExecutor: Send + Sync {
    async fn try_execute(&self, message: QueueMessage) -> Result<()>;
}

/// Executor that rejects every message. A placeholder while wiring a host,
/// and a convenient way to exercise rollback paths in tests.
pub struct NoopExecutor;

#[async_trait]
impl MessageExecutor for NoopExecutor {
    async fn try_execute(&self, _message: QueueMessage) -> Result<()> {
        Err(anyhow::anyhow!("NoopExecutor: no message handler registered"))
    }
}
