//! Queue access abstraction
//!
//! This module defines the ports the listener consumes. A [`QueueSource`]
//! opens one poll cycle at a time; a [`QueueCycle`] owns that cycle's
//! connection and transaction until it is committed or rolled back.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use brokerq_core::ListenerError;

/// One raw row returned by a receive call.
///
/// Column values are kept as returned so the caller can validate the result
/// shape before touching the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedRow {
    values: Vec<Option<String>>,
}

impl ReceivedRow {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    /// Extract the payload. Errors unless the row has exactly one column.
    pub fn into_body(mut self) -> Result<Option<String>, ListenerError> {
        if self.values.len() != 1 {
            return Err(ListenerError::MalformedRow {
                columns: self.values.len(),
            });
        }
        Ok(self.values.remove(0))
    }
}

/// Opens poll cycles against the backing queue store.
///
/// Implemented by [`crate::SqlBrokerQueue`] for real stores and by in-memory
/// fakes in tests.
#[async_trait]
pub trait QueueSource: Send + Sync {
    /// Open a connection and begin the transaction for one poll cycle.
    ///
    /// The token is threaded into the cycle so a blocking receive aborts
    /// promptly when the listener is cancelled instead of waiting out its
    /// timeout.
    async fn begin_cycle(
        &self,
        cancel: CancellationToken,
    ) -> Result<Box<dyn QueueCycle>, ListenerError>;
}

/// One connection + one transaction + one bounded receive.
///
/// The cycle must release its connection and transaction on every exit
/// path; dropping an unfinished cycle rolls the transaction back.
#[async_trait]
pub trait QueueCycle: Send {
    /// Issue the blocking bounded receive, waiting up to
    /// [`brokerq_core::READ_WAIT_PERIOD`] for messages.
    async fn receive(&mut self) -> Result<Vec<ReceivedRow>, ListenerError>;

    /// Commit the transaction, removing received messages from the queue.
    async fn commit(self: Box<Self>) -> Result<(), ListenerError>;

    /// Roll the transaction back, making received messages receivable again.
    async fn rollback(self: Box<Self>) -> Result<(), ListenerError>;
}
