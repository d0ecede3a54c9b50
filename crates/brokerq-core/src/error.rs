//! Error types module
//!
//! Every failure mode of the listener lifecycle and of a single poll cycle
//! is unified under [`ListenerError`]. Recoverable errors are rolled back
//! and retried on the next cycle; fatal errors terminate the poll loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListenerError {
    /// `start` was called while a previous poll loop is still running.
    #[error("listener has already been started")]
    AlreadyStarted,

    /// The queue store failed while opening a connection, receiving, or
    /// finishing the transaction.
    #[error("queue store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A received row did not have exactly one column. The receive command
    /// projects a single payload column, so any other shape means the queue
    /// or the command is misconfigured.
    #[error("received row has {columns} columns, expected exactly 1")]
    MalformedRow { columns: usize },

    /// The message handler returned an error. The cycle's transaction rolls
    /// back and the message becomes receivable again.
    #[error("message handler failed")]
    Execution(#[source] anyhow::Error),

    /// The listener's cancellation signal was raised.
    #[error("listener cancelled")]
    Cancelled,
}

impl ListenerError {
    /// True for faults that must terminate the poll loop rather than be
    /// rolled back and retried on the next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ListenerError::MalformedRow { .. } | ListenerError::AlreadyStarted
        )
    }

    /// True when the underlying queue store reported the failure.
    pub fn is_store(&self) -> bool {
        matches!(self, ListenerError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_row_is_fatal() {
        let err = ListenerError::MalformedRow { columns: 3 };
        assert!(err.is_fatal());
        assert!(!err.is_store());
    }

    #[test]
    fn store_and_execution_errors_are_recoverable() {
        let store = ListenerError::Store(sqlx::Error::PoolClosed);
        assert!(!store.is_fatal());
        assert!(store.is_store());

        let exec = ListenerError::Execution(anyhow::anyhow!("handler blew up"));
        assert!(!exec.is_fatal());
        assert!(!exec.is_store());
    }

    #[test]
    fn cancellation_is_not_fatal() {
        assert!(!ListenerError::Cancelled.is_fatal());
    }

    #[test]
    fn malformed_row_names_column_count() {
        let err = ListenerError::MalformedRow { columns: 2 };
        assert_eq!(
            err.to_string(),
            "received row has 2 columns, expected exactly 1"
        );
    }
}
