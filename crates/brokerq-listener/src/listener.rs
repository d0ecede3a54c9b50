//! The poll-and-dispatch listener.
//!
//! The poll loop is a mix of a long blocking receive and delayed retries:
//! the receive waits server-side up to the read period, and the loop sleeps
//! between cycles based on whether the previous cycle delivered anything.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use brokerq_core::{
    ListenerError, ListenerState, QueueMessage, DELAY_WHEN_QUEUE_EMPTY,
    DELAY_WHEN_QUEUE_NOT_EMPTY,
};
use brokerq_db::{QueueCycle, QueueSource};

use crate::executor::MessageExecutor;

/// Listens to new messages on one queue and dispatches them to one
/// executor. Many listeners may run concurrently and independently; each
/// owns its own loop, cancellation signal, and per-cycle transaction.
pub struct QueueListener {
    source: Arc<dyn QueueSource>,
    executor: Arc<dyn MessageExecutor>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: ListenerState,
    cancel: Option<CancellationToken>,
    poll_task: Option<JoinHandle<Result<(), ListenerError>>>,
}

impl QueueListener {
    pub fn new(source: Arc<dyn QueueSource>, executor: Arc<dyn MessageExecutor>) -> Self {
        Self {
            source,
            executor,
            inner: Mutex::new(Inner {
                state: ListenerState::Created,
                cancel: None,
                poll_task: None,
            }),
        }
    }

    /// Launch the poll loop as a background task and return immediately.
    ///
    /// Errors with [`ListenerError::AlreadyStarted`] while a previous loop
    /// is still running.
    pub fn start(&self) -> Result<(), ListenerError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = &inner.poll_task {
            if !task.is_finished() {
                return Err(ListenerError::AlreadyStarted);
            }
        }

        let cancel = CancellationToken::new();
        let source = Arc::clone(&self.source);
        let executor = Arc::clone(&self.executor);
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let result = poll_queue(source, executor, loop_cancel).await;
            match &result {
                Err(ListenerError::Cancelled) => tracing::debug!("Poll loop stopped"),
                Err(err) => tracing::error!(error = %err, "Poll loop terminated with a fault"),
                Ok(()) => {}
            }
            result
        });

        inner.cancel = Some(cancel);
        inner.poll_task = Some(task);
        inner.state = ListenerState::Running;
        tracing::info!("Queue listener started");
        Ok(())
    }

    /// Cancel the loop and wait for the in-flight cycle to unwind.
    ///
    /// A no-op when no loop is running or it has already finished. A
    /// cancellation-triggered abort of the loop is a clean stop; any other
    /// loop fault is returned to the caller.
    pub async fn stop(&self) -> Result<(), ListenerError> {
        let (cancel, task) = {
            let mut inner = self.inner.lock().unwrap();
            let Some(task) = inner.poll_task.take() else {
                return Ok(());
            };
            if task.is_finished() {
                // The loop already ended on its own; a fault was logged
                // when it exited.
                inner.state = ListenerState::Stopped;
                return Ok(());
            }
            inner.state = ListenerState::Stopping;
            (inner.cancel.clone(), task)
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }

        let result = match task.await {
            Ok(Ok(())) | Ok(Err(ListenerError::Cancelled)) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) if join_err.is_panic() => {
                std::panic::resume_unwind(join_err.into_panic())
            }
            Err(_) => Ok(()),
        };

        self.inner.lock().unwrap().state = ListenerState::Stopped;
        tracing::info!("Queue listener stopped");
        result
    }

    /// Raise the cancellation signal without waiting for the loop to
    /// finish. For fast best-effort teardown where blocking is undesirable.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cancel) = &inner.cancel {
            cancel.cancel();
            if inner.state == ListenerState::Running {
                inner.state = ListenerState::Stopping;
            }
        }
    }

    /// Current lifecycle state. A listener whose loop task has finished
    /// reports [`ListenerState::Stopped`] even before `stop` is called.
    pub fn state(&self) -> ListenerState {
        let inner = self.inner.lock().unwrap();
        match &inner.poll_task {
            Some(task) if task.is_finished() => ListenerState::Stopped,
            _ => inner.state,
        }
    }
}

impl Drop for QueueListener {
    fn drop(&mut self) {
        // Best-effort teardown; the loop notices the token at its next
        // suspension point and unwinds its cycle.
        if let Ok(inner) = self.inner.lock() {
            if let Some(cancel) = &inner.cancel {
                cancel.cancel();
            }
        }
    }
}

/// Poll the queue until cancellation.
async fn poll_queue(
    source: Arc<dyn QueueSource>,
    executor: Arc<dyn MessageExecutor>,
    cancel: CancellationToken,
) -> Result<(), ListenerError> {
    loop {
        if cancel.is_cancelled() {
            return Err(ListenerError::Cancelled);
        }

        let delivered = match run_cycle(&*source, &*executor, &cancel).await {
            Ok(count) => count,
            Err(ListenerError::Cancelled) => return Err(ListenerError::Cancelled),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "Poll cycle failed, will retry");
                0
            }
        };

        // Back off when the queue was idle; stay short when it was not, so
        // listeners sharing a queue keep taking turns.
        let delay = if delivered == 0 {
            DELAY_WHEN_QUEUE_EMPTY
        } else {
            DELAY_WHEN_QUEUE_NOT_EMPTY
        };
        tokio::select! {
            _ = cancel.cancelled() => return Err(ListenerError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// One cycle: begin, receive, dispatch, then commit or roll back as a unit.
async fn run_cycle(
    source: &dyn QueueSource,
    executor: &dyn MessageExecutor,
    cancel: &CancellationToken,
) -> Result<usize, ListenerError> {
    let mut cycle = source
        .begin_cycle(cancel.clone())
        .await
        .map_err(|err| reclassify_for_cancel(err, cancel))?;

    let err = match dispatch_batch(&mut *cycle, executor).await {
        Ok(count) => match cycle.commit().await {
            Ok(()) => return Ok(count),
            // The transaction was consumed by the commit attempt; there is
            // nothing left to roll back.
            Err(err) => err,
        },
        Err(err) => {
            if let Err(rollback_err) = cycle.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            err
        }
    };

    Err(reclassify_for_cancel(err, cancel))
}

/// A store abort triggered by cancellation can surface as a plain driver
/// error rather than a cancellation. Resolve that race in favor of
/// cancellation so `stop` stays clean; this can mask a genuine store error
/// that lands while shutdown is already in progress.
fn reclassify_for_cancel(err: ListenerError, cancel: &CancellationToken) -> ListenerError {
    if err.is_store() && cancel.is_cancelled() {
        ListenerError::Cancelled
    } else {
        err
    }
}

/// Receive one batch and invoke the executor once per row, in row order.
async fn dispatch_batch(
    cycle: &mut dyn QueueCycle,
    executor: &dyn MessageExecutor,
) -> Result<usize, ListenerError> {
    let rows = cycle.receive().await?;

    let mut delivered = 0;
    for (position, row) in rows.into_iter().enumerate() {
        delivered += 1;

        let body = row.into_body()?;
        let message = QueueMessage::new(body, position);
        executor
            .try_execute(message)
            .await
            .map_err(ListenerError::Execution)?;
    }

    Ok(delivered)
}
