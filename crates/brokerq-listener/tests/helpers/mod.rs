//! In-memory queue source and recording executor for listener tests.
//!
//! The fake queue keeps transactional semantics: a message handed to a
//! cycle is held by that cycle and returns to the front of the queue on
//! rollback, matching how the real store redelivers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use brokerq_core::{ListenerError, QueueMessage, READ_WAIT_PERIOD};
use brokerq_db::{QueueCycle, QueueSource, ReceivedRow};
use brokerq_listener::MessageExecutor;

#[derive(Default)]
struct QueueState {
    messages: VecDeque<ReceivedRow>,
    commits: usize,
    rollbacks: usize,
    receive_times: Vec<tokio::time::Instant>,
}

#[derive(Clone, Default)]
pub struct MemoryQueue {
    state: Arc<Mutex<QueueState>>,
}

impl MemoryQueue {
    pub fn new(messages: &[&str]) -> Self {
        let queue = Self::default();
        for message in messages {
            queue.push_row(ReceivedRow::new(vec![Some(message.to_string())]));
        }
        queue
    }

    pub fn push_row(&self, row: ReceivedRow) {
        self.state.lock().unwrap().messages.push_back(row);
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state.lock().unwrap().rollbacks
    }

    pub fn receive_times(&self) -> Vec<tokio::time::Instant> {
        self.state.lock().unwrap().receive_times.clone()
    }
}

#[async_trait]
impl QueueSource for MemoryQueue {
    async fn begin_cycle(
        &self,
        cancel: CancellationToken,
    ) -> Result<Box<dyn QueueCycle>, ListenerError> {
        Ok(Box::new(MemoryCycle {
            state: Arc::clone(&self.state),
            held: None,
            cancel,
        }))
    }
}

struct MemoryCycle {
    state: Arc<Mutex<QueueState>>,
    held: Option<ReceivedRow>,
    cancel: CancellationToken,
}

#[async_trait]
impl QueueCycle for MemoryCycle {
    async fn receive(&mut self) -> Result<Vec<ReceivedRow>, ListenerError> {
        {
            let mut state = self.state.lock().unwrap();
            state.receive_times.push(tokio::time::Instant::now());
            if let Some(row) = state.messages.pop_front() {
                self.held = Some(row.clone());
                return Ok(vec![row]);
            }
        }

        // Emulate the server-side bounded wait on an empty queue.
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ListenerError::Cancelled),
            _ = tokio::time::sleep(READ_WAIT_PERIOD) => Ok(Vec::new()),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), ListenerError> {
        self.state.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), ListenerError> {
        let mut state = self.state.lock().unwrap();
        state.rollbacks += 1;
        if let Some(row) = self.held.take() {
            state.messages.push_front(row);
        }
        Ok(())
    }
}

/// Records every dispatched payload; fails the first `failures` calls.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<Option<String>>>>,
    failures_remaining: Arc<Mutex<usize>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: usize) -> Self {
        let executor = Self::default();
        *executor.failures_remaining.lock().unwrap() = failures;
        executor
    }

    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageExecutor for RecordingExecutor {
    async fn try_execute(&self, message: QueueMessage) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(message.body.clone());

        let mut remaining = self.failures_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            anyhow::bail!("handler rejected message at position {}", message.position);
        }
        Ok(())
    }
}
