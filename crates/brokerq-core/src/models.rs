//! Domain models shared across the listener stack.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Conversion applied to `message_body` inside the receive command.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageDataType {
    #[default]
    VarCharMax,
    NVarCharMax,
    Xml,
}

impl MessageDataType {
    /// SQL spelling used inside `CONVERT(..)`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            MessageDataType::VarCharMax => "VARCHAR(MAX)",
            MessageDataType::NVarCharMax => "NVARCHAR(MAX)",
            MessageDataType::Xml => "XML",
        }
    }
}

impl Display for MessageDataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_sql())
    }
}

impl FromStr for MessageDataType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "varchar(max)" => Ok(MessageDataType::VarCharMax),
            "nvarchar(max)" => Ok(MessageDataType::NVarCharMax),
            "xml" => Ok(MessageDataType::Xml),
            _ => Err(anyhow::anyhow!("Invalid message data type: {}", s)),
        }
    }
}

/// A single message received from the queue.
///
/// The payload is `None` when the stored `message_body` was null. `position`
/// is the row's index within its receive batch; with the current batch size
/// of one it is always zero, but the dispatch path does not assume that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: Option<String>,
    pub position: usize,
}

impl QueueMessage {
    pub fn new(body: Option<String>, position: usize) -> Self {
        Self { body, position }
    }
}

impl Display for QueueMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.body.as_deref().unwrap_or_default())
    }
}

/// Lifecycle state of a queue listener.
///
/// Transitions happen only through `start`/`stop`/`cancel`, except that a
/// listener whose poll loop has finished reports `Stopped`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListenerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl Display for ListenerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ListenerState::Created => write!(f, "created"),
            ListenerState::Running => write!(f, "running"),
            ListenerState::Stopping => write!(f, "stopping"),
            ListenerState::Stopped => write!(f, "stopped"),
        }
    }
}
