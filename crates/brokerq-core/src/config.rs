//! Configuration module
//!
//! Trigger configuration and the fixed polling constants. A trigger is
//! described by an immutable [`TriggerConfig`] built at construction time;
//! connection strings are resolved from the ambient environment by
//! reference.

use std::env;
use std::time::Duration;

use crate::models::MessageDataType;

/// Ambient configuration key used when a trigger does not name its own
/// connection reference.
pub const DEFAULT_CONNECTION_REF: &str = "SqlQueue";

/// Upper bound on a single blocking receive, baked into the receive command
/// as its `TIMEOUT` clause.
pub const READ_WAIT_PERIOD: Duration = Duration::from_millis(10 * 1000);

/// Pause before the next cycle when the previous receive returned nothing.
pub const DELAY_WHEN_QUEUE_EMPTY: Duration = Duration::from_millis(5 * 1000);

/// Pause before the next cycle when the previous receive returned messages.
/// Non-zero so that multiple listeners fed by the same queue round-robin
/// instead of one starving the rest.
pub const DELAY_WHEN_QUEUE_NOT_EMPTY: Duration = Duration::from_millis(2 * 1000);

/// Number of messages requested per receive. Held at 1 to keep each
/// transaction short: a handler failure rolls back the whole batch, so a
/// larger batch would redeliver every batch-mate of the failing message.
pub const MESSAGE_BATCH_SIZE: u32 = 1;

/// Where and how a listener reads: connection target, optional database
/// override, the queue to receive from, and the payload conversion applied
/// by the receive command. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub connection_string: String,
    /// Applied with `USE` after the connection opens. Not needed when the
    /// connection string already names the database.
    pub database: Option<String>,
    pub queue: String,
    /// Service Broker contract the queue's conversations use. Informational
    /// for now; the receive command reads every conversation on the queue.
    pub contract: Option<String>,
    pub message_data_type: MessageDataType,
}

impl TriggerConfig {
    pub fn new(connection_string: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            database: None,
            queue: queue.into(),
            contract: None,
            message_data_type: MessageDataType::default(),
        }
    }

    /// Build a config whose connection string comes from the ambient
    /// environment under [`DEFAULT_CONNECTION_REF`].
    pub fn from_env(queue: impl Into<String>) -> Result<Self, anyhow::Error> {
        let connection_string = resolve_connection_string(DEFAULT_CONNECTION_REF)?;
        Ok(Self::new(connection_string, queue))
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn with_message_data_type(mut self, message_data_type: MessageDataType) -> Self {
        self.message_data_type = message_data_type;
        self
    }
}

/// Look up a connection string by reference.
///
/// The reference is tried as an environment variable verbatim, then in
/// SCREAMING_SNAKE form (`SqlQueue` -> `SQL_QUEUE`).
pub fn resolve_connection_string(connection_ref: &str) -> Result<String, anyhow::Error> {
    env::var(connection_ref)
        .or_else(|_| env::var(screaming_snake(connection_ref)))
        .map_err(|_| {
            anyhow::anyhow!(
                "No connection string configured for reference '{}'",
                connection_ref
            )
        })
}

fn screaming_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() && i > 0 {
            out.push('_');
        }
        out.push(ch.to_ascii_uppercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_connection_ref_verbatim() {
        env::set_var("BrokerqTestVerbatim", "server=a;database=b");
        let resolved = resolve_connection_string("BrokerqTestVerbatim").unwrap();
        assert_eq!(resolved, "server=a;database=b");
        env::remove_var("BrokerqTestVerbatim");
    }

    #[test]
    fn falls_back_to_screaming_snake() {
        env::set_var("BROKERQ_TEST_SNAKE", "server=c");
        let resolved = resolve_connection_string("BrokerqTestSnake").unwrap();
        assert_eq!(resolved, "server=c");
        env::remove_var("BROKERQ_TEST_SNAKE");
    }

    #[test]
    fn missing_connection_ref_errors() {
        let err = resolve_connection_string("BrokerqTestMissing").unwrap_err();
        assert!(err.to_string().contains("BrokerqTestMissing"));
    }

    #[test]
    fn screaming_snake_splits_on_uppercase() {
        assert_eq!(screaming_snake("SqlQueue"), "SQL_QUEUE");
        assert_eq!(screaming_snake("orders"), "ORDERS");
    }

    #[test]
    fn config_defaults() {
        let config = TriggerConfig::new("server=x", "orders_queue");
        assert_eq!(config.queue, "orders_queue");
        assert!(config.database.is_none());
        assert!(config.contract.is_none());
        assert_eq!(config.message_data_type, MessageDataType::VarCharMax);
    }

    #[test]
    fn config_setters_apply() {
        let config = TriggerConfig::new("server=x", "orders_queue")
            .with_database("jobs")
            .with_contract("//jobs/OrderContract")
            .with_message_data_type(MessageDataType::Xml);
        assert_eq!(config.database.as_deref(), Some("jobs"));
        assert_eq!(config.contract.as_deref(), Some("//jobs/OrderContract"));
        assert_eq!(config.message_data_type, MessageDataType::Xml);
    }
}
