//! SQL Service Broker queue source
//!
//! sqlx-backed implementation of the queue ports. The broker dialect lives
//! entirely in this module: receiving is a single `WAITFOR (RECEIVE ..)`
//! command issued inside the cycle's transaction, so a rollback puts every
//! received message back on the queue.

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Row, Transaction};
use tokio_util::sync::CancellationToken;

use brokerq_core::{ListenerError, TriggerConfig, MESSAGE_BATCH_SIZE, READ_WAIT_PERIOD};

use crate::source::{QueueCycle, QueueSource, ReceivedRow};

/// A listener holds at most one connection at a time; the headroom is for
/// hosts that share one source across several listeners.
const MAX_CONNECTIONS: u32 = 4;

/// Build the bounded receive command for a trigger configuration.
///
/// The shape is fixed: wait up to the read period for a batch of
/// [`MESSAGE_BATCH_SIZE`] messages and convert the payload in place.
pub fn receive_command(config: &TriggerConfig) -> String {
    format!(
        "WAITFOR (RECEIVE TOP({}) CONVERT({}, message_body) FROM {}), TIMEOUT {}",
        MESSAGE_BATCH_SIZE,
        config.message_data_type.as_sql(),
        config.queue,
        READ_WAIT_PERIOD.as_millis()
    )
}

/// Queue source backed by a sqlx connection pool.
///
/// Each cycle checks a connection out of the pool, applies the optional
/// database override, and begins a transaction; the cycle owns both until
/// commit or rollback.
pub struct SqlBrokerQueue {
    pool: AnyPool,
    config: TriggerConfig,
    command: String,
}

impl SqlBrokerQueue {
    /// Connect a pool for the configured target.
    pub async fn connect(config: TriggerConfig) -> Result<Self, ListenerError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(&config.connection_string)
            .await?;
        tracing::debug!(queue = %config.queue, "Queue source connected");
        Ok(Self::with_pool(pool, config))
    }

    /// Wrap an existing pool, for hosts that already manage one.
    pub fn with_pool(pool: AnyPool, config: TriggerConfig) -> Self {
        let command = receive_command(&config);
        Self {
            pool,
            config,
            command,
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }
}

#[async_trait]
impl QueueSource for SqlBrokerQueue {
    async fn begin_cycle(
        &self,
        cancel: CancellationToken,
    ) -> Result<Box<dyn QueueCycle>, ListenerError> {
        let mut tx = self.pool.begin().await?;

        // The database need not be named here if the connection string
        // already selects it.
        if let Some(database) = &self.config.database {
            sqlx::query(&format!("USE {}", database))
                .execute(&mut *tx)
                .await?;
        }

        Ok(Box::new(BrokerCycle {
            tx,
            command: self.command.clone(),
            cancel,
        }))
    }
}

/// A single cycle's transaction. Dropping it without commit or rollback
/// rolls the transaction back through the pool.
struct BrokerCycle {
    tx: Transaction<'static, Any>,
    command: String,
    cancel: CancellationToken,
}

#[async_trait]
impl QueueCycle for BrokerCycle {
    async fn receive(&mut self) -> Result<Vec<ReceivedRow>, ListenerError> {
        let fetch = sqlx::query(&self.command).fetch_all(&mut *self.tx);
        let rows: Vec<AnyRow> = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ListenerError::Cancelled),
            rows = fetch => rows?,
        };
        Ok(rows.iter().map(row_values).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), ListenerError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), ListenerError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn row_values(row: &AnyRow) -> ReceivedRow {
    // The contract is a single nullable string column. A value that fails
    // to decode as one surfaces as null; the true column count is kept so
    // the shape check downstream still sees it.
    let values = (0..row.len())
        .map(|i| row.try_get::<Option<String>, _>(i).ok().flatten())
        .collect();
    ReceivedRow::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brokerq_core::MessageDataType;

    #[test]
    fn receive_command_matches_broker_contract() {
        let config = TriggerConfig::new("server=ignored", "orders_queue");
        assert_eq!(
            receive_command(&config),
            "WAITFOR (RECEIVE TOP(1) CONVERT(VARCHAR(MAX), message_body) \
             FROM orders_queue), TIMEOUT 10000"
        );
    }

    #[test]
    fn receive_command_uses_configured_data_type() {
        let config = TriggerConfig::new("server=ignored", "events")
            .with_message_data_type(MessageDataType::Xml);
        assert_eq!(
            receive_command(&config),
            "WAITFOR (RECEIVE TOP(1) CONVERT(XML, message_body) FROM events), TIMEOUT 10000"
        );
    }
}
