use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use brokerq_core::{
    resolve_connection_string, MessageDataType, QueueMessage, TriggerConfig,
    DEFAULT_CONNECTION_REF,
};
use brokerq_db::SqlBrokerQueue;
use brokerq_listener::{MessageExecutor, QueueListener};

#[derive(Parser, Debug)]
#[command(name = "brokerq")]
#[command(about = "Listen to a Service Broker queue and log every message")]
struct Args {
    /// Queue to receive from
    #[arg(long)]
    queue: String,

    /// Database to switch to after connecting, when the connection string
    /// does not already select one
    #[arg(long)]
    database: Option<String>,

    /// Connection string reference resolved from the environment
    #[arg(long, default_value = DEFAULT_CONNECTION_REF)]
    connection_ref: String,

    /// Payload conversion: varchar(max), nvarchar(max), or xml
    #[arg(long, default_value = "varchar(max)")]
    message_type: MessageDataType,
}

/// Logs each message. Stands in for a real user function.
struct LogExecutor;

#[async_trait::async_trait]
impl MessageExecutor for LogExecutor {
    async fn try_execute(&self, message: QueueMessage) -> Result<()> {
        tracing::info!(position = message.position, "Received message: {}", message);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let connection_string = resolve_connection_string(&args.connection_ref)?;
    let mut config = TriggerConfig::new(connection_string, &args.queue)
        .with_message_data_type(args.message_type);
    if let Some(database) = args.database {
        config = config.with_database(database);
    }

    let source = SqlBrokerQueue::connect(config).await?;
    let listener = QueueListener::new(Arc::new(source), Arc::new(LogExecutor));
    listener.start()?;
    tracing::info!(queue = %args.queue, "Listening, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    listener.stop().await?;

    Ok(())
}
