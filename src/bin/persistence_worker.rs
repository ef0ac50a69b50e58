// ============================================================================
// Persistence Worker
// ============================================================================
//
// Standalone persistence consumer: drains the Kafka topic into PostgreSQL.
// Deploy with PERSISTENCE_CONSUMER_ENABLED=false on the chat servers so only
// this process consumes. Several workers may share one consumer group.
//
// ============================================================================

use anyhow::{Context, Result};
use chat_db::{MessageStore, PgMessageStore};
use qasynda_chat::persistence::PersistenceConsumer;
use qasynda_chat::queue::{self, MemoryQueue};
use qasynda_chat::Config;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    qasynda_chat::init_tracing(&config.rust_log);

    info!("=== Persistence Worker Starting ===");
    info!("Kafka Brokers: {}", config.kafka.brokers);
    info!("Kafka Topic: {}", config.kafka.topic);
    info!("Kafka Consumer Group: {}", config.kafka.consumer_group);
    info!("Consumer Ack Mode: {}", config.kafka.consumer_ack_mode.as_str());

    if queue::uses_memory_backend(&config.kafka) {
        anyhow::bail!(
            "The standalone persistence worker needs Kafka. Set KAFKA_ENABLED=true \
             (and build with the kafka feature)"
        );
    }

    let pool = chat_db::create_pool(&config.database_url, &config.db)
        .await
        .context("Failed to connect to database")?;
    chat_db::run_migrations(&pool).await?;
    let store: Arc<dyn MessageStore> = Arc::new(PgMessageStore::new(pool));

    let subscriber = queue::open_subscriber(&config.kafka, &MemoryQueue::new()).await?;

    let shutdown = CancellationToken::new();
    let consumer = PersistenceConsumer::new(subscriber, store).spawn(shutdown.clone());

    qasynda_chat::shutdown_signal().await;
    shutdown.cancel();

    match tokio::time::timeout(config.shutdown_timeout(), consumer).await {
        Ok(Ok(stats)) => info!(
            persisted = stats.persisted,
            failed = stats.failed,
            dropped = stats.dropped,
            "Persistence worker stopped"
        ),
        Ok(Err(e)) => warn!(error = %e, "Persistence consumer task failed"),
        Err(_) => warn!("Timeout waiting for persistence consumer to stop"),
    }

    Ok(())
}
