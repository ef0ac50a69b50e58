//! Durable queue abstraction between the hub and the persistence consumer.
//!
//! The hub publishes every routed message; the persistence consumer drains
//! the same topic and commits entries to the message store. Kafka is the
//! production backend; `MemoryQueue` serves tests and single-process runs.

mod memory;

pub use memory::{MemoryQueue, MemorySubscriber};

use anyhow::Result;
use async_trait::async_trait;
use chat_config::{ConsumerAckMode, KafkaConfig};
use chat_types::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Producer side of the durable queue
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Serialize `message` and enqueue it on the durable topic.
    /// No local buffering or retry.
    async fn publish(&self, message: &Message) -> Result<()>;

    /// Wait for in-flight publishes (graceful shutdown)
    async fn flush(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// Where an entry sits in its backend, used to acknowledge it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPosition {
    Memory { tag: u64 },
    Partition { partition: i32, offset: i64 },
}

/// One raw entry received from the durable queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub payload: Vec<u8>,
    pub position: EntryPosition,
}

/// Consumer side of the durable queue
#[async_trait]
pub trait QueueSubscriber: Send + Sync {
    /// Wait for the next entry
    async fn recv(&self) -> Result<QueueEntry>;

    /// Acknowledge an entry. Only meaningful in `AfterPersist` mode; in `Auto`
    /// mode entries are acknowledged on receipt.
    async fn ack(&self, entry: &QueueEntry) -> Result<()>;

    fn ack_mode(&self) -> ConsumerAckMode;
}

/// True when messages go through the in-process queue: Kafka is disabled or
/// compiled out.
pub fn uses_memory_backend(config: &KafkaConfig) -> bool {
    !(config.enabled && cfg!(feature = "kafka"))
}

/// Build the publisher for the configured backend.
///
/// `memory` is used when Kafka is disabled (or compiled out) and must be the
/// same queue handed to [`open_subscriber`].
pub fn open_publisher(
    config: &KafkaConfig,
    memory: &MemoryQueue,
) -> Result<Arc<dyn MessagePublisher>> {
    #[cfg(feature = "kafka")]
    if !uses_memory_backend(config) {
        let producer = crate::kafka::MessageProducer::new(config)?;
        return Ok(Arc::new(producer));
    }

    warn_memory_backend(config);
    Ok(Arc::new(memory.clone()))
}

/// Build the subscriber for the configured backend.
pub async fn open_subscriber(
    config: &KafkaConfig,
    memory: &MemoryQueue,
) -> Result<Arc<dyn QueueSubscriber>> {
    #[cfg(feature = "kafka")]
    if !uses_memory_backend(config) {
        let consumer = crate::kafka::MessageConsumer::new(config)?;
        return Ok(Arc::new(consumer));
    }

    Ok(Arc::new(memory.subscribe(config.consumer_ack_mode).await))
}

fn warn_memory_backend(config: &KafkaConfig) {
    if config.enabled {
        warn!("KAFKA_ENABLED=true but the kafka feature is not compiled in");
    }
    warn!(
        topic = %config.topic,
        "Using in-process message queue: entries are not durable across restarts"
    );
}
