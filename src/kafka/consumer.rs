use anyhow::{Context, Result};
use async_trait::async_trait;
use chat_config::{ConsumerAckMode, KafkaConfig};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Message as _, Offset, TopicPartitionList};
use tracing::info;

use super::config::create_client_config;
use crate::queue::{EntryPosition, QueueEntry, QueueSubscriber};

/// Kafka consumer for the persistence worker
///
/// In `Auto` mode offsets are committed by librdkafka in the background as
/// soon as entries are received. In `AfterPersist` mode nothing is committed
/// until [`QueueSubscriber::ack`] is called for the entry.
pub struct MessageConsumer {
    consumer: StreamConsumer,
    topic: String,
    ack_mode: ConsumerAckMode,
}

impl MessageConsumer {
    /// # Configuration
    /// - `auto.offset.reset=earliest`: a new group starts from the retained backlog
    /// - `session.timeout.ms=30000`, `heartbeat.interval.ms=3000`
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group = %config.consumer_group,
            ack_mode = config.consumer_ack_mode.as_str(),
            "Initializing Kafka consumer"
        );

        let auto_commit = config.consumer_ack_mode == ConsumerAckMode::Auto;

        let consumer: StreamConsumer = create_client_config(config)?
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", auto_commit.to_string())
            .set("auto.offset.reset", "earliest")
            .set("fetch.wait.max.ms", "500")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[&config.topic])
            .context("Failed to subscribe to Kafka topic")?;

        info!("Kafka consumer initialized successfully");

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            ack_mode: config.consumer_ack_mode,
        })
    }
}

#[async_trait]
impl QueueSubscriber for MessageConsumer {
    async fn recv(&self) -> Result<QueueEntry> {
        let message = self
            .consumer
            .recv()
            .await
            .context("Kafka consumer error")?;

        Ok(QueueEntry {
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            position: EntryPosition::Partition {
                partition: message.partition(),
                offset: message.offset(),
            },
        })
    }

    async fn ack(&self, entry: &QueueEntry) -> Result<()> {
        let EntryPosition::Partition { partition, offset } = entry.position else {
            return Ok(());
        };

        // Committed offset is the next one to read
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, partition, Offset::Offset(offset + 1))
            .context("Failed to build commit offsets")?;
        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .context("Failed to commit offset")?;
        Ok(())
    }

    fn ack_mode(&self) -> ConsumerAckMode {
        self.ack_mode
    }
}
