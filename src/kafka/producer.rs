use anyhow::{Context, Result};
use async_trait::async_trait;
use chat_config::KafkaConfig;
use chat_types::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::config::create_client_config;
use crate::queue::MessagePublisher;

/// Kafka producer for the durable message topic
///
/// Messages are keyed by receiver id so that every message for one receiver
/// lands on the same partition. Acks, idempotence, compression and batching
/// come from `KafkaConfig`.
#[derive(Clone)]
pub struct MessageProducer {
    producer: Arc<FutureProducer>,
    topic: String,
    send_timeout: Duration,
}

impl MessageProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!("Initializing Kafka producer...");
        let mut client_config = create_client_config(config)?;

        let producer: FutureProducer = client_config
            .set("acks", &config.producer_acks)
            .set(
                "enable.idempotence",
                config.producer_enable_idempotence.to_string(),
            )
            .set("max.in.flight.requests.per.connection", "5")
            .set("retries", "2147483647")
            .set("compression.type", &config.producer_compression)
            .set("linger.ms", config.producer_linger_ms.to_string())
            .set(
                "request.timeout.ms",
                config.producer_request_timeout_ms.to_string(),
            )
            .set(
                "delivery.timeout.ms",
                config.producer_delivery_timeout_ms.to_string(),
            )
            .create()
            .context("Failed to create Kafka producer")?;

        info!(topic = %config.topic, "Kafka producer initialized");

        Ok(Self {
            producer: Arc::new(producer),
            topic: config.topic.clone(),
            send_timeout: Duration::from_millis(config.producer_send_timeout_ms),
        })
    }
}

#[async_trait]
impl MessagePublisher for MessageProducer {
    async fn publish(&self, message: &Message) -> Result<()> {
        let payload = serde_json::to_vec(message).context("Failed to serialize message")?;
        let key = message.receiver_id.to_string();

        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        let start = Instant::now();
        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(kafka_err, _)| anyhow::anyhow!("Kafka send failed: {}", kafka_err))?;

        let latency = start.elapsed();
        chat_metrics::PUBLISH_LATENCY.observe(latency.as_secs_f64());
        debug!(
            partition = partition,
            offset = offset,
            message_id = %message.id,
            latency_ms = latency.as_millis(),
            "Message published to Kafka"
        );

        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        info!("Flushing Kafka producer (timeout: {:?})", timeout);
        self.producer
            .flush(Timeout::After(timeout))
            .context("Failed to flush Kafka producer")?;
        Ok(())
    }
}
