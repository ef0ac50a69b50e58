// ============================================================================
// Kafka Configuration
// ============================================================================

use crate::constants::{DEFAULT_CONSUMER_GROUP, DEFAULT_KAFKA_TOPIC};

/// When the persistence consumer acknowledges a queue entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConsumerAckMode {
    /// Acknowledge on receipt, before the store write. A crash or store
    /// failure after this point loses the entry.
    #[default]
    Auto,
    /// Acknowledge only once the store write succeeded. Entries may be
    /// redelivered, so store writes must be idempotent on message id.
    AfterPersist,
}

impl ConsumerAckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerAckMode::Auto => "auto",
            ConsumerAckMode::AfterPersist => "after_persist",
        }
    }
}

impl std::str::FromStr for ConsumerAckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ConsumerAckMode::Auto),
            "after_persist" | "after-persist" => Ok(ConsumerAckMode::AfterPersist),
            other => Err(format!("Unknown consumer ack mode: {}", other)),
        }
    }
}

/// Kafka configuration for the durable message path
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Whether Kafka is enabled (false = in-process queue, not durable across restarts)
    pub enabled: bool,
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// Durable topic carrying all private messages
    pub topic: String,
    /// Consumer group ID for persistence consumers
    pub consumer_group: String,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// Path to CA certificate file (for self-signed certificates)
    pub ssl_ca_location: Option<String>,
    // producer-specific settings
    pub producer_compression: String, // "zstd" | "snappy" | "gzip" | "lz4" | "none"
    pub producer_acks: String,        // "all" | "1" | "-1" | "0"
    pub producer_linger_ms: u32,
    pub producer_request_timeout_ms: u32,
    pub producer_delivery_timeout_ms: u32,
    pub producer_enable_idempotence: bool,
    /// Upper bound for a single publish round-trip
    pub producer_send_timeout_ms: u64,
    pub consumer_ack_mode: ConsumerAckMode,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: "localhost:9092".to_string(),
            topic: DEFAULT_KAFKA_TOPIC.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            ssl_enabled: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
            producer_compression: "snappy".to_string(),
            producer_acks: "all".to_string(),
            producer_linger_ms: 10,
            producer_request_timeout_ms: 30000,
            producer_delivery_timeout_ms: 120000,
            producer_enable_idempotence: true,
            producer_send_timeout_ms: 2000,
            consumer_ack_mode: ConsumerAckMode::Auto,
        }
    }
}

impl KafkaConfig {
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let consumer_ack_mode = match std::env::var("CONSUMER_ACK_MODE") {
            Ok(raw) => raw.parse().map_err(anyhow::Error::msg)?,
            Err(_) => defaults.consumer_ack_mode,
        };

        Ok(Self {
            enabled: std::env::var("KAFKA_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or(defaults.brokers),
            topic: std::env::var("KAFKA_TOPIC").unwrap_or(defaults.topic),
            consumer_group: std::env::var("KAFKA_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            ssl_enabled: std::env::var("KAFKA_SSL_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM").ok(),
            sasl_username: std::env::var("KAFKA_SASL_USERNAME").ok(),
            sasl_password: std::env::var("KAFKA_SASL_PASSWORD").ok(),
            ssl_ca_location: std::env::var("KAFKA_SSL_CA_LOCATION").ok(),
            producer_compression: std::env::var("KAFKA_PRODUCER_COMPRESSION")
                .unwrap_or(defaults.producer_compression),
            producer_acks: std::env::var("KAFKA_PRODUCER_ACKS").unwrap_or(defaults.producer_acks),
            producer_linger_ms: std::env::var("KAFKA_PRODUCER_LINGER_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.producer_linger_ms),
            producer_request_timeout_ms: std::env::var("KAFKA_PRODUCER_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.producer_request_timeout_ms),
            producer_delivery_timeout_ms: std::env::var("KAFKA_PRODUCER_DELIVERY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.producer_delivery_timeout_ms),
            producer_enable_idempotence: std::env::var("KAFKA_PRODUCER_ENABLE_IDEMPOTENCE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            producer_send_timeout_ms: std::env::var("KAFKA_PRODUCER_SEND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.producer_send_timeout_ms),
            consumer_ack_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_mode_parsing() {
        assert_eq!("auto".parse::<ConsumerAckMode>(), Ok(ConsumerAckMode::Auto));
        assert_eq!(
            "AFTER_PERSIST".parse::<ConsumerAckMode>(),
            Ok(ConsumerAckMode::AfterPersist)
        );
        assert_eq!(
            "after-persist".parse::<ConsumerAckMode>(),
            Ok(ConsumerAckMode::AfterPersist)
        );
        assert!("sometimes".parse::<ConsumerAckMode>().is_err());
    }

    #[test]
    fn test_defaults_target_chat_topic() {
        let config = KafkaConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.topic, "chat_messages");
        assert_eq!(config.consumer_ack_mode, ConsumerAckMode::Auto);
    }
}
