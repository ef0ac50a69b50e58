// ============================================================================
// Chat Config - Centralized configuration management
// ============================================================================
//
// Configuration for the chat server and the persistence worker.
// Loaded from environment variables with sensible defaults.
//
// ============================================================================

mod constants;
mod database;
mod hub;
mod kafka;
mod logging;

pub use constants::MAX_MESSAGE_SIZE;
pub use database::DbConfig;
pub use hub::{HubConfig, NotificationConfig};
pub use kafka::{ConsumerAckMode, KafkaConfig};
pub use logging::LoggingConfig;

use anyhow::{Context, Result};
use constants::*;
use std::time::Duration;

/// Main configuration structure for the chat services
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub bind_address: String,
    pub rust_log: String,

    /// Run the persistence consumer inside the chat server process.
    /// Disable when a standalone persistence_worker is deployed.
    pub persistence_consumer_enabled: bool,

    /// Budget for graceful shutdown of the HTTP server and background tasks
    pub shutdown_timeout_secs: u64,

    // Sub-configurations
    pub logging: LoggingConfig,
    pub kafka: KafkaConfig,
    pub db: DbConfig,
    pub hub: HubConfig,
    pub notifications: NotificationConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let logging = LoggingConfig::from_env()?;
        let kafka = KafkaConfig::from_env()?;
        let db = DbConfig::from_env();
        let hub = HubConfig::from_env();
        let notifications = NotificationConfig::from_env();

        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port,
            bind_address: format!("[::]:{}", port),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            persistence_consumer_enabled: std::env::var("PERSISTENCE_CONSUMER_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            shutdown_timeout_secs: std::env::var("SHUTDOWN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            logging,
            kafka,
            db,
            hub,
            notifications,
        })
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Configuration for tests and local tooling: in-process queue, no database URL.
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            port: 0,
            bind_address: "127.0.0.1:0".to_string(),
            rust_log: "debug".to_string(),
            persistence_consumer_enabled: true,
            shutdown_timeout_secs: 1,
            logging: LoggingConfig {
                enable_message_metadata: true,
                enable_user_identifiers: true,
                hash_salt: "test-salt-that-is-super-secret".to_string(),
            },
            kafka: KafkaConfig::default(),
            db: DbConfig::default(),
            hub: HubConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_for_tests_uses_reference_limits() {
        let config = Config::for_tests();
        assert_eq!(config.hub.mailbox_capacity, 256);
        assert_eq!(config.notifications.enqueue_timeout(), Duration::from_secs(1));
        assert_eq!(config.notifications.shutdown_timeout(), Duration::from_secs(10));
        assert!(!config.kafka.enabled);
    }
}
