// ============================================================================
// Hub & Notification Dispatcher Configuration
// ============================================================================

use std::time::Duration;

use crate::constants::*;

/// Connection registry settings
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Bounded outbound mailbox size per live connection
    pub mailbox_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl HubConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            mailbox_capacity: std::env::var("MAILBOX_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(DEFAULT_MAILBOX_CAPACITY),
        }
    }
}

/// Background notification delivery (bounded worker pool)
#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub workers: usize,
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: DEFAULT_NOTIFICATION_WORKERS,
            queue_capacity: DEFAULT_NOTIFICATION_QUEUE_CAPACITY,
            enqueue_timeout_ms: DEFAULT_NOTIFICATION_ENQUEUE_TIMEOUT_MS,
            shutdown_timeout_secs: DEFAULT_NOTIFICATION_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl NotificationConfig {
    pub(crate) fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("NOTIFICATIONS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            workers: std::env::var("NOTIFICATION_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(defaults.workers),
            queue_capacity: std::env::var("NOTIFICATION_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(defaults.queue_capacity),
            enqueue_timeout_ms: std::env::var("NOTIFICATION_ENQUEUE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enqueue_timeout_ms),
            shutdown_timeout_secs: std::env::var("NOTIFICATION_SHUTDOWN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.shutdown_timeout_secs),
        }
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
