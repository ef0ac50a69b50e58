// ============================================================================
// Configuration Constants
// ============================================================================

// Default port values
pub(crate) const DEFAULT_PORT: u16 = 50053;

pub(crate) const DEFAULT_KAFKA_TOPIC: &str = "chat_messages";
pub(crate) const DEFAULT_CONSUMER_GROUP: &str = "chat-persistence-consumers";

// Outbound mailbox capacity per live connection
pub(crate) const DEFAULT_MAILBOX_CAPACITY: usize = 256;

// Notification dispatcher
pub(crate) const DEFAULT_NOTIFICATION_WORKERS: usize = 4;
pub(crate) const DEFAULT_NOTIFICATION_QUEUE_CAPACITY: usize = 100;
pub(crate) const DEFAULT_NOTIFICATION_ENQUEUE_TIMEOUT_MS: u64 = 1000;
pub(crate) const DEFAULT_NOTIFICATION_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// Graceful shutdown budget for the HTTP server and the persistence consumer
pub(crate) const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

// WebSocket frame size limit (in bytes)
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
