// ============================================================================
// Persistence Consumer
// ============================================================================
//
// Drains the durable queue into the message store, independently of the hub.
//
// Ack policy (CONSUMER_ACK_MODE):
// - auto: entries are acknowledged on receipt; a store failure loses the entry
// - after_persist: an entry is acknowledged only once the store write
//   succeeded; failed writes are retried until they succeed or shutdown
//
// Undecodable entries are dropped in both modes.
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use chat_config::ConsumerAckMode;
use chat_db::MessageStore;
use chat_types::Message;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{QueueEntry, QueueSubscriber};

const RETRY_BACKOFF: Duration = Duration::from_secs(1);
const STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub persisted: u64,
    pub failed: u64,
    pub dropped: u64,
}

pub struct PersistenceConsumer {
    subscriber: Arc<dyn QueueSubscriber>,
    store: Arc<dyn MessageStore>,
}

impl PersistenceConsumer {
    pub fn new(subscriber: Arc<dyn QueueSubscriber>, store: Arc<dyn MessageStore>) -> Self {
        Self { subscriber, store }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<ConsumerStats> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Consume until `shutdown` is cancelled. The entry being processed when
    /// cancellation arrives is finished first (except for after-persist retries).
    pub async fn run(self, shutdown: CancellationToken) -> ConsumerStats {
        let ack_mode = self.subscriber.ack_mode();
        info!(ack_mode = ack_mode.as_str(), "Persistence consumer started");

        let mut stats = ConsumerStats::default();
        let mut last_stats_log = Instant::now();

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.subscriber.recv() => received,
            };

            let entry = match received {
                Ok(entry) => entry,
                Err(e) => {
                    error!(error = %e, "Failed to receive from durable queue");
                    if sleep_or_cancel(&shutdown, RETRY_BACKOFF).await {
                        break;
                    }
                    continue;
                }
            };

            self.process(entry, ack_mode, &shutdown, &mut stats).await;

            if last_stats_log.elapsed() >= STATS_INTERVAL {
                info!(
                    persisted = stats.persisted,
                    failed = stats.failed,
                    dropped = stats.dropped,
                    "Persistence consumer stats"
                );
                last_stats_log = Instant::now();
            }
        }

        info!(
            persisted = stats.persisted,
            failed = stats.failed,
            dropped = stats.dropped,
            "Persistence consumer stopped"
        );
        stats
    }

    async fn process(
        &self,
        entry: QueueEntry,
        ack_mode: ConsumerAckMode,
        shutdown: &CancellationToken,
        stats: &mut ConsumerStats,
    ) {
        let message = match Message::from_slice(&entry.payload) {
            Ok(message) => message,
            Err(e) => {
                stats.dropped += 1;
                chat_metrics::DECODE_FAILURES_TOTAL.inc();
                warn!(error = %e, len = entry.payload.len(), "Dropping undecodable queue entry");
                if ack_mode == ConsumerAckMode::AfterPersist {
                    self.ack(&entry).await;
                }
                return;
            }
        };

        loop {
            match self.store.append(&message).await {
                Ok(()) => {
                    stats.persisted += 1;
                    chat_metrics::MESSAGES_PERSISTED_TOTAL.inc();
                    debug!(message_id = %message.id, "Message persisted");
                    if ack_mode == ConsumerAckMode::AfterPersist {
                        self.ack(&entry).await;
                    }
                    return;
                }
                Err(e) => {
                    stats.failed += 1;
                    chat_metrics::PERSIST_FAILURES_TOTAL.inc();
                    error!(error = %e, message_id = %message.id, "Failed to persist message");

                    // Already acknowledged on receipt: nothing left to retry against
                    if ack_mode == ConsumerAckMode::Auto {
                        return;
                    }
                    if sleep_or_cancel(shutdown, RETRY_BACKOFF).await {
                        warn!(
                            message_id = %message.id,
                            "Shutdown during retry, entry left unacknowledged"
                        );
                        return;
                    }
                }
            }
        }
    }

    async fn ack(&self, entry: &QueueEntry) {
        if let Err(e) = self.subscriber.ack(entry).await {
            error!(error = %e, position = ?entry.position, "Failed to acknowledge queue entry");
        }
    }
}

/// Returns true if cancelled before `delay` elapsed
async fn sleep_or_cancel(shutdown: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
