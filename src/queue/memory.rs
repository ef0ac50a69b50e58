//! In-process durable queue.
//!
//! Mirrors the broker semantics the persistence consumer relies on: entries
//! published while nobody is subscribed are retained, and entries delivered
//! in `AfterPersist` mode stay pending until acknowledged. A new subscription
//! redelivers every pending entry before fresh ones. Nothing survives a
//! process restart.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chat_config::ConsumerAckMode;
use chat_types::Message;
use tokio::sync::{Mutex, Notify};

use super::{EntryPosition, MessagePublisher, QueueEntry, QueueSubscriber};

#[derive(Default)]
struct QueueState {
    ready: VecDeque<(u64, Vec<u8>)>,
    unacked: BTreeMap<u64, Vec<u8>>,
    next_tag: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    available: Notify,
}

/// Shared handle to an in-process queue; clones refer to the same topic
#[derive(Clone, Default)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a consumer. Entries still pending acknowledgment from an earlier
    /// subscription go back to the head of the queue.
    pub async fn subscribe(&self, ack_mode: ConsumerAckMode) -> MemorySubscriber {
        requeue_unacked(&mut *self.shared.state.lock().await);
        self.shared.available.notify_one();

        MemorySubscriber {
            shared: Arc::clone(&self.shared),
            ack_mode,
        }
    }

    /// Append a raw payload, bypassing message serialization
    pub async fn push_raw(&self, payload: Vec<u8>) {
        let mut state = self.shared.state.lock().await;
        let tag = state.next_tag;
        state.next_tag += 1;
        state.ready.push_back((tag, payload));
        drop(state);
        self.shared.available.notify_one();
    }

    /// Entries waiting to be received
    pub async fn ready_len(&self) -> usize {
        self.shared.state.lock().await.ready.len()
    }

    /// Entries received but not yet acknowledged
    pub async fn unacked_len(&self) -> usize {
        self.shared.state.lock().await.unacked.len()
    }
}

fn requeue_unacked(state: &mut QueueState) {
    let pending = std::mem::take(&mut state.unacked);
    for (tag, payload) in pending.into_iter().rev() {
        state.ready.push_front((tag, payload));
    }
}

#[async_trait]
impl MessagePublisher for MemoryQueue {
    async fn publish(&self, message: &Message) -> Result<()> {
        let payload = serde_json::to_vec(message).context("Failed to serialize message")?;
        self.push_raw(payload).await;
        Ok(())
    }
}

/// Consumer attached to a [`MemoryQueue`]
pub struct MemorySubscriber {
    shared: Arc<Shared>,
    ack_mode: ConsumerAckMode,
}

#[async_trait]
impl QueueSubscriber for MemorySubscriber {
    async fn recv(&self) -> Result<QueueEntry> {
        loop {
            let notified = self.shared.available.notified();
            {
                let mut state = self.shared.state.lock().await;
                if let Some((tag, payload)) = state.ready.pop_front() {
                    if self.ack_mode == ConsumerAckMode::AfterPersist {
                        state.unacked.insert(tag, payload.clone());
                    }
                    if !state.ready.is_empty() {
                        self.shared.available.notify_one();
                    }
                    return Ok(QueueEntry {
                        payload,
                        position: EntryPosition::Memory { tag },
                    });
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, entry: &QueueEntry) -> Result<()> {
        if let EntryPosition::Memory { tag } = entry.position {
            self.shared.state.lock().await.unacked.remove(&tag);
        }
        Ok(())
    }

    fn ack_mode(&self) -> ConsumerAckMode {
        self.ack_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_types::UserId;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entries_published_before_subscribe_are_retained() {
        let queue = MemoryQueue::new();
        let msg = Message::new(UserId::random(), UserId::random(), "early");
        queue.publish(&msg).await.unwrap();

        let sub = queue.subscribe(ConsumerAckMode::Auto).await;
        let entry = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Message::from_slice(&entry.payload).unwrap(), msg);
        assert_eq!(queue.unacked_len().await, 0);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let queue = MemoryQueue::new();
        let sub = queue.subscribe(ConsumerAckMode::Auto).await;

        let waiter = tokio::spawn(async move { sub.recv().await.map(|e| e.payload) });
        tokio::task::yield_now().await;
        queue.push_raw(b"late".to_vec()).await;

        let payload = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(payload, b"late");
    }

    #[tokio::test]
    async fn test_unacked_entries_are_redelivered_in_order() {
        let queue = MemoryQueue::new();
        queue.push_raw(b"one".to_vec()).await;
        queue.push_raw(b"two".to_vec()).await;
        queue.push_raw(b"three".to_vec()).await;

        let first = queue.subscribe(ConsumerAckMode::AfterPersist).await;
        let one = first.recv().await.unwrap();
        let _two = first.recv().await.unwrap();
        first.ack(&one).await.unwrap();
        assert_eq!(queue.unacked_len().await, 1);
        drop(first);

        let second = queue.subscribe(ConsumerAckMode::AfterPersist).await;
        assert_eq!(second.recv().await.unwrap().payload, b"two");
        assert_eq!(second.recv().await.unwrap().payload, b"three");
    }
}
