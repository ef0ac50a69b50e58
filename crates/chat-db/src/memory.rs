use anyhow::Result;
use async_trait::async_trait;
use chat_types::{Message, Pagination, UserId};
use tokio::sync::RwLock;

use crate::MessageStore;

/// In-process message store with the same ordering and idempotency rules as
/// the PostgreSQL store. Used by tests and local runs.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<Message>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    pub async fn contains(&self, id: &uuid::Uuid) -> bool {
        self.messages.read().await.iter().any(|m| m.id == *id)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: &Message) -> Result<()> {
        let mut messages = self.messages.write().await;
        if !messages.iter().any(|m| m.id == message.id) {
            messages.push(message.clone());
        }
        Ok(())
    }

    async fn history(&self, a: &UserId, b: &UserId, page: Pagination) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;
        let mut pair: Vec<Message> = messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect();
        pair.sort_by(|x, y| y.created_at.cmp(&x.created_at));

        Ok(pair
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message_at(sender: UserId, receiver: UserId, content: &str, secs: i64) -> Message {
        let mut msg = Message::new(sender, receiver, content);
        msg.created_at = Utc.timestamp_opt(secs, 0).unwrap();
        msg
    }

    #[tokio::test]
    async fn test_history_paginates_most_recent_first() {
        let store = MemoryMessageStore::new();
        let a = UserId::random();
        let b = UserId::random();

        let m1 = message_at(a, b, "m1", 1);
        let m2 = message_at(b, a, "m2", 2);
        let m3 = message_at(a, b, "m3", 3);
        // Insert out of order: the store orders by timestamp, not arrival
        for m in [&m2, &m3, &m1] {
            store.append(m).await.unwrap();
        }

        let first = store.history(&a, &b, Pagination::new(Some(2), Some(0))).await.unwrap();
        assert_eq!(first, vec![m3.clone(), m2.clone()]);

        let second = store.history(&a, &b, Pagination::new(Some(2), Some(2))).await.unwrap();
        assert_eq!(second, vec![m1.clone()]);

        // Argument order does not matter
        let swapped = store.history(&b, &a, Pagination::new(Some(2), Some(0))).await.unwrap();
        assert_eq!(swapped, first);
    }

    #[tokio::test]
    async fn test_history_excludes_other_pairs() {
        let store = MemoryMessageStore::new();
        let a = UserId::random();
        let b = UserId::random();
        let c = UserId::random();

        store.append(&message_at(a, b, "ab", 1)).await.unwrap();
        store.append(&message_at(a, c, "ac", 2)).await.unwrap();
        store.append(&message_at(c, b, "cb", 3)).await.unwrap();

        let history = store.history(&a, &b, Pagination::default()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "ab");
    }

    #[tokio::test]
    async fn test_append_is_idempotent_on_id() {
        let store = MemoryMessageStore::new();
        let msg = Message::new(UserId::random(), UserId::random(), "once");

        store.append(&msg).await.unwrap();
        store.append(&msg).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert!(store.contains(&msg.id).await);
    }
}
