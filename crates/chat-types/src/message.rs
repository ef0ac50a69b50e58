use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user_id::UserId;

pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
pub const MAX_HISTORY_LIMIT: i64 = 200;

// ============================================================================
// Message - durable unit of communication
// ============================================================================

/// A private message between two principals.
///
/// The same JSON form is written to live connections and to the durable queue.
/// Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// New message with a fresh id, stamped with the current time at
    /// microsecond precision so it survives a round trip through Postgres
    pub fn new(sender_id: UserId, receiver_id: UserId, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: content.into(),
            created_at: Utc::now().trunc_subsecs(6),
        }
    }

    /// True if this message was exchanged between `a` and `b`, in either direction
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (self.sender_id == *a && self.receiver_id == *b)
            || (self.sender_id == *b && self.receiver_id == *a)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// ============================================================================
// Inbound frame
// ============================================================================

/// Client → server frame: `{"receiver_id": "<uuid>", "content": "<text>"}`.
/// Anything else is rejected as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivateMessageRequest {
    pub receiver_id: UserId,
    pub content: String,
}

impl PrivateMessageRequest {
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// ============================================================================
// History pagination
// ============================================================================

/// Clamped `limit`/`offset` pair for history queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    /// `limit` defaults to 20 and is clamped to 1..=200; `offset` defaults to 0
    /// and is clamped to >= 0.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .unwrap_or(DEFAULT_HISTORY_LIMIT)
                .clamp(1, MAX_HISTORY_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let sender = UserId::random();
        let receiver = UserId::random();
        let msg = Message::new(sender, receiver, "hello");

        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["id"], msg.id.to_string());
        assert_eq!(value["sender_id"], sender.to_string());
        assert_eq!(value["receiver_id"], receiver.to_string());
        assert_eq!(value["content"], "hello");
        assert!(value["created_at"].is_string());
    }

    #[test]
    fn test_new_messages_get_distinct_ids() {
        let a = UserId::random();
        let b = UserId::random();
        assert_ne!(Message::new(a, b, "x").id, Message::new(a, b, "x").id);
    }

    #[test]
    fn test_timestamp_has_microsecond_precision() {
        let message = Message::new(UserId::random(), UserId::random(), "x");
        assert_eq!(message.created_at.timestamp_subsec_nanos() % 1_000, 0);

        let json = message.to_json().unwrap();
        assert_eq!(Message::from_slice(json.as_bytes()).unwrap(), message);
    }

    #[test]
    fn test_is_between_either_direction() {
        let a = UserId::random();
        let b = UserId::random();
        let c = UserId::random();
        let msg = Message::new(a, b, "hi");
        assert!(msg.is_between(&a, &b));
        assert!(msg.is_between(&b, &a));
        assert!(!msg.is_between(&a, &c));
    }

    #[test]
    fn test_request_decoding() {
        let receiver = UserId::random();
        let frame = format!(r#"{{"receiver_id":"{}","content":"hey"}}"#, receiver);
        let req = PrivateMessageRequest::decode(frame.as_bytes()).unwrap();
        assert_eq!(req.receiver_id, receiver);
        assert_eq!(req.content, "hey");
    }

    #[test]
    fn test_request_rejects_other_shapes() {
        let receiver = UserId::random();
        assert!(PrivateMessageRequest::decode(b"not json").is_err());
        assert!(PrivateMessageRequest::decode(br#"{"content":"no receiver"}"#).is_err());
        assert!(
            PrivateMessageRequest::decode(br#"{"receiver_id":"bob","content":"x"}"#).is_err()
        );
        let extra = format!(
            r#"{{"receiver_id":"{}","content":"x","type":"broadcast"}}"#,
            receiver
        );
        assert!(PrivateMessageRequest::decode(extra.as_bytes()).is_err());
    }

    #[test]
    fn test_pagination_clamping() {
        assert_eq!(Pagination::new(None, None), Pagination { limit: 20, offset: 0 });
        assert_eq!(Pagination::new(Some(0), Some(-5)), Pagination { limit: 1, offset: 0 });
        assert_eq!(Pagination::new(Some(1000), Some(40)), Pagination { limit: 200, offset: 40 });
    }
}
