// ============================================================================
// Notifications
// ============================================================================
//
// Out-of-band notifications (email/SMS) delivered through the bounded
// dispatcher. The transport itself is external; `LoggingNotifier` stands in
// for it.
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chat_config::{LoggingConfig, NotificationConfig};
use chat_types::{Message, UserId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dispatcher::{BoundedDispatcher, DispatcherSettings, EnqueueOutcome, TaskHandler};
use crate::utils::loggable_user;

/// Stand-in latency for the external notification call
pub const SIMULATED_SEND_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Email,
    Sms,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Email => "email",
            NotificationKind::Sms => "sms",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationTask {
    pub user_id: UserId,
    pub message: String,
    pub kind: NotificationKind,
}

/// Delivers a single notification to its external channel
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, task: &NotificationTask) -> Result<()>;
}

/// Logs each notification after a fixed delay standing in for the external call
pub struct LoggingNotifier {
    delay: Duration,
    logging: LoggingConfig,
}

impl LoggingNotifier {
    pub fn new(delay: Duration, logging: LoggingConfig) -> Self {
        Self { delay, logging }
    }
}

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, task: &NotificationTask) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        info!(
            user = %loggable_user(&task.user_id, &self.logging),
            kind = %task.kind,
            "Notification sent"
        );
        Ok(())
    }
}

struct NotifierHandler {
    notifier: Arc<dyn Notifier>,
}

#[async_trait]
impl TaskHandler<NotificationTask> for NotifierHandler {
    async fn handle(&self, task: NotificationTask) -> Result<()> {
        self.notifier.send(&task).await
    }
}

/// Entry point for queuing notifications
#[derive(Clone)]
pub struct NotificationService {
    dispatcher: Arc<BoundedDispatcher<NotificationTask>>,
}

impl NotificationService {
    /// Start the worker pool
    pub fn start(config: &NotificationConfig, notifier: Arc<dyn Notifier>) -> Self {
        let dispatcher = BoundedDispatcher::start(
            DispatcherSettings::notifications(config),
            NotifierHandler { notifier },
        );
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub async fn notify(
        &self,
        user_id: UserId,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> EnqueueOutcome {
        self.dispatcher
            .enqueue(NotificationTask {
                user_id,
                message: message.into(),
                kind,
            })
            .await
    }

    pub async fn send_email(&self, user_id: UserId, message: impl Into<String>) -> EnqueueOutcome {
        self.notify(user_id, message, NotificationKind::Email).await
    }

    pub async fn send_sms(&self, user_id: UserId, message: impl Into<String>) -> EnqueueOutcome {
        self.notify(user_id, message, NotificationKind::Sms).await
    }

    /// Tell the receiver of `message` that something arrived while they were offline.
    /// Content is not included.
    pub async fn notify_offline_message(&self, message: &Message) -> EnqueueOutcome {
        self.send_email(message.receiver_id, "You have a new message")
            .await
    }

    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Recording(mpsc::UnboundedSender<NotificationTask>);

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, task: &NotificationTask) -> Result<()> {
            let _ = self.0.send(task.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_offline_notification_targets_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service =
            NotificationService::start(&NotificationConfig::default(), Arc::new(Recording(tx)));

        let message = Message::new(UserId::random(), UserId::random(), "secret content");
        assert_eq!(
            service.notify_offline_message(&message).await,
            EnqueueOutcome::Queued
        );

        let task = rx.recv().await.unwrap();
        assert_eq!(task.user_id, message.receiver_id);
        assert_eq!(task.kind, NotificationKind::Email);
        assert!(!task.message.contains("secret content"));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_sms_kind() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let service =
            NotificationService::start(&NotificationConfig::default(), Arc::new(Recording(tx)));

        let user = UserId::random();
        service.send_sms(user, "code 1234").await;
        let task = rx.recv().await.unwrap();
        assert_eq!(task.kind, NotificationKind::Sms);
        assert_eq!(task.kind.to_string(), "sms");

        service.shutdown().await;
    }
}
