//! Connection registry and private message routing.
//!
//! The hub maps each user to at most one live connection. Routing is
//! fire-and-forget towards the durable queue and best-effort towards the live
//! peer: a full mailbox gets its connection evicted rather than blocking the
//! sender.

pub mod connection;

pub use connection::{Connection, ConnectionState};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chat_config::{HubConfig, LoggingConfig};
use chat_types::{Message, UserId};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::notification::NotificationService;
use crate::queue::MessagePublisher;
use crate::utils::loggable_user;

/// Outbound half of a connection's mailbox. The hub holds the only sender, so
/// dropping the registry entry closes the mailbox.
pub type Mailbox = mpsc::Sender<String>;

/// Identifies one connection instance, so a stale unregister cannot remove a
/// newer connection for the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hub-side handle on a connection's lifecycle. Closing it marks the
/// connection `Closing` and cancels both of its loops, so a connection the
/// hub dropped stops reading and releases its transport even when its write
/// loop is stuck on a slow peer.
#[derive(Clone)]
pub struct ConnectionControl {
    cancel: CancellationToken,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl ConnectionControl {
    pub fn new(cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(ConnectionState::Open);
        Self {
            cancel,
            state: Arc::new(state),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Open -> Closing, then cancel the loops. Idempotent.
    pub fn close(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Open {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        });
        self.cancel.cancel();
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

struct RegistryEntry {
    id: ConnectionId,
    mailbox: Mailbox,
    control: ConnectionControl,
}

type Clients = Arc<RwLock<HashMap<UserId, RegistryEntry>>>;

/// Result of the live half of routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted into the receiver's mailbox
    Delivered,
    /// Receiver has no live connection
    Offline,
    /// Receiver's mailbox was full; its connection was evicted
    Evicted,
    /// Receiver's write loop was already gone; the entry was removed
    Stale,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Offline => "offline",
            DeliveryOutcome::Evicted => "evicted",
            DeliveryOutcome::Stale => "stale",
        }
    }
}

/// Registry of live connections plus the routing algorithm
#[derive(Clone)]
pub struct Hub {
    clients: Clients,
    publisher: Arc<dyn MessagePublisher>,
    notifications: Option<NotificationService>,
    mailbox_capacity: usize,
    logging: LoggingConfig,
}

impl Hub {
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        config: &HubConfig,
        logging: LoggingConfig,
    ) -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            publisher,
            notifications: None,
            mailbox_capacity: config.mailbox_capacity,
            logging,
        }
    }

    /// Submit an offline notification whenever a receiver has no live connection
    pub fn with_notifications(mut self, notifications: NotificationService) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// A fresh bounded mailbox sized from the hub configuration
    pub fn mailbox(&self) -> (Mailbox, mpsc::Receiver<String>) {
        mpsc::channel(self.mailbox_capacity.max(1))
    }

    /// Register a bare mailbox with no connection loops attached to it
    pub async fn register(&self, user_id: UserId, mailbox: Mailbox) -> ConnectionId {
        let control = ConnectionControl::new(CancellationToken::new());
        self.register_connection(user_id, mailbox, control).await
    }

    /// Register `mailbox` as the live connection for `user_id`.
    ///
    /// An existing connection for the same user is replaced: its mailbox is
    /// closed and its control handle closed, which ends both of its loops.
    pub async fn register_connection(
        &self,
        user_id: UserId,
        mailbox: Mailbox,
        control: ConnectionControl,
    ) -> ConnectionId {
        let id = ConnectionId::new();
        let mut clients = self.clients.write().await;
        let previous = clients.insert(
            user_id,
            RegistryEntry {
                id,
                mailbox,
                control,
            },
        );
        chat_metrics::ACTIVE_CONNECTIONS.set(clients.len() as i64);
        drop(clients);

        let user = loggable_user(&user_id, &self.logging);
        if let Some(previous) = previous {
            previous.control.close();
            info!(
                user = %user,
                replaced = %previous.id,
                connection_id = %id,
                "Connection replaced by a newer session"
            );
        } else {
            debug!(user = %user, connection_id = %id, "Connection registered");
        }
        id
    }

    /// Remove the registry entry for `user_id` if it still belongs to
    /// `connection_id`. Returns whether anything was removed.
    pub async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let removed = self.remove_if_current(user_id, connection_id).await;
        if removed {
            debug!(
                user = %loggable_user(&user_id, &self.logging),
                connection_id = %connection_id,
                "Connection unregistered"
            );
        }
        removed
    }

    async fn remove_if_current(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let mut clients = self.clients.write().await;
        let current = clients.get(&user_id).map(|entry| entry.id);
        if current != Some(connection_id) {
            return false;
        }
        if let Some(entry) = clients.remove(&user_id) {
            entry.control.close();
        }
        chat_metrics::ACTIVE_CONNECTIONS.set(clients.len() as i64);
        true
    }

    /// Accept a private message from `sender` to `receiver`.
    ///
    /// The message is published to the durable queue on a detached task and,
    /// if the receiver is online, pushed into its mailbox without waiting.
    pub async fn route_private_message(
        &self,
        sender: UserId,
        receiver: UserId,
        content: String,
    ) -> anyhow::Result<(Message, DeliveryOutcome)> {
        let message = Message::new(sender, receiver, content);
        let payload = message.to_json()?;
        chat_metrics::MESSAGES_ROUTED_TOTAL.inc();

        self.publish_detached(message.clone());

        let outcome = self.deliver_live(receiver, payload).await;
        chat_metrics::LIVE_DELIVERY_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();

        if self.logging.enable_message_metadata {
            debug!(
                message_id = %message.id,
                from = %loggable_user(&sender, &self.logging),
                to = %loggable_user(&receiver, &self.logging),
                outcome = outcome.as_str(),
                "Private message routed"
            );
        } else {
            debug!(message_id = %message.id, outcome = outcome.as_str(), "Private message routed");
        }

        if outcome == DeliveryOutcome::Offline {
            self.notify_offline(&message);
        }

        Ok((message, outcome))
    }

    fn publish_detached(&self, message: Message) {
        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move {
            match publisher.publish(&message).await {
                Ok(()) => chat_metrics::PUBLISH_SUCCESS_TOTAL.inc(),
                Err(e) => {
                    chat_metrics::PUBLISH_FAILURES_TOTAL.inc();
                    warn!(
                        error = %e,
                        message_id = %message.id,
                        "Failed to publish message to durable queue"
                    );
                }
            }
        });
    }

    async fn deliver_live(&self, receiver: UserId, payload: String) -> DeliveryOutcome {
        let target = {
            let clients = self.clients.read().await;
            clients
                .get(&receiver)
                .map(|entry| (entry.id, entry.mailbox.clone()))
        };

        let Some((connection_id, mailbox)) = target else {
            return DeliveryOutcome::Offline;
        };

        let outcome = match mailbox.try_send(payload) {
            Ok(()) => return DeliveryOutcome::Delivered,
            Err(TrySendError::Full(_)) => DeliveryOutcome::Evicted,
            Err(TrySendError::Closed(_)) => DeliveryOutcome::Stale,
        };
        // Our clone must not keep the mailbox open past removal
        drop(mailbox);

        if self.remove_if_current(receiver, connection_id).await {
            let user = loggable_user(&receiver, &self.logging);
            match outcome {
                DeliveryOutcome::Evicted => warn!(
                    user = %user,
                    connection_id = %connection_id,
                    "Mailbox full, evicting slow connection"
                ),
                _ => debug!(
                    user = %user,
                    connection_id = %connection_id,
                    "Removed stale connection"
                ),
            }
        }
        outcome
    }

    fn notify_offline(&self, message: &Message) {
        if let Some(notifications) = &self.notifications {
            let notifications = notifications.clone();
            let message = message.clone();
            tokio::spawn(async move {
                notifications.notify_offline_message(&message).await;
            });
        }
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.clients.read().await.contains_key(user_id)
    }

    /// Connection currently registered for `user_id`
    pub async fn lookup(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.clients.read().await.get(user_id).map(|entry| entry.id)
    }

    pub async fn online_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Close every registered connection and empty the registry
    pub async fn close_all(&self) -> usize {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        for (_, entry) in clients.drain() {
            entry.control.close();
        }
        chat_metrics::ACTIVE_CONNECTIONS.set(0);
        count
    }

    /// Wait for `shutdown`, then close every registered connection so their
    /// write loops send close frames.
    pub async fn run(&self, shutdown: CancellationToken) {
        shutdown.cancelled().await;
        let closed = self.close_all().await;
        info!(connections = closed, "Hub stopped, all mailboxes closed");
    }

    pub(crate) fn logging(&self) -> &LoggingConfig {
        &self.logging
    }
}
