use chat_config::Config;
use chat_db::MessageStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::hub::Hub;
use crate::notification::NotificationService;

/// Application context containing shared dependencies
#[derive(Clone)]
pub struct AppContext {
    pub hub: Hub,
    /// History reads go straight to the store, bypassing the hub
    pub store: Arc<dyn MessageStore>,
    pub config: Arc<Config>,
    pub notifications: Option<NotificationService>,
    /// Raised once on shutdown; connections use child tokens
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(
        hub: Hub,
        store: Arc<dyn MessageStore>,
        config: Arc<Config>,
        notifications: Option<NotificationService>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            hub,
            store,
            config,
            notifications,
            shutdown,
        }
    }
}
