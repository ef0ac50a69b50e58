use anyhow::{bail, Context, Result};
use axum::Router;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod context;
pub mod dispatcher;
pub mod hub;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod notification;
pub mod persistence;
pub mod queue;
pub mod routes;
pub mod utils;

pub use chat_config::Config;

use chat_db::{MessageStore, PgMessageStore};
use context::AppContext;
use hub::Hub;
use notification::{LoggingNotifier, NotificationService};
use persistence::{ConsumerStats, PersistenceConsumer};
use queue::{MemoryQueue, MessagePublisher};

/// A fully wired chat server: hub, persistence consumer, notification
/// workers and the HTTP router, sharing one shutdown token.
pub struct ChatServer {
    context: AppContext,
    router: Router,
    publisher: Arc<dyn MessagePublisher>,
    hub_task: JoinHandle<()>,
    consumer_task: Option<JoinHandle<ConsumerStats>>,
}

impl ChatServer {
    /// Wire every component against `store` and start the background tasks
    pub async fn build(config: Arc<Config>, store: Arc<dyn MessageStore>) -> Result<Self> {
        // Nothing would ever drain the in-process queue
        if queue::uses_memory_backend(&config.kafka) && !config.persistence_consumer_enabled {
            bail!(
                "PERSISTENCE_CONSUMER_ENABLED=false requires Kafka: the in-process queue \
                 is only drained by the in-process consumer"
            );
        }

        let shutdown = CancellationToken::new();
        let memory_queue = MemoryQueue::new();
        let publisher = queue::open_publisher(&config.kafka, &memory_queue)?;

        let notifications = config.notifications.enabled.then(|| {
            NotificationService::start(
                &config.notifications,
                Arc::new(LoggingNotifier::new(
                    notification::SIMULATED_SEND_DELAY,
                    config.logging.clone(),
                )),
            )
        });

        let mut hub = Hub::new(Arc::clone(&publisher), &config.hub, config.logging.clone());
        if let Some(notifications) = &notifications {
            hub = hub.with_notifications(notifications.clone());
        }

        let hub_task = {
            let hub = hub.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { hub.run(shutdown).await })
        };

        let consumer_task = if config.persistence_consumer_enabled {
            let subscriber = queue::open_subscriber(&config.kafka, &memory_queue).await?;
            let consumer = PersistenceConsumer::new(subscriber, Arc::clone(&store));
            Some(consumer.spawn(shutdown.clone()))
        } else {
            info!("Persistence consumer disabled, the topic is drained by persistence_worker");
            None
        };

        let context = AppContext::new(hub, store, config, notifications, shutdown);
        let router = routes::create_router(context.clone());

        Ok(Self {
            context,
            router,
            publisher,
            hub_task,
            consumer_task,
        })
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Token raised when the server begins shutting down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.context.shutdown.clone()
    }

    /// Serve HTTP/WebSocket traffic until `signal` resolves, then shut down.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.context.shutdown.clone();
        let trigger = {
            let token = token.clone();
            async move {
                tokio::select! {
                    _ = signal => {}
                    _ = token.cancelled() => {}
                }
                token.cancel();
            }
        };

        let server = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(trigger)
            .into_future();
        let grace = self.context.config.shutdown_timeout();

        let outcome = tokio::select! {
            result = server => result.context("Server error"),
            _ = async {
                token.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                warn!("Timeout waiting for connections to close");
                Ok(())
            }
        };

        self.shutdown().await;
        outcome
    }

    /// Stop background tasks: the hub closes every mailbox, the consumer
    /// finishes its current entry, notification workers drain, and the
    /// publisher flushes. Each wait is bounded.
    pub async fn shutdown(self) {
        let timeout = self.context.config.shutdown_timeout();
        self.context.shutdown.cancel();

        if tokio::time::timeout(timeout, self.hub_task).await.is_err() {
            warn!("Timeout waiting for hub to stop");
        }

        if let Some(consumer) = self.consumer_task {
            match tokio::time::timeout(timeout, consumer).await {
                Ok(Ok(stats)) => info!(persisted = stats.persisted, "Persistence consumer joined"),
                Ok(Err(e)) => warn!(error = %e, "Persistence consumer task failed"),
                Err(_) => warn!("Timeout waiting for persistence consumer to stop"),
            }
        }

        if let Some(notifications) = &self.context.notifications {
            notifications.shutdown().await;
        }

        if let Err(e) = self.publisher.flush(timeout).await {
            warn!(error = %e, "Failed to flush durable queue publisher");
        }

        info!("Chat server stopped");
    }
}

/// Resolves on SIGTERM or Ctrl-C
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, initiating graceful shutdown...");
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("SIGINT received, initiating graceful shutdown...");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, waiting for Ctrl-C only");
                tokio::signal::ctrl_c().await.ok();
                info!("Ctrl-C received, initiating graceful shutdown...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, initiating graceful shutdown...");
    }
}

/// Initialize tracing from `RUST_LOG`
pub fn init_tracing(rust_log: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run the chat server against PostgreSQL until SIGTERM/Ctrl-C
pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    info!("=== Chat Server Starting ===");
    info!("Port: {}", config.port);
    info!("Kafka Enabled: {}", config.kafka.enabled);
    info!("Consumer Ack Mode: {}", config.kafka.consumer_ack_mode.as_str());

    info!("Connecting to database...");
    let pool = chat_db::create_pool(&config.database_url, &config.db)
        .await
        .context("Failed to connect to database")?;
    chat_db::run_migrations(&pool).await?;
    info!("Database ready");

    let store: Arc<dyn MessageStore> = Arc::new(PgMessageStore::new(pool));
    let server = ChatServer::build(Arc::clone(&config), store).await?;

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .context("Failed to bind to address")?;
    info!("Chat server listening on {}", config.bind_address);

    server.serve(listener, shutdown_signal()).await
}
