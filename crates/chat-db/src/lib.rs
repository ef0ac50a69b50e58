//! # Chat Database
//!
//! Connection pooling and the message store used by the persistence consumer
//! (writes) and the history endpoint (reads).

mod memory;

pub use memory::MemoryMessageStore;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chat_config::DbConfig;
use chat_types::{Message, Pagination, UserId};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;
use uuid::Uuid;

/// Database connection pool type
pub type DbPool = Pool<Postgres>;

/// Create a PostgreSQL connection pool
pub async fn create_pool(database_url: &str, db_config: &DbConfig) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(db_config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            db_config.acquire_timeout_secs,
        ))
        .idle_timeout(Some(std::time::Duration::from_secs(
            db_config.idle_timeout_secs,
        )))
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    info!(
        max_connections = db_config.max_connections,
        "Database connection pool created"
    );
    Ok(pool)
}

/// Apply the embedded schema migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!()
        .run(pool)
        .await
        .context("Failed to apply database migrations")?;
    info!("Database migrations applied");
    Ok(())
}

/// Append-only message persistence with pairwise history reads.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message. Writing the same message id twice is a no-op, so
    /// at-least-once delivery from the queue is safe.
    async fn append(&self, message: &Message) -> Result<()>;

    /// Messages exchanged between `a` and `b` in either direction, most
    /// recent first.
    async fn history(&self, a: &UserId, b: &UserId, page: Pagination) -> Result<Vec<Message>>;

    /// Cheap liveness probe for health checks
    async fn ping(&self) -> Result<()>;
}

/// Message row from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Message {
            id: record.id,
            sender_id: record.sender_id.into(),
            receiver_id: record.receiver_id.into(),
            content: record.content,
            created_at: record.created_at,
        }
    }
}

/// PostgreSQL-backed message store
#[derive(Clone)]
pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(message.sender_id.as_uuid())
        .bind(message.receiver_id.as_uuid())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert message")?;

        Ok(())
    }

    async fn history(&self, a: &UserId, b: &UserId, page: Pagination) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, sender_id, receiver_id, content, created_at
            FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(a.as_uuid())
        .bind(b.as_uuid())
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch message history")?;

        Ok(records.into_iter().map(Message::from).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
