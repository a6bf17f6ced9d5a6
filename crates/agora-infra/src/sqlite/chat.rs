//! SQLite message store implementation.
//!
//! Implements `MessageStore` from `agora-core` using sqlx with split
//! read/write pools. Each append is its own committed INSERT.

use agora_core::store::MessageStore;
use agora_types::chat::ChatEvent;
use agora_types::error::StoreError;
use agora_types::identity::Identity;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MessageStore`.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: DatabasePool,
}

impl SqliteMessageStore {
    /// Create a new store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

struct ChatEventRow {
    id: String,
    sender: String,
    body: String,
    created_at: String,
}

impl ChatEventRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            sender: row.try_get("sender")?,
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_event(self) -> Result<ChatEvent, StoreError> {
        let id = self
            .id
            .parse::<Uuid>()
            .map_err(|e| StoreError::Corrupt(format!("invalid UUID: {e}")))?;
        let sender = Identity::parse(&self.sender)
            .map_err(|e| StoreError::Corrupt(format!("invalid sender: {e}")))?;
        let timestamp = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Corrupt(format!("invalid datetime: {e}")))?;

        Ok(ChatEvent::from_parts(id, sender, self.body, timestamp))
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Connection(err.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

impl MessageStore for SqliteMessageStore {
    async fn append(&self, event: &ChatEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO chat_events (id, sender, body, created_at)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(event.id().to_string())
        .bind(event.sender().as_str())
        .bind(event.body())
        .bind(event.timestamp().to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<ChatEvent>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT id, sender, body, created_at FROM chat_events
               ORDER BY seq DESC
               LIMIT ?"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows.iter().rev() {
            let r = ChatEventRow::from_row(row).map_err(map_sqlx)?;
            events.push(r.into_event()?);
        }
        Ok(events)
    }
}
