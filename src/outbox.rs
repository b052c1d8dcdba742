//! Outbox - transactional event fan-out
//!
//! Trade events are enqueued inside the settlement transaction, so an event
//! exists iff its trade committed. Draining and publishing is the external
//! consumer's job; `fetch_unpublished`/`mark_published` are its hooks.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct OutboxEvent {
    pub id: i64,
    pub topic: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

pub struct Outbox;

impl Outbox {
    pub async fn enqueue(
        tx: &mut Transaction<'_, Postgres>,
        topic: &str,
        payload: &serde_json::Value,
    ) -> Result<(), EngineError> {
        sqlx::query(r#"INSERT INTO outbox (topic, payload) VALUES ($1, $2)"#)
            .bind(topic)
            .bind(payload)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn fetch_unpublished(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>, EngineError> {
        let rows = sqlx::query(
            r#"SELECT id, topic, payload, created_at
               FROM outbox
               WHERE published_at IS NULL
               ORDER BY id ASC
               LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| OutboxEvent {
                id: r.get("id"),
                topic: r.get("topic"),
                payload: r.get("payload"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    pub async fn mark_published(pool: &PgPool, id: i64) -> Result<(), EngineError> {
        sqlx::query(r#"UPDATE outbox SET published_at = NOW() WHERE id = $1"#)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
