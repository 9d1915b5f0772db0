//! PostgreSQL implementation of WebhookEventRepository.
//!
//! ```sql
//! CREATE TABLE webhook_events (
//!     event_id      TEXT PRIMARY KEY,
//!     event_type    TEXT NOT NULL,
//!     status        TEXT NOT NULL,
//!     attempts      INTEGER NOT NULL DEFAULT 1,
//!     last_error    TEXT,
//!     payload       JSONB NOT NULL,
//!     first_seen_at TIMESTAMPTZ NOT NULL,
//!     updated_at    TIMESTAMPTZ NOT NULL
//! );
//! CREATE INDEX webhook_events_dead_lettered
//!     ON webhook_events (first_seen_at) WHERE status = 'dead_lettered';
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{DeliveryStatus, WebhookEventRecord, WebhookEventRepository};

use super::db_error;

const EVENT_COLUMNS: &str =
    "event_id, event_type, status, attempts, last_error, payload, first_seen_at, updated_at";

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    event_id: String,
    event_type: String,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    payload: serde_json::Value,
    first_seen_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        let status: DeliveryStatus = row.status.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid delivery status: {}", e))
        })?;

        Ok(WebhookEventRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            status,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_error: row.last_error,
            payload: row.payload,
            first_seen_at: Timestamp::from_datetime(row.first_seen_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let sql = format!("SELECT {} FROM webhook_events WHERE event_id = $1", EVENT_COLUMNS);
        let row: Option<WebhookEventRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find webhook event"))?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn record_outcome(&self, record: &WebhookEventRecord) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events (
                event_id, event_type, status, attempts, last_error, payload,
                first_seen_at, updated_at
            ) VALUES ($1, $2, $3, 1, $4, $5, $6, $7)
            ON CONFLICT (event_id) DO UPDATE SET
                status = EXCLUDED.status,
                last_error = EXCLUDED.last_error,
                payload = EXCLUDED.payload,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(record.status.as_str())
        .bind(&record.last_error)
        .bind(&record.payload)
        .bind(record.first_seen_at.as_datetime())
        .bind(record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("record webhook outcome"))?;

        Ok(())
    }

    async fn record_failure(&self, record: &WebhookEventRecord) -> Result<Option<u32>, DomainError> {
        // The WHERE clause leaves settled rows alone; RETURNING then yields nothing.
        let attempts: Option<(i32,)> = sqlx::query_as(
            r#"
            INSERT INTO webhook_events (
                event_id, event_type, status, attempts, last_error, payload,
                first_seen_at, updated_at
            ) VALUES ($1, $2, $3, 1, $4, $5, $6, $7)
            ON CONFLICT (event_id) DO UPDATE SET
                attempts = webhook_events.attempts + 1,
                last_error = EXCLUDED.last_error,
                updated_at = EXCLUDED.updated_at
            WHERE webhook_events.status = $3
            RETURNING attempts
            "#,
        )
        .bind(&record.event_id)
        .bind(&record.event_type)
        .bind(DeliveryStatus::Failed.as_str())
        .bind(&record.last_error)
        .bind(&record.payload)
        .bind(record.first_seen_at.as_datetime())
        .bind(record.updated_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("record webhook failure"))?;

        Ok(attempts.map(|(n,)| u32::try_from(n).unwrap_or(0)))
    }

    async fn mark_dead_lettered(&self, event_id: &str) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE webhook_events SET status = $2, updated_at = NOW()
            WHERE event_id = $1 AND status = $3
            "#,
        )
        .bind(event_id)
        .bind(DeliveryStatus::DeadLettered.as_str())
        .bind(DeliveryStatus::Failed.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("dead-letter webhook event"))?;

        Ok(())
    }

    async fn list_dead_lettered(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError> {
        let sql = format!(
            "SELECT {} FROM webhook_events WHERE status = $1 ORDER BY first_seen_at LIMIT $2",
            EVENT_COLUMNS
        );
        let rows: Vec<WebhookEventRow> = sqlx::query_as(&sql)
            .bind(DeliveryStatus::DeadLettered.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list dead-lettered events"))?;

        rows.into_iter().map(WebhookEventRecord::try_from).collect()
    }
}
