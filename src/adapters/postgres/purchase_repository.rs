//! PostgreSQL implementation of PurchaseRepository and ResumeCatalog.
//!
//! ```sql
//! CREATE TABLE purchases (
//!     id                UUID PRIMARY KEY,
//!     user_id           TEXT NOT NULL,
//!     resume_id         UUID NOT NULL REFERENCES resumes (id),
//!     payment_intent_id TEXT NOT NULL UNIQUE,
//!     amount            BIGINT NOT NULL,
//!     currency          TEXT NOT NULL,
//!     status            TEXT NOT NULL,
//!     created_at        TIMESTAMPTZ NOT NULL,
//!     completed_at      TIMESTAMPTZ
//! );
//!
//! CREATE TABLE settled_payment_intents (
//!     payment_intent_id TEXT PRIMARY KEY,
//!     settled_at        TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! `record_pending` and `complete_pending` take a transaction-scoped advisory
//! lock on the payment intent, so a settlement and the checkout that records
//! the purchase cannot both miss each other.
//!
//! `resumes` belongs to the editor service; only `id`, `user_id` and
//! `purchased` are touched here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::{Purchase, PurchaseStatus};
use crate::domain::foundation::{DomainError, ErrorCode, ResumeId, Timestamp, UserId};
use crate::ports::{
    CompletionOutcome, PendingOutcome, PurchaseRepository, ResumeCatalog, ResumeRecord,
};

use super::db_error;

pub struct PostgresPurchaseRepository {
    pool: PgPool,
}

impl PostgresPurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Sets the purchased flag inside `tx`; fails if the resume does not exist.
async fn mark_resume_purchased(
    tx: &mut Transaction<'_, Postgres>,
    resume_id: &ResumeId,
) -> Result<(), DomainError> {
    let result = sqlx::query("UPDATE resumes SET purchased = TRUE WHERE id = $1")
        .bind(resume_id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(db_error("mark resume purchased"))?;

    if result.rows_affected() == 0 {
        return Err(DomainError::new(
            ErrorCode::ResumeNotFound,
            format!("Resume not found: {}", resume_id),
        ));
    }
    Ok(())
}

/// Serializes writers for one payment intent until `tx` ends.
async fn lock_payment_intent(
    tx: &mut Transaction<'_, Postgres>,
    payment_intent_id: &str,
) -> Result<(), DomainError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(payment_intent_id)
        .execute(&mut **tx)
        .await
        .map_err(db_error("lock payment intent"))?;
    Ok(())
}

#[async_trait]
impl PurchaseRepository for PostgresPurchaseRepository {
    async fn complete(&self, purchase: &Purchase) -> Result<CompletionOutcome, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;

        // Dropping `tx` on the error path rolls back.
        mark_resume_purchased(&mut tx, &purchase.resume_id).await?;

        let completed_at = purchase.completed_at.unwrap_or_else(Timestamp::now);
        let changed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO purchases (
                id, user_id, resume_id, payment_intent_id, amount, currency,
                status, created_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payment_intent_id) DO UPDATE SET
                status = EXCLUDED.status,
                completed_at = EXCLUDED.completed_at
            WHERE purchases.status <> EXCLUDED.status
            RETURNING id
            "#,
        )
        .bind(purchase.id.as_uuid())
        .bind(purchase.user_id.as_str())
        .bind(purchase.resume_id.as_uuid())
        .bind(&purchase.payment_intent_id)
        .bind(purchase.amount)
        .bind(&purchase.currency)
        .bind(PurchaseStatus::Completed.as_str())
        .bind(purchase.created_at.as_datetime())
        .bind(completed_at.as_datetime())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("upsert completed purchase"))?;

        tx.commit().await.map_err(db_error("commit purchase"))?;

        Ok(match changed {
            Some(_) => CompletionOutcome::Completed,
            None => CompletionOutcome::AlreadyCompleted,
        })
    }

    async fn record_pending(&self, purchase: &Purchase) -> Result<PendingOutcome, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;
        lock_payment_intent(&mut tx, &purchase.payment_intent_id).await?;

        let settled: Option<(DateTime<Utc>,)> = sqlx::query_as(
            "SELECT settled_at FROM settled_payment_intents WHERE payment_intent_id = $1",
        )
        .bind(&purchase.payment_intent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("find settled payment intent"))?;
        let settled_at = settled.map(|(at,)| at);
        let status = match settled_at {
            Some(_) => PurchaseStatus::Completed,
            None => PurchaseStatus::Pending,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO purchases (
                id, user_id, resume_id, payment_intent_id, amount, currency,
                status, created_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (payment_intent_id) DO NOTHING
            "#,
        )
        .bind(purchase.id.as_uuid())
        .bind(purchase.user_id.as_str())
        .bind(purchase.resume_id.as_uuid())
        .bind(&purchase.payment_intent_id)
        .bind(purchase.amount)
        .bind(&purchase.currency)
        .bind(status.as_str())
        .bind(purchase.created_at.as_datetime())
        .bind(settled_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_foreign_key_violation() {
                    return DomainError::new(ErrorCode::ResumeNotFound, "Resume not found");
                }
            }
            db_error("record pending purchase")(e)
        })?;

        if result.rows_affected() == 0 {
            return Ok(PendingOutcome::AlreadyRecorded);
        }
        if settled_at.is_none() {
            tx.commit().await.map_err(db_error("commit purchase"))?;
            return Ok(PendingOutcome::Recorded);
        }

        mark_resume_purchased(&mut tx, &purchase.resume_id).await?;
        sqlx::query("DELETE FROM settled_payment_intents WHERE payment_intent_id = $1")
            .bind(&purchase.payment_intent_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("clear settled payment intent"))?;
        tx.commit().await.map_err(db_error("commit purchase"))?;

        Ok(PendingOutcome::CompletedOnArrival)
    }

    async fn complete_pending(
        &self,
        payment_intent_id: &str,
        completed_at: Timestamp,
    ) -> Result<Option<CompletionOutcome>, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;
        lock_payment_intent(&mut tx, payment_intent_id).await?;

        let current: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT resume_id, status FROM purchases WHERE payment_intent_id = $1 FOR UPDATE",
        )
        .bind(payment_intent_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("lock purchase"))?;

        let Some((resume_uuid, status)) = current else {
            sqlx::query(
                r#"
                INSERT INTO settled_payment_intents (payment_intent_id, settled_at)
                VALUES ($1, $2)
                ON CONFLICT (payment_intent_id) DO NOTHING
                "#,
            )
            .bind(payment_intent_id)
            .bind(completed_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(db_error("record settled payment intent"))?;
            tx.commit().await.map_err(db_error("commit settlement"))?;
            return Ok(None);
        };
        let resume_id = ResumeId::from_uuid(resume_uuid);

        let outcome = if status == PurchaseStatus::Completed.as_str() {
            CompletionOutcome::AlreadyCompleted
        } else {
            sqlx::query(
                "UPDATE purchases SET status = $2, completed_at = $3 WHERE payment_intent_id = $1",
            )
            .bind(payment_intent_id)
            .bind(PurchaseStatus::Completed.as_str())
            .bind(completed_at.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(db_error("complete pending purchase"))?;
            CompletionOutcome::Completed
        };

        mark_resume_purchased(&mut tx, &resume_id).await?;
        tx.commit().await.map_err(db_error("commit purchase"))?;

        Ok(Some(outcome))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Resume catalog
// ════════════════════════════════════════════════════════════════════════════════

pub struct PostgresResumeCatalog {
    pool: PgPool,
}

impl PostgresResumeCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResumeCatalog for PostgresResumeCatalog {
    async fn find(&self, id: &ResumeId) -> Result<Option<ResumeRecord>, DomainError> {
        let row: Option<(Uuid, String, bool)> =
            sqlx::query_as("SELECT id, user_id, purchased FROM resumes WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("find resume"))?;

        row.map(|(id, owner, purchased)| {
            Ok(ResumeRecord {
                id: ResumeId::from_uuid(id),
                owner: UserId::new(owner).map_err(|e| {
                    DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
                })?,
                purchased,
            })
        })
        .transpose()
    }
}
