//! PostgreSQL implementation of AccountRepository.
//!
//! Every mutation is one guarded `UPDATE`; the guards mirror the rules on
//! `Account` so the database decides atomically whether a change applies.
//!
//! ```sql
//! CREATE TABLE accounts (
//!     id                     UUID PRIMARY KEY,
//!     user_id                TEXT NOT NULL UNIQUE,
//!     status                 TEXT NOT NULL,
//!     trial_ends_at          TIMESTAMPTZ NOT NULL,
//!     current_period_end     TIMESTAMPTZ,
//!     stripe_customer_id     TEXT UNIQUE,
//!     stripe_subscription_id TEXT,
//!     ai_credits_used        INTEGER NOT NULL DEFAULT 0,
//!     ai_credits_reset_at    TIMESTAMPTZ,
//!     subscription_synced_at TIMESTAMPTZ,
//!     created_at             TIMESTAMPTZ NOT NULL,
//!     updated_at             TIMESTAMPTZ NOT NULL
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{Account, SubscriptionDeletion, SubscriptionSnapshot, SubscriptionStatus};
use crate::domain::foundation::{AccountId, DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{AccountRepository, CreditUsage};

use super::db_error;

const ACCOUNT_COLUMNS: &str = r#"
    id, user_id, status, trial_ends_at, current_period_end, stripe_customer_id,
    stripe_subscription_id, ai_credits_used, ai_credits_reset_at, subscription_synced_at,
    created_at, updated_at
"#;

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Account>, DomainError> {
        let sql = format!("SELECT {} FROM accounts WHERE {} = $1", ACCOUNT_COLUMNS, column);
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("find account"))?;

        row.map(Account::try_from).transpose()
    }

    fn expect_one(rows_affected: u64, id: &AccountId) -> Result<(), DomainError> {
        if rows_affected == 0 {
            return Err(DomainError::new(
                ErrorCode::AccountNotFound,
                format!("Account not found: {}", id),
            ));
        }
        Ok(())
    }
}

/// Database row representation of an account.
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    user_id: String,
    status: String,
    trial_ends_at: DateTime<Utc>,
    current_period_end: Option<DateTime<Utc>>,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    ai_credits_used: i32,
    ai_credits_reset_at: Option<DateTime<Utc>>,
    subscription_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = DomainError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let status: SubscriptionStatus = row.status.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid status value: {}", e))
        })?;

        Ok(Account {
            id: AccountId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?,
            status,
            trial_ends_at: Timestamp::from_datetime(row.trial_ends_at),
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            ai_credits_used: u32::try_from(row.ai_credits_used).unwrap_or(0),
            ai_credits_reset_at: row.ai_credits_reset_at.map(Timestamp::from_datetime),
            subscription_synced_at: row.subscription_synced_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn to_db(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn provision(&self, account: &Account) -> Result<Account, DomainError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, user_id, status, trial_ends_at, current_period_end, stripe_customer_id,
                stripe_subscription_id, ai_credits_used, ai_credits_reset_at,
                subscription_synced_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, NULL, NULL, NULL, 0, NULL, NULL, $5, $5)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.user_id.as_str())
        .bind(account.status.as_str())
        .bind(account.trial_ends_at.as_datetime())
        .bind(account.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("provision account"))?;

        self.find_by_user_id(&account.user_id).await?.ok_or_else(|| {
            DomainError::database(format!("Account for {} vanished after insert", account.user_id))
        })
    }

    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Account>, DomainError> {
        self.find_one("user_id", user_id.as_str()).await
    }

    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Account>, DomainError> {
        self.find_one("stripe_customer_id", customer_id).await
    }

    async fn link_customer(&self, id: &AccountId, customer_id: &str) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE accounts SET stripe_customer_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(db_error("link customer"))?;

        Self::expect_one(result.rows_affected(), id)
    }

    async fn apply_subscription(
        &self,
        id: &AccountId,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<bool, DomainError> {
        // Newer event wins; on a tie the larger period end wins.
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                status = $2,
                current_period_end = COALESCE($3, current_period_end),
                stripe_subscription_id = $4,
                subscription_synced_at = $5,
                updated_at = NOW()
            WHERE id = $1
              AND (
                    subscription_synced_at IS NULL
                 OR subscription_synced_at < $5
                 OR (subscription_synced_at = $5
                     AND COALESCE($3::timestamptz, '-infinity'::timestamptz)
                         >= COALESCE(current_period_end, '-infinity'::timestamptz))
              )
            "#,
        )
        .bind(id.as_uuid())
        .bind(snapshot.status.as_str())
        .bind(to_db(snapshot.current_period_end))
        .bind(&snapshot.subscription_id)
        .bind(snapshot.observed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("apply subscription"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_deletion(
        &self,
        id: &AccountId,
        deletion: &SubscriptionDeletion,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                status = $2,
                current_period_end = COALESCE(current_period_end, $4),
                stripe_subscription_id = $3,
                subscription_synced_at = GREATEST(subscription_synced_at, $5),
                updated_at = NOW()
            WHERE id = $1
              AND (stripe_subscription_id IS NULL OR stripe_subscription_id = $3)
            "#,
        )
        .bind(id.as_uuid())
        .bind(SubscriptionStatus::Cancelled.as_str())
        .bind(&deletion.subscription_id)
        .bind(to_db(deletion.current_period_end))
        .bind(deletion.observed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("apply deletion"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_invoice_paid(&self, id: &AccountId, paid_at: Timestamp) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                status = $2,
                ai_credits_used = 0,
                ai_credits_reset_at = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(SubscriptionStatus::Active.as_str())
        .bind(paid_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("record invoice paid"))?;

        Self::expect_one(result.rows_affected(), id)
    }

    async fn mark_past_due(&self, id: &AccountId) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE accounts SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(SubscriptionStatus::PastDue.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error("mark past due"))?;

        Self::expect_one(result.rows_affected(), id)
    }

    async fn try_consume_ai_credit(
        &self,
        id: &AccountId,
        expected_status: SubscriptionStatus,
        limit: u32,
    ) -> Result<Option<CreditUsage>, DomainError> {
        let row: Option<(i32, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            UPDATE accounts SET
                ai_credits_used = ai_credits_used + 1,
                updated_at = NOW()
            WHERE id = $1 AND status = $2 AND ai_credits_used < $3
            RETURNING ai_credits_used, ai_credits_reset_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected_status.as_str())
        .bind(i32::try_from(limit).unwrap_or(i32::MAX))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("consume AI credit"))?;

        Ok(row.map(|(used, reset_at)| CreditUsage {
            used: u32::try_from(used).unwrap_or(0),
            reset_at: reset_at.map(Timestamp::from_datetime),
        }))
    }
}
