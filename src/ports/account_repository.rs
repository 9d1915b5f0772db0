//! AccountRepository port - persistence for billing accounts.
//!
//! Every mutating method is a single conditional update. Reconciliation
//! never reads an account, changes it in memory and writes it back, so
//! concurrent deliveries for the same account cannot lose each other's
//! writes.

use async_trait::async_trait;

use crate::domain::billing::{Account, SubscriptionDeletion, SubscriptionSnapshot, SubscriptionStatus};
use crate::domain::foundation::{AccountId, DomainError, Timestamp, UserId};

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Inserts `account` unless the principal already has one.
    ///
    /// Returns the stored account: either `account` itself or the existing
    /// row, which is never modified.
    async fn provision(&self, account: &Account) -> Result<Account, DomainError>;

    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Account>, DomainError>;

    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Account>, DomainError>;

    /// Records the Stripe customer created for this account.
    async fn link_customer(&self, id: &AccountId, customer_id: &str) -> Result<(), DomainError>;

    /// Applies `snapshot` if it supersedes the stored subscription state.
    ///
    /// Returns `false` when the snapshot is stale or a duplicate.
    async fn apply_subscription(
        &self,
        id: &AccountId,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<bool, DomainError>;

    /// Marks the subscription cancelled, preserving the stored period end.
    ///
    /// Returns `false` when the deleted subscription is no longer the
    /// account's current one.
    async fn apply_deletion(
        &self,
        id: &AccountId,
        deletion: &SubscriptionDeletion,
    ) -> Result<bool, DomainError>;

    /// Sets ACTIVE and resets the AI counter to zero as of `paid_at`.
    async fn record_invoice_paid(&self, id: &AccountId, paid_at: Timestamp) -> Result<(), DomainError>;

    async fn mark_past_due(&self, id: &AccountId) -> Result<(), DomainError>;

    /// Increments the AI counter only if the account still has
    /// `expected_status` and its counter is below `limit`.
    ///
    /// Returns the counter as written by this increment, or `None` if the
    /// guard did not hold.
    async fn try_consume_ai_credit(
        &self,
        id: &AccountId,
        expected_status: SubscriptionStatus,
        limit: u32,
    ) -> Result<Option<CreditUsage>, DomainError>;
}

/// AI counter state produced by one successful increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditUsage {
    pub used: u32,
    pub reset_at: Option<Timestamp>,
}
