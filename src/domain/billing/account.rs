//! Account aggregate.
//!
//! One account per principal, created on first authenticated contact and
//! never deleted by this crate. Status changes come only from reconciled
//! Stripe events; the entitlement calculator reads but never writes it.
//!
//! The mutators here are the reference semantics for the conditional
//! updates the storage adapters perform. The in-memory adapter calls them
//! directly under its lock; the Postgres adapter expresses the same guards
//! in `UPDATE ... WHERE` clauses.

use serde::{Deserialize, Serialize};

use super::entitlement::{AccessDecision, EntitlementPolicy};
use super::quota::{CreditBalance, QuotaPolicy};
use super::status::SubscriptionStatus;
use crate::domain::foundation::{AccountId, Timestamp, UserId};

/// Length of the free trial granted at provisioning.
pub const DEFAULT_TRIAL_DAYS: i64 = 14;

/// Billing account for a single principal.
///
/// # Invariants
///
/// - `user_id` is unique across accounts
/// - `trial_ends_at` is written once, at provisioning
/// - `subscription_synced_at` only moves forward
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub status: SubscriptionStatus,
    pub trial_ends_at: Timestamp,

    /// End of the current paid period; `None` until a subscription was seen.
    pub current_period_end: Option<Timestamp>,

    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,

    pub ai_credits_used: u32,
    pub ai_credits_reset_at: Option<Timestamp>,

    /// `created` time of the newest subscription event applied so far.
    pub subscription_synced_at: Option<Timestamp>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// State carried by a `customer.subscription.created/updated` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<Timestamp>,
    /// The event's own `created` time, not the time it was received.
    pub observed_at: Timestamp,
}

impl SubscriptionSnapshot {
    /// Whether this snapshot is newer than what the account already holds.
    ///
    /// Ordered by event time; on a tie the later period end wins, so any
    /// delivery order converges to the same stored state.
    pub fn supersedes(
        &self,
        synced_at: Option<Timestamp>,
        stored_period_end: Option<Timestamp>,
    ) -> bool {
        match synced_at {
            None => true,
            Some(watermark) if self.observed_at > watermark => true,
            Some(watermark) if self.observed_at == watermark => {
                self.current_period_end >= stored_period_end
            }
            Some(_) => false,
        }
    }
}

/// State carried by a `customer.subscription.deleted` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionDeletion {
    pub subscription_id: String,
    pub current_period_end: Option<Timestamp>,
    pub observed_at: Timestamp,
}

impl Account {
    /// Creates a trial account for a first-time principal.
    pub fn provision(user_id: UserId, now: Timestamp, trial_days: i64) -> Self {
        Self {
            id: AccountId::new(),
            user_id,
            status: SubscriptionStatus::Trial,
            trial_ends_at: now.plus_days(trial_days),
            current_period_end: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            ai_credits_used: 0,
            ai_credits_reset_at: None,
            subscription_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn access_decision(&self, now: Timestamp, policy: &EntitlementPolicy) -> AccessDecision {
        AccessDecision::evaluate(
            self.status,
            self.trial_ends_at,
            self.current_period_end,
            now,
            policy,
        )
    }

    pub fn credit_balance(&self, policy: &QuotaPolicy) -> CreditBalance {
        CreditBalance::new(
            policy.limit_for(self.status),
            self.ai_credits_used,
            self.ai_credits_reset_at,
        )
    }

    pub fn link_customer(&mut self, customer_id: impl Into<String>) {
        self.stripe_customer_id = Some(customer_id.into());
        self.updated_at = Timestamp::now();
    }

    /// Applies a subscription snapshot if it supersedes the stored one.
    ///
    /// Returns `false` for stale or duplicate snapshots.
    pub fn apply_subscription(&mut self, snapshot: &SubscriptionSnapshot) -> bool {
        if !snapshot.supersedes(self.subscription_synced_at, self.current_period_end) {
            return false;
        }
        self.status = snapshot.status;
        if snapshot.current_period_end.is_some() {
            self.current_period_end = snapshot.current_period_end;
        }
        self.stripe_subscription_id = Some(snapshot.subscription_id.clone());
        self.subscription_synced_at = Some(snapshot.observed_at);
        self.updated_at = Timestamp::now();
        true
    }

    /// Cancels the account's subscription, keeping the paid period end so
    /// the wind-down window stays open.
    ///
    /// Returns `false` when the deletion refers to a subscription that has
    /// already been replaced by a newer one.
    pub fn apply_deletion(&mut self, deletion: &SubscriptionDeletion) -> bool {
        if let Some(current) = &self.stripe_subscription_id {
            if current != &deletion.subscription_id {
                return false;
            }
        }
        self.status = SubscriptionStatus::Cancelled;
        if self.current_period_end.is_none() {
            self.current_period_end = deletion.current_period_end;
        }
        self.stripe_subscription_id = Some(deletion.subscription_id.clone());
        self.subscription_synced_at = Some(match self.subscription_synced_at {
            Some(watermark) if watermark > deletion.observed_at => watermark,
            _ => deletion.observed_at,
        });
        self.updated_at = Timestamp::now();
        true
    }

    /// A subscription invoice was paid: the account is current again and
    /// starts a fresh AI credit cycle.
    pub fn record_invoice_paid(&mut self, paid_at: Timestamp) {
        self.status = SubscriptionStatus::Active;
        self.ai_credits_used = 0;
        self.ai_credits_reset_at = Some(paid_at);
        self.updated_at = Timestamp::now();
    }

    pub fn mark_past_due(&mut self) {
        self.status = SubscriptionStatus::PastDue;
        self.updated_at = Timestamp::now();
    }

    /// Conditional increment of the AI counter.
    ///
    /// Succeeds only if the status is still `expected_status` and the
    /// counter is below `limit`. Returns the incremented counter.
    pub fn try_consume_ai_credit(
        &mut self,
        expected_status: SubscriptionStatus,
        limit: u32,
    ) -> Option<u32> {
        if self.status != expected_status || self.ai_credits_used >= limit {
            return None;
        }
        self.ai_credits_used += 1;
        self.updated_at = Timestamp::now();
        Some(self.ai_credits_used)
    }
}
