//! AI credit limits.

use serde::Serialize;

use super::status::SubscriptionStatus;
use crate::domain::foundation::Timestamp;

/// Per-status AI generation allowance for one billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub trial_limit: u32,
    pub active_limit: u32,
    pub past_due_limit: u32,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            trial_limit: 10,
            active_limit: 50,
            past_due_limit: 50,
        }
    }
}

impl QuotaPolicy {
    /// Credit ceiling for an account in `status`. Cancelled accounts get none.
    pub fn limit_for(&self, status: SubscriptionStatus) -> u32 {
        match status {
            SubscriptionStatus::Trial => self.trial_limit,
            SubscriptionStatus::Active => self.active_limit,
            SubscriptionStatus::PastDue => self.past_due_limit,
            SubscriptionStatus::Cancelled => 0,
        }
    }
}

/// Snapshot of an account's AI credit usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditBalance {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub reset_at: Option<Timestamp>,
}

impl CreditBalance {
    pub fn new(limit: u32, used: u32, reset_at: Option<Timestamp>) -> Self {
        Self {
            limit,
            used,
            remaining: limit.saturating_sub(used),
            reset_at,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
