//! Entitlement calculator.
//!
//! Derives what an account may do right now from its stored status and
//! timestamps. Everything here is a pure function of its inputs: no I/O,
//! no clock reads, no caching. Callers pass `now` explicitly and must
//! re-evaluate on every request.

use serde::{Deserialize, Serialize};

use super::status::SubscriptionStatus;
use crate::domain::foundation::Timestamp;

const SECONDS_PER_DAY: i64 = 86_400;

/// Coarse access tier reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Paid and current.
    Full,
    /// Time-limited access: free trial, past-due grace, or cancelled wind-down.
    Trial,
    /// Every window has closed.
    Expired,
    /// The principal has no account.
    None,
}

/// Tunable windows used by the calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementPolicy {
    /// Days of degraded access after the paid period of a past-due account ends.
    pub past_due_grace_days: i64,
}

impl Default for EntitlementPolicy {
    fn default() -> Self {
        Self {
            past_due_grace_days: 7,
        }
    }
}

/// Capabilities granted at a moment in time. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub level: AccessLevel,
    pub days_remaining: u32,
    pub can_edit: bool,
    pub can_export: bool,
    pub can_use_ai: bool,
}

impl AccessDecision {
    /// Evaluates the access table, first matching row wins:
    ///
    /// | status    | condition                     | level   | edit | export | ai  |
    /// |-----------|-------------------------------|---------|------|--------|-----|
    /// | ACTIVE    | -                             | full    | yes  | yes    | yes |
    /// | TRIAL     | now < trial end               | trial   | yes  | yes    | yes |
    /// | PAST_DUE  | now < period end + grace      | trial   | yes  | no     | no  |
    /// | CANCELLED | now < period end              | trial   | yes  | yes    | yes |
    /// | otherwise |                               | expired | no   | no     | no  |
    ///
    /// A missing period end fails the PAST_DUE and CANCELLED rows.
    pub fn evaluate(
        status: SubscriptionStatus,
        trial_ends_at: Timestamp,
        current_period_end: Option<Timestamp>,
        now: Timestamp,
        policy: &EntitlementPolicy,
    ) -> Self {
        match status {
            SubscriptionStatus::Active => Self::full(),
            SubscriptionStatus::Trial if now < trial_ends_at => {
                Self::window(days_until(now, trial_ends_at), true)
            }
            SubscriptionStatus::PastDue => match current_period_end {
                Some(period_end) => {
                    let grace_ends_at = period_end.plus_days(policy.past_due_grace_days);
                    if now < grace_ends_at {
                        Self::window(days_until(now, grace_ends_at), false)
                    } else {
                        Self::expired()
                    }
                }
                None => Self::expired(),
            },
            SubscriptionStatus::Cancelled => match current_period_end {
                Some(period_end) if now < period_end => {
                    Self::window(days_until(now, period_end), true)
                }
                _ => Self::expired(),
            },
            SubscriptionStatus::Trial => Self::expired(),
        }
    }

    pub fn full() -> Self {
        Self {
            level: AccessLevel::Full,
            days_remaining: 0,
            can_edit: true,
            can_export: true,
            can_use_ai: true,
        }
    }

    pub fn expired() -> Self {
        Self {
            level: AccessLevel::Expired,
            days_remaining: 0,
            can_edit: false,
            can_export: false,
            can_use_ai: false,
        }
    }

    /// Decision for a principal that has never been provisioned.
    pub fn none() -> Self {
        Self {
            level: AccessLevel::None,
            ..Self::expired()
        }
    }

    /// Trial-level access; `complete == false` is the degraded grace variant.
    fn window(days_remaining: u32, complete: bool) -> Self {
        Self {
            level: AccessLevel::Trial,
            days_remaining,
            can_edit: true,
            can_export: complete,
            can_use_ai: complete,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.level == AccessLevel::Expired
    }
}

/// Whole days from `now` until `end`, rounded up. Zero once `end` has passed.
fn days_until(now: Timestamp, end: Timestamp) -> u32 {
    let secs = end.duration_since(&now).num_seconds();
    if secs <= 0 {
        return 0;
    }
    let days = (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}
