//! Billing rules configuration

use serde::Deserialize;
use std::time::Duration;

use crate::domain::billing::{EntitlementPolicy, QuotaPolicy};

use super::error::ValidationError;

/// Trial, grace, quota and webhook-processing settings
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Length of the free trial granted on first contact
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,

    /// Degraded-access days after a past-due period ends
    #[serde(default = "default_past_due_grace_days")]
    pub past_due_grace_days: i64,

    #[serde(default = "default_trial_ai_credits")]
    pub trial_ai_credits: u32,

    #[serde(default = "default_paid_ai_credits")]
    pub active_ai_credits: u32,

    #[serde(default = "default_paid_ai_credits")]
    pub past_due_ai_credits: u32,

    /// Maximum age of a webhook signature timestamp
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: i64,

    /// Time budget for reconciling one webhook delivery
    #[serde(default = "default_handler_timeout")]
    pub webhook_handler_timeout_secs: u64,

    /// Failed deliveries of one event before it is dead-lettered
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
}

impl BillingConfig {
    pub fn entitlement_policy(&self) -> EntitlementPolicy {
        EntitlementPolicy {
            past_due_grace_days: self.past_due_grace_days,
        }
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            trial_limit: self.trial_ai_credits,
            active_limit: self.active_ai_credits,
            past_due_limit: self.past_due_ai_credits,
        }
    }

    pub fn webhook_handler_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_handler_timeout_secs)
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.trial_days < 0 || self.past_due_grace_days < 0 {
            return Err(ValidationError::NegativeDuration);
        }
        if self.signature_tolerance_secs <= 0 {
            return Err(ValidationError::InvalidSignatureTolerance);
        }
        if self.webhook_handler_timeout_secs == 0 || self.webhook_handler_timeout_secs > 30 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.max_delivery_attempts == 0 {
            return Err(ValidationError::InvalidDeliveryAttempts);
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            trial_days: default_trial_days(),
            past_due_grace_days: default_past_due_grace_days(),
            trial_ai_credits: default_trial_ai_credits(),
            active_ai_credits: default_paid_ai_credits(),
            past_due_ai_credits: default_paid_ai_credits(),
            signature_tolerance_secs: default_signature_tolerance(),
            webhook_handler_timeout_secs: default_handler_timeout(),
            max_delivery_attempts: default_max_delivery_attempts(),
        }
    }
}

fn default_trial_days() -> i64 {
    14
}

fn default_past_due_grace_days() -> i64 {
    7
}

fn default_trial_ai_credits() -> u32 {
    10
}

fn default_paid_ai_credits() -> u32 {
    50
}

fn default_signature_tolerance() -> i64 {
    300
}

fn default_handler_timeout() -> u64 {
    10
}

fn default_max_delivery_attempts() -> u32 {
    8
}
