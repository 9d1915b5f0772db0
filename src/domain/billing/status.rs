//! Stored subscription status of an account.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Persisted subscription state.
///
/// "Expired" and "no access" are never stored; they are derived by the
/// entitlement calculator from this status and the account's timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    /// Maps a Stripe subscription status onto the local enum.
    ///
    /// `incomplete`, `trialing` and any status Stripe adds later count as
    /// active; only delinquency and termination are distinguished.
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" | "unpaid" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "TRIAL",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::PastDue => "PAST_DUE",
            SubscriptionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRIAL" => Ok(SubscriptionStatus::Trial),
            "ACTIVE" => Ok(SubscriptionStatus::Active),
            "PAST_DUE" => Ok(SubscriptionStatus::PastDue),
            "CANCELLED" => Ok(SubscriptionStatus::Cancelled),
            other => Err(ValidationError::unknown_value("status", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_past_due_maps_to_past_due() {
        assert_eq!(SubscriptionStatus::from_stripe("past_due"), SubscriptionStatus::PastDue);
    }

    #[test]
    fn stripe_canceled_and_unpaid_map_to_cancelled() {
        assert_eq!(SubscriptionStatus::from_stripe("canceled"), SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::from_stripe("unpaid"), SubscriptionStatus::Cancelled);
    }

    #[test]
    fn any_other_stripe_status_maps_to_active() {
        for status in ["active", "trialing", "incomplete", "paused", "something_new"] {
            assert_eq!(SubscriptionStatus::from_stripe(status), SubscriptionStatus::Active);
        }
    }

    #[test]
    fn stored_form_round_trips() {
        for status in [
            SubscriptionStatus::Trial,
            SubscriptionStatus::Active,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_stored_form_is_rejected() {
        assert!("EXPIRED".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn serializes_in_screaming_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"PAST_DUE\"");
    }
}
