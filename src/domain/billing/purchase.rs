//! One-time purchase of a resume export right.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{PurchaseId, ResumeId, Timestamp, UserId, ValidationError};

/// Lifecycle of a purchase. Moves one way only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    /// Checkout finished but the payment is still settling.
    Pending,
    Completed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            "completed" => Ok(PurchaseStatus::Completed),
            other => Err(ValidationError::unknown_value("purchase_status", other)),
        }
    }
}

/// A per-resume purchase, unique by Stripe payment intent.
///
/// Once `Completed`, a purchase is never modified again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: PurchaseId,
    pub user_id: UserId,
    pub resume_id: ResumeId,
    pub payment_intent_id: String,
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
    pub status: PurchaseStatus,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Purchase {
    pub fn pending(
        user_id: UserId,
        resume_id: ResumeId,
        payment_intent_id: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: PurchaseId::new(),
            user_id,
            resume_id,
            payment_intent_id: payment_intent_id.into(),
            amount,
            currency: currency.into(),
            status: PurchaseStatus::Pending,
            created_at,
            completed_at: None,
        }
    }

    /// Marks the purchase completed. Returns `false` if it already was.
    pub fn complete(&mut self, at: Timestamp) -> bool {
        if self.status == PurchaseStatus::Completed {
            return false;
        }
        self.status = PurchaseStatus::Completed;
        self.completed_at = Some(at);
        true
    }

    /// Builder-style variant of [`Purchase::complete`].
    pub fn completed(mut self, at: Timestamp) -> Self {
        self.complete(at);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == PurchaseStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase() -> Purchase {
        Purchase::pending(
            UserId::new("user-1").unwrap(),
            ResumeId::new(),
            "pi_123",
            499,
            "usd",
            Timestamp::from_unix_secs(1_000).unwrap(),
        )
    }

    #[test]
    fn new_purchase_is_pending() {
        let purchase = purchase();
        assert_eq!(purchase.status, PurchaseStatus::Pending);
        assert!(purchase.completed_at.is_none());
    }

    #[test]
    fn completion_is_one_way_and_idempotent() {
        let mut purchase = purchase();
        let first = Timestamp::from_unix_secs(2_000).unwrap();
        let second = Timestamp::from_unix_secs(3_000).unwrap();

        assert!(purchase.complete(first));
        assert!(!purchase.complete(second));
        assert_eq!(purchase.completed_at, Some(first));
        assert!(purchase.is_completed());
    }

    #[test]
    fn status_parses_stored_form() {
        assert_eq!("completed".parse::<PurchaseStatus>().unwrap(), PurchaseStatus::Completed);
        assert!("refunded".parse::<PurchaseStatus>().is_err());
    }
}
