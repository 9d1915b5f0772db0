//! Purchasable price options.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What the user is buying at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Monthly,
    Yearly,
    /// One-time export right for a single resume.
    PerCv,
}

/// Stripe Checkout mode a price is sold under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Subscription,
    Payment,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Subscription => "subscription",
            CheckoutMode::Payment => "payment",
        }
    }
}

impl PriceType {
    pub fn checkout_mode(&self) -> CheckoutMode {
        match self {
            PriceType::Monthly | PriceType::Yearly => CheckoutMode::Subscription,
            PriceType::PerCv => CheckoutMode::Payment,
        }
    }

    pub fn requires_resume(&self) -> bool {
        matches!(self, PriceType::PerCv)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceType::Monthly => "monthly",
            PriceType::Yearly => "yearly",
            PriceType::PerCv => "per_cv",
        }
    }
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_client_contract() {
        let parsed: PriceType = serde_json::from_str("\"per_cv\"").unwrap();
        assert_eq!(parsed, PriceType::PerCv);
        assert!(serde_json::from_str::<PriceType>("\"lifetime\"").is_err());
    }

    #[test]
    fn only_per_cv_is_a_one_time_payment() {
        assert_eq!(PriceType::PerCv.checkout_mode(), CheckoutMode::Payment);
        assert_eq!(PriceType::Monthly.checkout_mode(), CheckoutMode::Subscription);
        assert_eq!(PriceType::Yearly.checkout_mode(), CheckoutMode::Subscription);
        assert!(PriceType::PerCv.requires_resume());
        assert!(!PriceType::Yearly.requires_resume());
    }
}
