//! Payment configuration

use serde::Deserialize;

use crate::adapters::stripe::StripeConfig;
use crate::application::handlers::billing::CheckoutCatalog;

use super::error::ValidationError;

/// Payment configuration (Stripe)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentConfig {
    /// Stripe API key
    pub stripe_api_key: String,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,

    /// Stripe price ID for the monthly plan
    pub stripe_monthly_price_id: String,

    /// Stripe price ID for the yearly plan
    pub stripe_yearly_price_id: String,

    /// Stripe price ID for a single resume purchase
    pub stripe_per_cv_price_id: String,

    /// Where Stripe sends the user after a completed checkout
    #[serde(default = "default_success_url")]
    pub checkout_success_url: String,

    /// Where Stripe sends the user after an abandoned checkout
    #[serde(default = "default_cancel_url")]
    pub checkout_cancel_url: String,

    /// Override for the Stripe API host (stripe-mock in tests)
    pub stripe_api_base_url: Option<String>,

    /// Acknowledge and drop test-mode events
    #[serde(default)]
    pub require_livemode: bool,
}

impl PaymentConfig {
    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_test_")
    }

    /// Check if using Stripe live mode
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.starts_with("sk_live_")
    }

    /// Secrets wrapped for the Stripe adapter.
    pub fn stripe_config(&self) -> StripeConfig {
        let config = StripeConfig::new(
            self.stripe_api_key.clone(),
            self.stripe_webhook_secret.clone(),
        );
        match &self.stripe_api_base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }

    pub fn checkout_catalog(&self) -> CheckoutCatalog {
        CheckoutCatalog {
            monthly_price_id: self.stripe_monthly_price_id.clone(),
            yearly_price_id: self.stripe_yearly_price_id.clone(),
            per_cv_price_id: self.stripe_per_cv_price_id.clone(),
            success_url: self.checkout_success_url.clone(),
            cancel_url: self.checkout_cancel_url.clone(),
        }
    }

    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe_api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if self.stripe_webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_WEBHOOK_SECRET"));
        }

        // Verify key prefixes for safety
        if !self.stripe_api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.stripe_webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }

        for (name, price_id) in [
            ("STRIPE_MONTHLY_PRICE_ID", &self.stripe_monthly_price_id),
            ("STRIPE_YEARLY_PRICE_ID", &self.stripe_yearly_price_id),
            ("STRIPE_PER_CV_PRICE_ID", &self.stripe_per_cv_price_id),
        ] {
            if price_id.is_empty() {
                return Err(ValidationError::MissingRequired(name));
            }
            if !price_id.starts_with("price_") {
                return Err(ValidationError::InvalidPriceId(name));
            }
        }

        for url in [&self.checkout_success_url, &self.checkout_cancel_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::InvalidRedirectUrl);
            }
        }

        Ok(())
    }
}

fn default_success_url() -> String {
    "http://localhost:5173/billing/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:5173/billing/cancel".to_string()
}
