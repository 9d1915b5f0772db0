//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port for Stripe integration:
//! - Customer creation
//! - Hosted checkout sessions
//!
//! Webhook signatures are verified in the domain (`StripeWebhookVerifier`);
//! `StripeConfig` owns the signing secret and builds the verifier.
//!
//! # Security
//!
//! - All secrets are handled via `secrecy::SecretString`
//! - The API key is sent only as basic-auth credentials

mod mock_payment_provider;
mod stripe_adapter;

pub use mock_payment_provider::MockPaymentProvider;
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
