//! Billing handlers.
//!
//! ## Commands
//! - Reconciling Stripe webhook deliveries
//! - Replaying dead-lettered deliveries
//! - Provisioning trial accounts
//! - Consuming AI credits
//! - Creating checkout sessions
//!
//! ## Queries
//! - Check access (entitlement decision)
//! - Get AI credit balance

mod ai_credits;
mod check_access;
mod create_checkout;
mod provision_account;
mod reconcile_webhook;
mod reconciler;
mod replay_dead_letters;

// Commands
pub use ai_credits::{ConsumeAiCreditCommand, ConsumeAiCreditHandler};
pub use create_checkout::{
    CheckoutCatalog, CreateCheckoutCommand, CreateCheckoutHandler, CreateCheckoutResult,
};
pub use provision_account::{ProvisionAccountCommand, ProvisionAccountHandler};
pub use reconcile_webhook::{
    ReconcileWebhookCommand, ReconcileWebhookHandler, WebhookAck, WebhookSettings,
};
pub use reconciler::{BillingReconciler, Reconciled, WebhookDispatcher};
pub use replay_dead_letters::{
    ReplayDeadLettersCommand, ReplayDeadLettersHandler, ReplayDeadLettersResult,
};

// Queries
pub use ai_credits::GetCreditBalanceHandler;
pub use check_access::{CheckAccessHandler, CheckAccessQuery, CheckAccessResult};
