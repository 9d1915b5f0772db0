//! Billing domain - accounts, purchases, and the rules that derive access.
//!
//! - [`Account`] and [`Purchase`] are the persisted records
//! - [`AccessDecision::evaluate`] is the pure entitlement calculator
//! - [`QuotaPolicy`] maps status to AI credit limits
//! - [`BillingEvent`] is the typed form of a verified Stripe delivery

mod account;
mod entitlement;
mod errors;
mod price;
mod purchase;
mod quota;
mod status;
mod stripe_event;
mod webhook_errors;
mod webhook_verifier;

pub use account::{Account, SubscriptionDeletion, SubscriptionSnapshot, DEFAULT_TRIAL_DAYS};
pub use entitlement::{AccessDecision, AccessLevel, EntitlementPolicy};
pub use errors::{BillingError, Disposition, ReconcileError};
pub use price::{CheckoutMode, PriceType};
pub use purchase::{Purchase, PurchaseStatus};
pub use quota::{CreditBalance, QuotaPolicy};
pub use status::SubscriptionStatus;
pub use stripe_event::{
    BillingEvent, CheckoutSessionObject, EventPayload, InvoiceObject, PaymentIntentObject,
    StripeEvent, StripeEventData, SubscriptionObject,
};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{sign_payload, SignatureHeader, StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};
