//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing core and the outside world. Adapters implement these ports.
//!
//! ## Storage Ports
//!
//! - `AccountRepository` - Billing accounts, mutated only by conditional updates
//! - `PurchaseRepository` - One-time resume purchases
//! - `ResumeCatalog` - Resume ownership lookups
//! - `WebhookEventRepository` - Stripe delivery log and dead letters
//!
//! ## External Service Ports
//!
//! - `PaymentProvider` - Customer and checkout session creation

mod account_repository;
mod payment_provider;
mod purchase_repository;
mod resume_catalog;
mod webhook_event_repository;

pub use account_repository::{AccountRepository, CreditUsage};
pub use payment_provider::{
    CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, Customer, PaymentError,
    PaymentErrorCode, PaymentProvider,
};
pub use purchase_repository::{CompletionOutcome, PendingOutcome, PurchaseRepository};
pub use resume_catalog::{ResumeCatalog, ResumeRecord};
pub use webhook_event_repository::{DeliveryStatus, WebhookEventRecord, WebhookEventRepository};
