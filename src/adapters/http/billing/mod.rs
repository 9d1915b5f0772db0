//! HTTP adapter for billing endpoints.
//!
//! Exposes the billing core via REST API:
//! - `POST /api/webhooks/stripe` - Stripe webhook ingestion
//! - `POST /api/checkout` - Start a hosted checkout
//! - `GET /api/billing/access` - Access decision
//! - `GET /api/billing/credits` - AI credit balance
//! - `GET /api/billing/resumes/:resume_id/export` - Per-resume export permission
//! - `POST /api/billing/credits/consume` - Spend one AI credit

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{BillingApiError, BillingAppState, BillingRules, BillingStores, WebhookApiError};
pub use routes::{billing_router, billing_routes, webhook_routes};
