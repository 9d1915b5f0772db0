//! Axum router configuration for billing endpoints.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::adapters::http::middleware::require_access;

use super::handlers::{
    consume_ai_credit, create_checkout, get_access, get_credits, get_export_access,
    handle_stripe_webhook, BillingAppState,
};

/// User-facing billing routes, mounted at `/billing`.
///
/// # Routes
/// - `GET /access` - Access decision (provisions on first contact)
/// - `GET /credits` - AI credit balance
/// - `GET /resumes/:resume_id/export` - Export permission for one resume
/// - `POST /credits/consume` - Spend one AI credit (expired accounts get 402)
pub fn billing_routes(state: &BillingAppState) -> Router<BillingAppState> {
    let guarded = Router::new()
        .route("/credits/consume", post(consume_ai_credit))
        .route_layer(middleware::from_fn_with_state(
            state.access.clone(),
            require_access,
        ));

    Router::new()
        .route("/access", get(get_access))
        .route("/credits", get(get_credits))
        .route("/resumes/:resume_id/export", get(get_export_access))
        .merge(guarded)
}

/// Stripe webhook routes, mounted at `/webhooks`.
///
/// No principal is required; deliveries are authenticated by signature.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Complete billing API, suitable for nesting under `/api`.
///
/// # Example
///
/// ```ignore
/// let app = Router::new().nest("/api", billing_router(state));
/// ```
pub fn billing_router(state: BillingAppState) -> Router {
    Router::new()
        .route("/checkout", post(create_checkout))
        .nest("/billing", billing_routes(&state))
        .nest("/webhooks", webhook_routes())
        .with_state(state)
}
