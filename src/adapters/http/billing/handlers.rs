//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the billing command/query handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::adapters::http::middleware::RequireAuth;
use crate::adapters::memory::InMemoryBillingStore;
use crate::application::handlers::billing::{
    BillingReconciler, CheckAccessHandler, CheckAccessQuery, CheckoutCatalog,
    ConsumeAiCreditCommand, ConsumeAiCreditHandler, CreateCheckoutCommand, CreateCheckoutHandler,
    GetCreditBalanceHandler, ProvisionAccountHandler, ReconcileWebhookCommand,
    ReconcileWebhookHandler, ReplayDeadLettersHandler, WebhookDispatcher, WebhookSettings,
};
use crate::domain::billing::{
    BillingError, EntitlementPolicy, QuotaPolicy, StripeWebhookVerifier, WebhookError,
    DEFAULT_TRIAL_DAYS,
};
use crate::domain::foundation::{ResumeId, Timestamp};
use crate::ports::{
    AccountRepository, PaymentProvider, PurchaseRepository, ResumeCatalog,
    WebhookEventRepository,
};

use super::dto::{
    AccessResponse, CheckoutRequest, CheckoutResponse, CreditBalanceResponse, ErrorResponse,
    ExportAccessResponse, WebhookReceivedResponse,
};

/// Header Stripe signs every delivery with.
const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Storage ports the billing handlers run against.
#[derive(Clone)]
pub struct BillingStores {
    pub accounts: Arc<dyn AccountRepository>,
    pub purchases: Arc<dyn PurchaseRepository>,
    pub resumes: Arc<dyn ResumeCatalog>,
    pub events: Arc<dyn WebhookEventRepository>,
}

impl BillingStores {
    /// Every port backed by one in-memory store.
    pub fn in_memory(store: Arc<InMemoryBillingStore>) -> Self {
        Self {
            accounts: store.clone(),
            purchases: store.clone(),
            resumes: store.clone(),
            events: store,
        }
    }

    pub fn dispatcher(&self) -> Arc<dyn WebhookDispatcher> {
        Arc::new(BillingReconciler::new(
            self.accounts.clone(),
            self.purchases.clone(),
        ))
    }

    pub fn replay_handler(&self, rules: &BillingRules) -> ReplayDeadLettersHandler {
        ReplayDeadLettersHandler::new(
            self.events.clone(),
            self.dispatcher(),
            rules.webhook.handler_timeout,
        )
    }
}

/// Tunable business rules, usually built from `BillingConfig`.
#[derive(Debug, Clone)]
pub struct BillingRules {
    pub trial_days: i64,
    pub entitlement: EntitlementPolicy,
    pub quota: QuotaPolicy,
    pub webhook: WebhookSettings,
}

impl Default for BillingRules {
    fn default() -> Self {
        Self {
            trial_days: DEFAULT_TRIAL_DAYS,
            entitlement: EntitlementPolicy::default(),
            quota: QuotaPolicy::default(),
            webhook: WebhookSettings::default(),
        }
    }
}

/// Shared application state containing all billing handlers.
///
/// Cloned for each request; handlers are Arc-wrapped.
#[derive(Clone)]
pub struct BillingAppState {
    pub webhooks: Arc<ReconcileWebhookHandler>,
    pub checkout: Arc<CreateCheckoutHandler>,
    pub access: CheckAccessHandler,
    pub credits: Arc<GetCreditBalanceHandler>,
    pub consume_credit: Arc<ConsumeAiCreditHandler>,
}

impl BillingAppState {
    pub fn new(
        stores: BillingStores,
        payments: Arc<dyn PaymentProvider>,
        verifier: StripeWebhookVerifier,
        catalog: CheckoutCatalog,
        rules: BillingRules,
    ) -> Self {
        let provisioner = ProvisionAccountHandler::new(stores.accounts.clone(), rules.trial_days);

        Self {
            webhooks: Arc::new(ReconcileWebhookHandler::new(
                verifier,
                stores.events.clone(),
                stores.dispatcher(),
                rules.webhook.clone(),
            )),
            checkout: Arc::new(CreateCheckoutHandler::new(
                stores.accounts.clone(),
                stores.resumes.clone(),
                payments,
                provisioner.clone(),
                catalog,
            )),
            access: CheckAccessHandler::new(
                stores.accounts.clone(),
                stores.resumes.clone(),
                provisioner,
                rules.entitlement,
            ),
            credits: Arc::new(GetCreditBalanceHandler::new(
                stores.accounts.clone(),
                rules.quota,
            )),
            consume_credit: Arc::new(ConsumeAiCreditHandler::new(
                stores.accounts,
                rules.entitlement,
                rules.quota,
            )),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/stripe - Reconcile a Stripe delivery
///
/// The body is taken as raw bytes; the signature covers them exactly.
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = ReconcileWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    let ack = state.webhooks.handle(cmd).await?;
    tracing::debug!(?ack, "Webhook acknowledged");

    Ok(Json(WebhookReceivedResponse { received: true }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Checkout
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/checkout - Start a hosted checkout session
pub async fn create_checkout(
    State(state): State<BillingAppState>,
    RequireAuth(user_id): RequireAuth,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BillingApiError> {
    let Json(request) =
        body.map_err(|e| BillingError::validation("body", e.body_text()))?;

    let resume_id = request
        .resume_id
        .as_deref()
        .map(|raw| {
            raw.parse::<ResumeId>()
                .map_err(|_| BillingError::validation("resumeId", "must be a UUID"))
        })
        .transpose()?;

    let cmd = CreateCheckoutCommand {
        user_id,
        email: request.email,
        price_type: request.price_type,
        resume_id,
    };

    let result = state.checkout.handle(cmd).await?;

    Ok(Json(CheckoutResponse { url: result.url }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Entitlement Queries
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/billing/access - Access decision for the caller
///
/// Provisions a trial account on first contact.
pub async fn get_access(
    State(state): State<BillingAppState>,
    RequireAuth(user_id): RequireAuth,
) -> Result<impl IntoResponse, BillingApiError> {
    let query = CheckAccessQuery {
        user_id,
        at: Timestamp::now(),
    };

    let result = state.access.handle(query).await?;

    Ok(Json(AccessResponse::from(result)))
}

/// GET /api/billing/credits - AI credit balance for the caller
pub async fn get_credits(
    State(state): State<BillingAppState>,
    RequireAuth(user_id): RequireAuth,
) -> Result<impl IntoResponse, BillingApiError> {
    let balance = state.credits.handle(&user_id).await?;
    Ok(Json(CreditBalanceResponse::from(balance)))
}

/// GET /api/billing/resumes/:resume_id/export - Whether the caller may export
pub async fn get_export_access(
    State(state): State<BillingAppState>,
    RequireAuth(user_id): RequireAuth,
    Path(resume_id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let resume_id: ResumeId = resume_id
        .parse()
        .map_err(|_| BillingError::validation("resume_id", "must be a UUID"))?;

    let allowed = state
        .access
        .can_export_resume(&user_id, &resume_id, Timestamp::now())
        .await?;

    Ok(Json(ExportAccessResponse {
        resume_id: resume_id.to_string(),
        allowed,
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// AI Credits
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/billing/credits/consume - Spend one AI credit
pub async fn consume_ai_credit(
    State(state): State<BillingAppState>,
    RequireAuth(user_id): RequireAuth,
) -> Result<impl IntoResponse, BillingApiError> {
    let cmd = ConsumeAiCreditCommand {
        user_id,
        at: Timestamp::now(),
    };

    let balance = state.consume_credit.handle(cmd).await?;

    Ok(Json(CreditBalanceResponse::from(balance)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BillingError::ResumeRequired | BillingError::ValidationFailed { .. } => {
                StatusCode::BAD_REQUEST
            }
            BillingError::ResumeNotOwned(_) | BillingError::AiNotAllowed => StatusCode::FORBIDDEN,
            BillingError::AccountNotFound | BillingError::ResumeNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            BillingError::ResumeAlreadyPurchased(_) | BillingError::ConcurrentUpdate => {
                StatusCode::CONFLICT
            }
            BillingError::AccessExpired => StatusCode::PAYMENT_REQUIRED,
            BillingError::QuotaExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            BillingError::PaymentProvider(_) | BillingError::Infrastructure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Billing request failed");
        }

        let body = ErrorResponse::new(self.0.code(), self.0.message());
        (status, Json(body)).into_response()
    }
}

/// Webhook errors answer with the status Stripe's retry logic expects.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::message(self.0.public_message());
        (self.0.status_code(), Json(body)).into_response()
    }
}
