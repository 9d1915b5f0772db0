//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` trait against the Stripe REST API
//! (form-encoded requests, basic auth with the secret key).
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key, webhook_secret);
//! let adapter = StripePaymentAdapter::new(config.clone());
//! let verifier = config.webhook_verifier(300);
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::billing::{CheckoutMode, StripeWebhookVerifier};
use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, Customer, PaymentError,
    PaymentErrorCode, PaymentProvider,
};

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds the signature verifier for this account's webhook endpoint.
    pub fn webhook_verifier(&self, tolerance_secs: i64) -> StripeWebhookVerifier {
        StripeWebhookVerifier::new(self.webhook_secret.clone()).with_tolerance(tolerance_secs)
    }
}

/// Stripe payment provider adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, PaymentError> {
        let url = format!("{}{}", self.config.api_base_url, path);

        let mut request = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(params);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), path, error = %error_text, "Stripe request failed");
            return Err(error_from_response(status.as_u16(), &error_text));
        }

        response.json().await.map_err(|e| {
            PaymentError::new(
                PaymentErrorCode::ProviderError,
                format!("Failed to parse Stripe response: {}", e),
            )
        })
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        let mut params = vec![("metadata[user_id]".to_string(), request.user_id.to_string())];
        if let Some(email) = &request.email {
            params.push(("email".to_string(), email.clone()));
        }

        let customer: StripeObject = self
            .post_form("/v1/customers", &params, request.idempotency_key.as_deref())
            .await?;

        Ok(Customer { id: customer.id })
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let params = checkout_params(&request);
        let session: StripeCheckoutSession = self
            .post_form("/v1/checkout/sessions", &params, None)
            .await?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::provider("Checkout session has no URL"))?;

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }
}

/// Minimal Stripe object: only the id is needed.
#[derive(Debug, Deserialize)]
struct StripeObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    code: Option<String>,
}

/// Form parameters for `POST /v1/checkout/sessions`.
///
/// The user id (and resume id for one-time purchases) is written both to the
/// session and to the object Stripe creates from it, so subscription and
/// payment-intent webhooks carry it too.
fn checkout_params(request: &CreateCheckoutRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("mode".to_string(), request.mode.as_str().to_string()),
        ("customer".to_string(), request.customer_id.clone()),
        ("line_items[0][price]".to_string(), request.price_id.clone()),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("client_reference_id".to_string(), request.user_id.to_string()),
        ("metadata[user_id]".to_string(), request.user_id.to_string()),
    ];

    let child = match request.mode {
        CheckoutMode::Subscription => "subscription_data",
        CheckoutMode::Payment => "payment_intent_data",
    };
    params.push((format!("{}[metadata][user_id]", child), request.user_id.to_string()));

    if let Some(resume_id) = &request.resume_id {
        params.push(("metadata[resume_id]".to_string(), resume_id.to_string()));
        params.push((format!("{}[metadata][resume_id]", child), resume_id.to_string()));
    }

    params
}

fn error_from_response(status: u16, body: &str) -> PaymentError {
    let detail = serde_json::from_str::<StripeErrorBody>(body).ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| format!("Stripe API error (HTTP {})", status));

    let code = match status {
        401 | 403 => PaymentErrorCode::AuthenticationError,
        429 => PaymentErrorCode::RateLimitExceeded,
        400..=499 => PaymentErrorCode::InvalidRequest,
        _ => PaymentErrorCode::ProviderError,
    };

    let error = PaymentError::new(code, message);
    match detail.and_then(|d| d.code) {
        Some(provider_code) => error.with_provider_code(provider_code),
        None => error,
    }
}
