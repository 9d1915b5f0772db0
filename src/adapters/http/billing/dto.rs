//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.
//! Field names are camelCase to match the web client.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::CheckAccessResult;
use crate::domain::billing::{AccessDecision, AccessLevel, CreditBalance, PriceType};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a hosted checkout.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// "monthly", "yearly" or "per_cv".
    pub price_type: PriceType,
    /// Required for `per_cv`, ignored otherwise.
    #[serde(default)]
    pub resume_id: Option<String>,
    /// Prefilled on the Stripe customer when one is created.
    #[serde(default)]
    pub email: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

/// Acknowledgement returned to Stripe.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceivedResponse {
    pub received: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub level: AccessLevel,
    pub days_remaining: u32,
    pub can_edit: bool,
    pub can_export: bool,
    pub can_use_ai: bool,
    /// Stored subscription status, absent for principals without an account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl From<AccessDecision> for AccessResponse {
    fn from(decision: AccessDecision) -> Self {
        Self {
            level: decision.level,
            days_remaining: decision.days_remaining,
            can_edit: decision.can_edit,
            can_export: decision.can_export,
            can_use_ai: decision.can_use_ai,
            status: None,
        }
    }
}

impl From<CheckAccessResult> for AccessResponse {
    fn from(result: CheckAccessResult) -> Self {
        Self {
            status: Some(result.account.status.as_str().to_string()),
            ..Self::from(result.decision)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalanceResponse {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    /// When the counter was last reset (RFC 3339).
    pub reset_at: Option<String>,
}

impl From<CreditBalance> for CreditBalanceResponse {
    fn from(balance: CreditBalance) -> Self {
        Self {
            limit: balance.limit,
            used: balance.used,
            remaining: balance.remaining,
            reset_at: balance.reset_at.map(|t| t.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportAccessResponse {
    pub resume_id: String,
    pub allowed: bool,
}

/// Error body shared by every billing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
        }
    }

    /// Body without a code, for callers (Stripe) that only log the message.
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    #[test]
    fn checkout_request_reads_camel_case() {
        let request: CheckoutRequest = serde_json::from_str(
            r#"{"priceType":"per_cv","resumeId":"7f1c1d2e-0000-4000-8000-000000000001"}"#,
        )
        .unwrap();

        assert_eq!(request.price_type, PriceType::PerCv);
        assert!(request.resume_id.is_some());
        assert!(request.email.is_none());
    }

    #[test]
    fn checkout_request_rejects_unknown_price_type() {
        let result = serde_json::from_str::<CheckoutRequest>(r#"{"priceType":"weekly"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn access_response_serializes_camel_case() {
        let json = serde_json::to_value(AccessResponse::from(AccessDecision::full())).unwrap();

        assert_eq!(json["level"], "full");
        assert_eq!(json["canExport"], true);
        assert!(json.get("status").is_none());
    }

    #[test]
    fn credit_balance_response_formats_reset_time() {
        let reset = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        let response = CreditBalanceResponse::from(CreditBalance::new(50, 12, Some(reset)));

        assert_eq!(response.remaining, 38);
        assert_eq!(response.reset_at.as_deref(), Some(reset.to_string().as_str()));
    }

    #[test]
    fn error_response_without_code_omits_field() {
        let json = serde_json::to_value(ErrorResponse::message("bad signature")).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "bad signature" }));
    }
}
