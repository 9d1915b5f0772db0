//! Webhook ingress error types.
//!
//! Every failure that can happen between receiving a Stripe delivery and
//! acknowledging it, with the HTTP status that tells Stripe whether to
//! redeliver.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook ingestion.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The `Stripe-Signature` header was absent.
    #[error("Missing signature header")]
    MissingSignature,

    /// The `Stripe-Signature` header could not be parsed.
    #[error("Malformed signature header: {0}")]
    MalformedSignatureHeader(String),

    /// No signature in the header matched the payload.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Body is not a Stripe event, or a known event has the wrong shape.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Reconciliation hit a transient condition; redelivery may succeed.
    #[error("Retryable failure: {0}")]
    Retryable(String),

    /// The delivery log could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl WebhookError {
    /// Returns true if Stripe should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Retryable(_) | WebhookError::Storage(_))
    }

    /// Whether the request was rejected before the body was trusted.
    pub fn is_signature_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature
                | WebhookError::MalformedSignatureHeader(_)
                | WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
        )
    }

    /// Maps the error to an HTTP status code.
    ///
    /// Stripe retries 5xx responses on its own schedule and gives up on 4xx.
    pub fn status_code(&self) -> StatusCode {
        if self.is_retryable() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        }
    }

    /// Message safe to return to the caller. Never includes reconciliation detail.
    pub fn public_message(&self) -> &'static str {
        match self {
            WebhookError::MissingSignature => "Missing Stripe-Signature header",
            WebhookError::MalformedSignatureHeader(_)
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp => "Webhook signature verification failed",
            WebhookError::MalformedPayload(_) => "Malformed webhook payload",
            WebhookError::Retryable(_) | WebhookError::Storage(_) => {
                "Webhook processing failed, please retry"
            }
        }
    }
}
