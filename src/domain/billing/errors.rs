//! Billing error types.
//!
//! `ReconcileError` is what a webhook reconciliation handler returns. Each
//! variant carries an explicit [`Disposition`] so the transport layer can
//! choose between asking Stripe to redeliver and acknowledging, without
//! the handlers knowing about HTTP.
//!
//! `BillingError` covers the user-facing operations (checkout, access,
//! AI credits).

use std::time::Duration;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, ResumeId};

/// How a failed reconciliation should be treated by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Plausibly transient; Stripe should redeliver.
    Retryable,
    /// Permanent; acknowledge and stop redelivery.
    Terminal,
}

/// Failure of a single reconciliation handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The event implies an account that has not been committed yet.
    #[error("No account for customer {customer_id} yet")]
    AccountNotProvisioned { customer_id: String },

    /// A deletion or failure notice for a customer we never had.
    #[error("No account for customer {customer_id}")]
    UnknownCustomer { customer_id: String },

    /// The referenced resume does not exist.
    #[error("Resume {0} not found")]
    ResumeNotFound(ResumeId),

    /// The event lacks a field this handler cannot work without.
    #[error("Event is missing '{0}'")]
    MissingField(&'static str),

    /// A store rejected the change for a non-transient reason.
    #[error("Rejected by store: {0}")]
    Rejected(String),

    /// A store or network dependency failed transiently.
    #[error("Store unavailable: {0}")]
    Store(String),

    /// The handler did not finish within its time budget.
    #[error("Handler exceeded {0:?}")]
    TimedOut(Duration),
}

impl ReconcileError {
    pub fn disposition(&self) -> Disposition {
        match self {
            ReconcileError::AccountNotProvisioned { .. }
            | ReconcileError::Store(_)
            | ReconcileError::TimedOut(_) => Disposition::Retryable,
            ReconcileError::UnknownCustomer { .. }
            | ReconcileError::ResumeNotFound(_)
            | ReconcileError::MissingField(_)
            | ReconcileError::Rejected(_) => Disposition::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retryable
    }
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        if err.code.is_transient() {
            ReconcileError::Store(err.to_string())
        } else {
            ReconcileError::Rejected(err.to_string())
        }
    }
}

/// Errors from user-facing billing operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BillingError {
    #[error("No billing account exists for this user")]
    AccountNotFound,

    #[error("Resume {0} not found")]
    ResumeNotFound(ResumeId),

    #[error("Resume {0} belongs to another user")]
    ResumeNotOwned(ResumeId),

    #[error("Resume {0} has already been purchased")]
    ResumeAlreadyPurchased(ResumeId),

    #[error("A resume is required for a per-resume purchase")]
    ResumeRequired,

    #[error("Access has expired")]
    AccessExpired,

    #[error("AI features are not available on the current plan state")]
    AiNotAllowed,

    #[error("AI credit limit of {limit} reached")]
    QuotaExhausted { limit: u32 },

    #[error("Account changed concurrently")]
    ConcurrentUpdate,

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Validation failed for '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl BillingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable, machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            BillingError::ResumeNotFound(_) => "RESUME_NOT_FOUND",
            BillingError::ResumeNotOwned(_) => "RESUME_NOT_OWNED",
            BillingError::ResumeAlreadyPurchased(_) => "RESUME_ALREADY_PURCHASED",
            BillingError::ResumeRequired => "RESUME_REQUIRED",
            BillingError::AccessExpired => "ACCESS_EXPIRED",
            BillingError::AiNotAllowed => "AI_NOT_ALLOWED",
            BillingError::QuotaExhausted { .. } => "AI_QUOTA_EXHAUSTED",
            BillingError::ConcurrentUpdate => "CONCURRENT_UPDATE",
            BillingError::PaymentProvider(_) => "PAYMENT_PROVIDER_ERROR",
            BillingError::ValidationFailed { .. } => "VALIDATION_FAILED",
            BillingError::Infrastructure(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the end user. Internal causes are not included.
    pub fn message(&self) -> String {
        match self {
            BillingError::PaymentProvider(_) => {
                "Could not start checkout, please try again".to_string()
            }
            BillingError::Infrastructure(_) => "Something went wrong, please try again".to_string(),
            BillingError::ResumeNotOwned(_) => "You do not have access to this resume".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::ConcurrentUpdate
                | BillingError::PaymentProvider(_)
                | BillingError::Infrastructure(_)
        )
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::AccountNotFound => BillingError::AccountNotFound,
            ErrorCode::ValidationFailed => BillingError::ValidationFailed {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            ErrorCode::PaymentProviderError => BillingError::PaymentProvider(err.message),
            _ => BillingError::Infrastructure(err.to_string()),
        }
    }
}
