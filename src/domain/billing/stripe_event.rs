//! Stripe webhook event types.
//!
//! A verified delivery is first read into the loose [`StripeEvent`]
//! envelope, then narrowed into a [`BillingEvent`] whose payload is a
//! tagged union with one strongly typed variant per event type we
//! reconcile. A known type whose object has the wrong shape is rejected
//! here, before any reconciliation logic runs. Only the fields we use are
//! captured; everything else in Stripe's schema is ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::webhook_errors::WebhookError;
use crate::domain::foundation::Timestamp;

/// Stripe webhook envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Unique identifier for the event (evt_xxx format).
    pub id: String,

    /// Type of event (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time at which the event was created (Unix timestamp).
    pub created: i64,

    /// Object containing event-specific data.
    pub data: StripeEventData,

    /// Whether this is a live mode event (vs test mode).
    #[serde(default)]
    pub livemode: bool,

    /// API version used to render this event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Container for event-specific data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    /// The object that triggered the event (polymorphic based on event type).
    pub object: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attributes: Option<serde_json::Value>,
}

impl StripeEvent {
    /// Parses a raw delivery body.
    pub fn from_slice(payload: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(payload).map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    }

    fn deserialize_object<T: serde::de::DeserializeOwned>(&self) -> Result<T, WebhookError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            WebhookError::MalformedPayload(format!("{} object: {}", self.event_type, e))
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Typed objects
// ════════════════════════════════════════════════════════════════════════════════

/// `checkout.session` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    /// `payment`, `subscription` or `setup`.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl CheckoutSessionObject {
    pub fn is_one_time_payment(&self) -> bool {
        self.mode.as_deref() == Some("payment")
    }

    /// Funds are captured. Anything else means an async method is still settling.
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// `subscription` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: Option<SubscriptionItems>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

impl SubscriptionObject {
    /// Period end as reported by the event itself.
    ///
    /// Newer API versions moved the field onto subscription items; the
    /// latest item period end is used when the top-level field is absent.
    pub fn period_end(&self) -> Option<Timestamp> {
        self.current_period_end
            .or_else(|| {
                self.items
                    .as_ref()
                    .and_then(|items| items.data.iter().filter_map(|i| i.current_period_end).max())
            })
            .and_then(Timestamp::from_unix_secs)
    }
}

/// `invoice` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<InvoiceSubscriptionDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InvoiceSubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<String>,
}

impl InvoiceObject {
    /// Subscription this invoice bills, if any. One-off invoices return `None`.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_deref()
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|p| p.subscription_details.as_ref())
                    .and_then(|d| d.subscription.as_deref())
            })
            .filter(|id| !id.is_empty())
    }
}

/// `payment_intent` object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Tagged union
// ════════════════════════════════════════════════════════════════════════════════

/// Typed payload, one variant per reconciled event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    CheckoutCompleted(CheckoutSessionObject),
    /// A delayed payment method (bank debit) settled after checkout completed unpaid.
    CheckoutAsyncPaymentSucceeded(CheckoutSessionObject),
    SubscriptionCreated(SubscriptionObject),
    SubscriptionUpdated(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaid(InvoiceObject),
    InvoicePaymentFailed(InvoiceObject),
    PaymentIntentSucceeded(PaymentIntentObject),
    /// An event type we do not reconcile. Acknowledged, never retried.
    Unhandled,
}

/// A verified, typed Stripe event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingEvent {
    pub id: String,
    pub event_type: String,
    /// Stripe's own creation time; ordering decisions use this, never receipt time.
    pub created: Timestamp,
    pub livemode: bool,
    pub payload: EventPayload,
}

impl BillingEvent {
    /// Narrows an envelope into a typed event.
    pub fn from_envelope(event: &StripeEvent) -> Result<Self, WebhookError> {
        let created = Timestamp::from_unix_secs(event.created).ok_or_else(|| {
            WebhookError::MalformedPayload(format!("created out of range: {}", event.created))
        })?;

        let payload = match event.event_type.as_str() {
            "checkout.session.completed" => EventPayload::CheckoutCompleted(event.deserialize_object()?),
            "checkout.session.async_payment_succeeded" => {
                EventPayload::CheckoutAsyncPaymentSucceeded(event.deserialize_object()?)
            }
            "customer.subscription.created" => EventPayload::SubscriptionCreated(event.deserialize_object()?),
            "customer.subscription.updated" => EventPayload::SubscriptionUpdated(event.deserialize_object()?),
            "customer.subscription.deleted" => EventPayload::SubscriptionDeleted(event.deserialize_object()?),
            "invoice.paid" => EventPayload::InvoicePaid(event.deserialize_object()?),
            "invoice.payment_failed" => EventPayload::InvoicePaymentFailed(event.deserialize_object()?),
            "payment_intent.succeeded" => EventPayload::PaymentIntentSucceeded(event.deserialize_object()?),
            _ => EventPayload::Unhandled,
        };

        Ok(Self {
            id: event.id.clone(),
            event_type: event.event_type.clone(),
            created,
            livemode: event.livemode,
            payload,
        })
    }

    /// Parses a raw delivery body straight into a typed event.
    pub fn from_slice(payload: &[u8]) -> Result<Self, WebhookError> {
        Self::from_envelope(&StripeEvent::from_slice(payload)?)
    }
}
