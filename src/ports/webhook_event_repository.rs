//! WebhookEventRepository port - delivery log for Stripe webhooks.
//!
//! Stripe delivers at least once, so every event id gets one row that
//! records what happened to it. The log serves two purposes:
//!
//! - **Idempotency**: a settled event is acknowledged without being
//!   dispatched again.
//! - **Dead letters**: retryable failures are counted; once an event has
//!   failed too many times it is parked here instead of being left to
//!   Stripe's retry ceiling, and can be replayed later.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{DomainError, Timestamp, ValidationError};

/// What happened to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    /// Reconciled and applied (or found already applied).
    Processed,
    /// Acknowledged without action: unhandled type or irrelevant object.
    Ignored,
    /// Failed terminally; acknowledged so Stripe stops redelivering.
    Skipped,
    /// Failed retryably; Stripe will redeliver.
    Failed,
    /// Failed retryably too many times; parked for replay.
    DeadLettered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Processed => "processed",
            DeliveryStatus::Ignored => "ignored",
            DeliveryStatus::Skipped => "skipped",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::DeadLettered => "dead_lettered",
        }
    }

    /// Whether a new delivery of this event should be acknowledged without dispatch.
    pub fn is_settled(&self) -> bool {
        !matches!(self, DeliveryStatus::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(DeliveryStatus::Processed),
            "ignored" => Ok(DeliveryStatus::Ignored),
            "skipped" => Ok(DeliveryStatus::Skipped),
            "failed" => Ok(DeliveryStatus::Failed),
            "dead_lettered" => Ok(DeliveryStatus::DeadLettered),
            other => Err(ValidationError::unknown_value("delivery_status", other)),
        }
    }
}

/// One row of the delivery log.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    /// Stripe event ID (evt_xxx format).
    pub event_id: String,

    /// Type of Stripe event (e.g., "checkout.session.completed").
    pub event_type: String,

    pub status: DeliveryStatus,

    /// Number of deliveries that reached dispatch.
    pub attempts: u32,

    /// Reason for the last non-success outcome.
    pub last_error: Option<String>,

    /// Original event envelope, kept so dead letters can be replayed.
    pub payload: serde_json::Value,

    pub first_seen_at: Timestamp,
    pub updated_at: Timestamp,
}

impl WebhookEventRecord {
    fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        status: DeliveryStatus,
        last_error: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            status,
            attempts: 1,
            last_error,
            payload,
            first_seen_at: now,
            updated_at: now,
        }
    }

    pub fn processed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(event_id, event_type, DeliveryStatus::Processed, None, payload)
    }

    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(event_id, event_type, DeliveryStatus::Ignored, Some(reason.into()), payload)
    }

    pub fn skipped(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        error: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(event_id, event_type, DeliveryStatus::Skipped, Some(error.into()), payload)
    }

    pub fn failed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        error: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(event_id, event_type, DeliveryStatus::Failed, Some(error.into()), payload)
    }
}

/// Port for the webhook delivery log.
///
/// Implementations key rows by `event_id` (PRIMARY KEY) and use upserts so
/// concurrent deliveries of the same event cannot create duplicates.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Stores a settled outcome (processed, ignored, skipped), replacing
    /// any earlier failed or dead-lettered state for the event.
    async fn record_outcome(&self, record: &WebhookEventRecord) -> Result<(), DomainError>;

    /// Counts one more failed attempt for the event.
    ///
    /// Returns the total number of attempts, or `None` if the event was
    /// settled concurrently by another delivery.
    async fn record_failure(&self, record: &WebhookEventRecord) -> Result<Option<u32>, DomainError>;

    /// Parks a failed event so it is acknowledged on future deliveries.
    async fn mark_dead_lettered(&self, event_id: &str) -> Result<(), DomainError>;

    /// Oldest dead-lettered events first.
    async fn list_dead_lettered(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError>;
}
