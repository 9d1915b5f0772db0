//! ReconcileWebhookHandler - the Stripe webhook ingestion pipeline.
//!
//! 1. Verify the signature (fails closed, before any parsing)
//! 2. Parse into a typed [`BillingEvent`]
//! 3. Skip events the delivery log already settled
//! 4. Dispatch under the handler time budget
//! 5. Record the outcome and translate it into an acknowledgement
//!
//! Retryable failures are counted per event. Once an event has failed
//! `max_delivery_attempts` times it is parked as a dead letter and
//! acknowledged, so it stops consuming Stripe's retry schedule and can be
//! replayed with [`super::ReplayDeadLettersHandler`].

use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{BillingEvent, Disposition, ReconcileError, StripeWebhookVerifier, WebhookError};
use crate::ports::{WebhookEventRecord, WebhookEventRepository};

use super::reconciler::{Reconciled, WebhookDispatcher};

/// Command carrying a raw webhook delivery.
#[derive(Debug, Clone)]
pub struct ReconcileWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// Value of the `Stripe-Signature` header, if present.
    pub signature: Option<String>,
}

/// How a delivery was acknowledged. Every variant maps to HTTP 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    Processed,
    Ignored,
    AlreadyProcessed,
    /// Permanent failure; acknowledged so Stripe stops redelivering.
    TerminalNoop,
    DeadLettered,
}

/// Pipeline knobs.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub handler_timeout: Duration,
    pub max_delivery_attempts: u32,
    /// Acknowledge and ignore test-mode events.
    pub require_livemode: bool,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(10),
            max_delivery_attempts: 8,
            require_livemode: false,
        }
    }
}

pub struct ReconcileWebhookHandler {
    verifier: StripeWebhookVerifier,
    events: Arc<dyn WebhookEventRepository>,
    dispatcher: Arc<dyn WebhookDispatcher>,
    settings: WebhookSettings,
}

impl ReconcileWebhookHandler {
    pub fn new(
        verifier: StripeWebhookVerifier,
        events: Arc<dyn WebhookEventRepository>,
        dispatcher: Arc<dyn WebhookDispatcher>,
        settings: WebhookSettings,
    ) -> Self {
        Self {
            verifier,
            events,
            dispatcher,
            settings,
        }
    }

    pub async fn handle(&self, cmd: ReconcileWebhookCommand) -> Result<WebhookAck, WebhookError> {
        if let Err(err) = self.verifier.verify(&cmd.payload, cmd.signature.as_deref()) {
            tracing::warn!(error = %err, "Rejected webhook delivery");
            return Err(err);
        }

        let event = BillingEvent::from_slice(&cmd.payload).map_err(|err| {
            tracing::warn!(error = %err, "Failed to parse webhook payload");
            err
        })?;
        let raw: serde_json::Value = serde_json::from_slice(&cmd.payload).unwrap_or_default();

        let existing = self
            .events
            .find_by_event_id(&event.id)
            .await
            .map_err(|e| WebhookError::Storage(e.to_string()))?;
        if let Some(record) = existing.filter(|r| r.status.is_settled()) {
            tracing::debug!(
                event_id = %event.id,
                status = %record.status,
                "Webhook event already settled"
            );
            return Ok(WebhookAck::AlreadyProcessed);
        }

        if self.settings.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Ignored test mode event");
            let record = WebhookEventRecord::ignored(&event.id, &event.event_type, "test mode event", raw);
            self.record_outcome(&record).await?;
            return Ok(WebhookAck::Ignored);
        }

        let result = dispatch_with_budget(self.dispatcher.as_ref(), &event, self.settings.handler_timeout).await;
        self.settle(&event, raw, result).await
    }

    async fn settle(
        &self,
        event: &BillingEvent,
        raw: serde_json::Value,
        result: Result<Reconciled, ReconcileError>,
    ) -> Result<WebhookAck, WebhookError> {
        let err = match result {
            Ok(Reconciled::Ignored(reason)) => {
                let record = WebhookEventRecord::ignored(&event.id, &event.event_type, reason, raw);
                self.record_outcome(&record).await?;
                return Ok(WebhookAck::Ignored);
            }
            Ok(_) => {
                let record = WebhookEventRecord::processed(&event.id, &event.event_type, raw);
                self.record_outcome(&record).await?;
                return Ok(WebhookAck::Processed);
            }
            Err(err) => err,
        };

        if err.disposition() == Disposition::Terminal {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %err,
                "Webhook event cannot be applied; acknowledging"
            );
            let record = WebhookEventRecord::skipped(&event.id, &event.event_type, err.to_string(), raw);
            self.record_outcome(&record).await?;
            return Ok(WebhookAck::TerminalNoop);
        }

        let record = WebhookEventRecord::failed(&event.id, &event.event_type, err.to_string(), raw);
        let attempts = self
            .events
            .record_failure(&record)
            .await
            .map_err(|e| WebhookError::Storage(e.to_string()))?;

        let Some(attempts) = attempts else {
            return Ok(WebhookAck::AlreadyProcessed);
        };

        if attempts >= self.settings.max_delivery_attempts {
            self.events
                .mark_dead_lettered(&event.id)
                .await
                .map_err(|e| WebhookError::Storage(e.to_string()))?;
            tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                attempts,
                error = %err,
                "Webhook event dead-lettered"
            );
            return Ok(WebhookAck::DeadLettered);
        }

        tracing::warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            attempts,
            error = %err,
            "Webhook event failed; awaiting redelivery"
        );
        Err(WebhookError::Retryable(err.to_string()))
    }

    async fn record_outcome(&self, record: &WebhookEventRecord) -> Result<(), WebhookError> {
        self.events.record_outcome(record).await.map_err(|e| {
            tracing::error!(event_id = %record.event_id, error = %e, "Failed to record webhook outcome");
            WebhookError::Storage(e.to_string())
        })
    }
}

/// Dispatches `event`, converting an exceeded budget into a retryable error.
pub(super) async fn dispatch_with_budget(
    dispatcher: &dyn WebhookDispatcher,
    event: &BillingEvent,
    budget: Duration,
) -> Result<Reconciled, ReconcileError> {
    match tokio::time::timeout(budget, dispatcher.dispatch(event)).await {
        Ok(result) => result,
        Err(_) => Err(ReconcileError::TimedOut(budget)),
    }
}
