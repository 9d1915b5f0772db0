//! ReplayDeadLettersHandler - re-runs parked webhook events.
//!
//! Used once the state a dead letter was waiting for exists (typically an
//! account that was provisioned late). Events that still fail retryably
//! stay parked; anything else settles as it would on live delivery.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::billing::{BillingEvent, Disposition, StripeEvent};
use crate::domain::foundation::DomainError;
use crate::ports::{DeliveryStatus, WebhookEventRecord, WebhookEventRepository};

use super::reconcile_webhook::dispatch_with_budget;
use super::reconciler::{Reconciled, WebhookDispatcher};

#[derive(Debug, Clone, Copy)]
pub struct ReplayDeadLettersCommand {
    pub limit: u32,
}

/// Tally of a replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayDeadLettersResult {
    pub replayed: u32,
    pub skipped: u32,
    pub still_failing: u32,
}

pub struct ReplayDeadLettersHandler {
    events: Arc<dyn WebhookEventRepository>,
    dispatcher: Arc<dyn WebhookDispatcher>,
    handler_timeout: Duration,
}

impl ReplayDeadLettersHandler {
    pub fn new(
        events: Arc<dyn WebhookEventRepository>,
        dispatcher: Arc<dyn WebhookDispatcher>,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            events,
            dispatcher,
            handler_timeout,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReplayDeadLettersCommand,
    ) -> Result<ReplayDeadLettersResult, DomainError> {
        let parked = self.events.list_dead_lettered(cmd.limit).await?;
        let mut result = ReplayDeadLettersResult::default();

        for record in parked {
            let event = match decode(&record) {
                Some(event) => event,
                None => {
                    tracing::error!(event_id = %record.event_id, "Dead letter payload no longer parses");
                    let skipped = WebhookEventRecord::skipped(
                        &record.event_id,
                        &record.event_type,
                        "stored payload is not a valid event",
                        record.payload.clone(),
                    );
                    self.events.record_outcome(&skipped).await?;
                    result.skipped += 1;
                    continue;
                }
            };

            let outcome =
                dispatch_with_budget(self.dispatcher.as_ref(), &event, self.handler_timeout).await;
            let settled = match outcome {
                Ok(Reconciled::Ignored(reason)) => Some(WebhookEventRecord::ignored(
                    &event.id,
                    &event.event_type,
                    reason,
                    record.payload.clone(),
                )),
                Ok(_) => Some(WebhookEventRecord::processed(
                    &event.id,
                    &event.event_type,
                    record.payload.clone(),
                )),
                Err(err) if err.disposition() == Disposition::Terminal => {
                    result.skipped += 1;
                    Some(WebhookEventRecord::skipped(
                        &event.id,
                        &event.event_type,
                        err.to_string(),
                        record.payload.clone(),
                    ))
                }
                Err(err) => {
                    tracing::warn!(event_id = %event.id, error = %err, "Dead letter still failing");
                    result.still_failing += 1;
                    None
                }
            };

            if let Some(settled) = settled {
                if settled.status != DeliveryStatus::Skipped {
                    result.replayed += 1;
                }
                self.events.record_outcome(&settled).await?;
            }
        }

        tracing::info!(
            replayed = result.replayed,
            skipped = result.skipped,
            still_failing = result.still_failing,
            "Dead letter replay finished"
        );
        Ok(result)
    }
}

fn decode(record: &WebhookEventRecord) -> Option<BillingEvent> {
    let envelope: StripeEvent = serde_json::from_value(record.payload.clone()).ok()?;
    BillingEvent::from_envelope(&envelope).ok()
}
