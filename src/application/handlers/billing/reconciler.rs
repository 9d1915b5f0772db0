//! BillingReconciler - applies verified Stripe events to local billing state.
//!
//! One operation per event type. Every operation is safe to run again for
//! the same event and in any order relative to other events for the same
//! account: state changes go through conditional updates in the stores,
//! never through read-modify-write.
//!
//! Missing local state is classified by what the event implies. Events that
//! mean an account must exist soon (checkout, subscription sync, invoice
//! paid) fail retryably so Stripe redelivers after provisioning catches up.
//! Deletion and failure notices for unknown customers are terminal.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::billing::{
    Account, BillingEvent, CheckoutSessionObject, EventPayload, InvoiceObject,
    PaymentIntentObject, Purchase, ReconcileError, SubscriptionDeletion, SubscriptionObject,
    SubscriptionSnapshot, SubscriptionStatus,
};
use crate::domain::foundation::{DomainError, ErrorCode, ResumeId};
use crate::ports::{AccountRepository, CompletionOutcome, PendingOutcome, PurchaseRepository};

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Local state changed.
    Applied,
    /// The event was valid but already reflected (duplicate or stale).
    Unchanged,
    /// The event carries nothing this service tracks.
    Ignored(String),
}

/// Routes a typed event to exactly one reconciliation operation.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn dispatch(&self, event: &BillingEvent) -> Result<Reconciled, ReconcileError>;
}

/// Store-backed reconciler for every event type the service handles.
pub struct BillingReconciler {
    accounts: Arc<dyn AccountRepository>,
    purchases: Arc<dyn PurchaseRepository>,
}

impl BillingReconciler {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        purchases: Arc<dyn PurchaseRepository>,
    ) -> Self {
        Self {
            accounts,
            purchases,
        }
    }

    async fn account_for(&self, customer_id: &str) -> Result<Option<Account>, ReconcileError> {
        Ok(self.accounts.find_by_customer_id(customer_id).await?)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // One-time purchases
    // ════════════════════════════════════════════════════════════════════════════

    async fn checkout_completed(
        &self,
        event: &BillingEvent,
        session: &CheckoutSessionObject,
    ) -> Result<Reconciled, ReconcileError> {
        if !session.is_one_time_payment() {
            return Ok(Reconciled::Ignored(
                "subscription checkout; state arrives with subscription events".to_string(),
            ));
        }
        let Some(raw_resume_id) = session.metadata_value("resume_id") else {
            return Ok(Reconciled::Ignored("checkout has no resume reference".to_string()));
        };
        let resume_id: ResumeId = raw_resume_id
            .parse()
            .map_err(|_| ReconcileError::Rejected(format!("invalid resume_id '{}'", raw_resume_id)))?;

        let customer_id = session
            .customer
            .as_deref()
            .ok_or(ReconcileError::MissingField("customer"))?;
        let payment_intent_id = session
            .payment_intent
            .as_deref()
            .ok_or(ReconcileError::MissingField("payment_intent"))?;

        let account = self
            .account_for(customer_id)
            .await?
            .ok_or_else(|| ReconcileError::AccountNotProvisioned {
                customer_id: customer_id.to_string(),
            })?;

        let purchase = Purchase::pending(
            account.user_id.clone(),
            resume_id,
            payment_intent_id,
            session.amount_total.unwrap_or(0),
            session.currency.clone().unwrap_or_else(|| "usd".to_string()),
            event.created,
        );

        let resume_missing = |err: DomainError| match err.code {
            ErrorCode::ResumeNotFound => ReconcileError::ResumeNotFound(resume_id),
            _ => ReconcileError::from(err),
        };

        if !session.is_paid() {
            let outcome = self
                .purchases
                .record_pending(&purchase)
                .await
                .map_err(resume_missing)?;
            tracing::info!(
                event_id = %event.id,
                payment_intent_id,
                resume_id = %resume_id,
                outcome = ?outcome,
                "Recorded pending purchase"
            );
            return Ok(match outcome {
                PendingOutcome::Recorded | PendingOutcome::CompletedOnArrival => Reconciled::Applied,
                PendingOutcome::AlreadyRecorded => Reconciled::Unchanged,
            });
        }

        let outcome = self
            .purchases
            .complete(&purchase.completed(event.created))
            .await
            .map_err(resume_missing)?;

        tracing::info!(
            event_id = %event.id,
            payment_intent_id,
            resume_id = %resume_id,
            user_id = %account.user_id,
            outcome = ?outcome,
            "Resume purchase completed"
        );
        Ok(completion_result(outcome))
    }

    async fn payment_intent_succeeded(
        &self,
        event: &BillingEvent,
        intent: &PaymentIntentObject,
    ) -> Result<Reconciled, ReconcileError> {
        match self.purchases.complete_pending(&intent.id, event.created).await? {
            Some(outcome) => {
                tracing::info!(
                    event_id = %event.id,
                    payment_intent_id = %intent.id,
                    outcome = ?outcome,
                    "Pending purchase settled"
                );
                Ok(completion_result(outcome))
            }
            None => {
                tracing::info!(
                    event_id = %event.id,
                    payment_intent_id = %intent.id,
                    "Payment intent settled before its purchase was recorded"
                );
                Ok(Reconciled::Ignored(
                    "no purchase recorded for payment intent yet; settlement remembered".to_string(),
                ))
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscriptions
    // ════════════════════════════════════════════════════════════════════════════

    async fn subscription_changed(
        &self,
        event: &BillingEvent,
        subscription: &SubscriptionObject,
    ) -> Result<Reconciled, ReconcileError> {
        let account = self
            .account_for(&subscription.customer)
            .await?
            .ok_or_else(|| ReconcileError::AccountNotProvisioned {
                customer_id: subscription.customer.clone(),
            })?;

        let snapshot = SubscriptionSnapshot {
            subscription_id: subscription.id.clone(),
            status: SubscriptionStatus::from_stripe(&subscription.status),
            current_period_end: subscription.period_end(),
            observed_at: event.created,
        };

        let applied = self.accounts.apply_subscription(&account.id, &snapshot).await?;
        if applied {
            tracing::info!(
                event_id = %event.id,
                account_id = %account.id,
                subscription_id = %snapshot.subscription_id,
                status = %snapshot.status,
                "Subscription state synced"
            );
            Ok(Reconciled::Applied)
        } else {
            tracing::debug!(
                event_id = %event.id,
                account_id = %account.id,
                "Subscription event older than stored state"
            );
            Ok(Reconciled::Unchanged)
        }
    }

    async fn subscription_deleted(
        &self,
        event: &BillingEvent,
        subscription: &SubscriptionObject,
    ) -> Result<Reconciled, ReconcileError> {
        let account = self
            .account_for(&subscription.customer)
            .await?
            .ok_or_else(|| ReconcileError::UnknownCustomer {
                customer_id: subscription.customer.clone(),
            })?;

        let deletion = SubscriptionDeletion {
            subscription_id: subscription.id.clone(),
            current_period_end: subscription.period_end(),
            observed_at: event.created,
        };

        if self.accounts.apply_deletion(&account.id, &deletion).await? {
            tracing::info!(
                event_id = %event.id,
                account_id = %account.id,
                subscription_id = %deletion.subscription_id,
                "Subscription cancelled"
            );
            Ok(Reconciled::Applied)
        } else {
            Ok(Reconciled::Ignored(
                "deleted subscription is no longer the account's current one".to_string(),
            ))
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Invoices
    // ════════════════════════════════════════════════════════════════════════════

    async fn invoice_paid(
        &self,
        event: &BillingEvent,
        invoice: &InvoiceObject,
    ) -> Result<Reconciled, ReconcileError> {
        let Some(customer_id) = subscription_customer(invoice)? else {
            return Ok(Reconciled::Ignored("invoice is not for a subscription".to_string()));
        };
        let account = self
            .account_for(customer_id)
            .await?
            .ok_or_else(|| ReconcileError::AccountNotProvisioned {
                customer_id: customer_id.to_string(),
            })?;

        self.accounts.record_invoice_paid(&account.id, event.created).await?;
        tracing::info!(
            event_id = %event.id,
            account_id = %account.id,
            invoice_id = %invoice.id,
            "Invoice paid; AI credits reset"
        );
        Ok(Reconciled::Applied)
    }

    async fn invoice_payment_failed(
        &self,
        event: &BillingEvent,
        invoice: &InvoiceObject,
    ) -> Result<Reconciled, ReconcileError> {
        let Some(customer_id) = subscription_customer(invoice)? else {
            return Ok(Reconciled::Ignored("invoice is not for a subscription".to_string()));
        };
        let account = self
            .account_for(customer_id)
            .await?
            .ok_or_else(|| ReconcileError::UnknownCustomer {
                customer_id: customer_id.to_string(),
            })?;

        self.accounts.mark_past_due(&account.id).await?;
        tracing::info!(
            event_id = %event.id,
            account_id = %account.id,
            invoice_id = %invoice.id,
            "Invoice payment failed; account past due"
        );
        Ok(Reconciled::Applied)
    }
}

#[async_trait]
impl WebhookDispatcher for BillingReconciler {
    async fn dispatch(&self, event: &BillingEvent) -> Result<Reconciled, ReconcileError> {
        match &event.payload {
            EventPayload::CheckoutCompleted(session)
            | EventPayload::CheckoutAsyncPaymentSucceeded(session) => {
                self.checkout_completed(event, session).await
            }
            EventPayload::SubscriptionCreated(sub) | EventPayload::SubscriptionUpdated(sub) => {
                self.subscription_changed(event, sub).await
            }
            EventPayload::SubscriptionDeleted(sub) => self.subscription_deleted(event, sub).await,
            EventPayload::InvoicePaid(invoice) => self.invoice_paid(event, invoice).await,
            EventPayload::InvoicePaymentFailed(invoice) => {
                self.invoice_payment_failed(event, invoice).await
            }
            EventPayload::PaymentIntentSucceeded(intent) => {
                self.payment_intent_succeeded(event, intent).await
            }
            EventPayload::Unhandled => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Unhandled webhook event type"
                );
                Ok(Reconciled::Ignored(format!("unhandled event type {}", event.event_type)))
            }
        }
    }
}

/// Customer reference of a subscription-linked invoice, `None` for one-off invoices.
fn subscription_customer(invoice: &InvoiceObject) -> Result<Option<&str>, ReconcileError> {
    if invoice.subscription_id().is_none() {
        return Ok(None);
    }
    invoice
        .customer
        .as_deref()
        .map(Some)
        .ok_or(ReconcileError::MissingField("customer"))
}

fn completion_result(outcome: CompletionOutcome) -> Reconciled {
    match outcome {
        CompletionOutcome::Completed => Reconciled::Applied,
        CompletionOutcome::AlreadyCompleted => Reconciled::Unchanged,
    }
}
