//! In-memory billing store.
//!
//! Implements every storage port over one set of tables behind a single
//! `Mutex`, so each port call is atomic the same way a Postgres statement
//! or transaction is. Conditional updates delegate to the `Account` and
//! `Purchase` methods that define the rules.
//!
//! Useful for:
//! - Unit and integration tests
//! - Local development without a database

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::billing::{
    Account, Purchase, SubscriptionDeletion, SubscriptionSnapshot, SubscriptionStatus,
};
use crate::domain::foundation::{AccountId, DomainError, ErrorCode, ResumeId, Timestamp, UserId};
use crate::ports::{
    AccountRepository, CompletionOutcome, CreditUsage, DeliveryStatus, PendingOutcome, PurchaseRepository,
    ResumeCatalog, ResumeRecord, WebhookEventRecord, WebhookEventRepository,
};

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    /// Keyed by payment intent.
    purchases: HashMap<String, Purchase>,
    /// Payment intents that settled before any purchase referenced them.
    settled_intents: HashMap<String, Timestamp>,
    resumes: HashMap<ResumeId, ResumeRecord>,
    events: HashMap<String, WebhookEventRecord>,
}

impl Tables {
    fn account_mut(&mut self, id: &AccountId) -> Result<&mut Account, DomainError> {
        self.accounts.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::AccountNotFound, format!("Account not found: {}", id))
        })
    }

    fn mark_resume_purchased(&mut self, id: &ResumeId) -> Result<(), DomainError> {
        let resume = self.resumes.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::ResumeNotFound, format!("Resume not found: {}", id))
        })?;
        resume.purchased = true;
        Ok(())
    }
}

/// Thread-safe, non-persistent implementation of the storage ports.
#[derive(Default)]
pub struct InMemoryBillingStore {
    tables: Mutex<Tables>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a resume, as the editor service would.
    pub fn seed_resume(&self, id: ResumeId, owner: UserId, purchased: bool) {
        self.lock().resumes.insert(
            id,
            ResumeRecord {
                id,
                owner,
                purchased,
            },
        );
    }

    /// Returns all purchases, in no particular order.
    pub fn purchases(&self) -> Vec<Purchase> {
        self.lock().purchases.values().cloned().collect()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Accounts
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl AccountRepository for InMemoryBillingStore {
    async fn provision(&self, account: &Account) -> Result<Account, DomainError> {
        let mut tables = self.lock();
        if let Some(existing) = tables.accounts.values().find(|a| a.user_id == account.user_id) {
            return Ok(existing.clone());
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn find_by_user_id(&self, user_id: &UserId) -> Result<Option<Account>, DomainError> {
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| &a.user_id == user_id)
            .cloned())
    }

    async fn find_by_customer_id(&self, customer_id: &str) -> Result<Option<Account>, DomainError> {
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| a.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn link_customer(&self, id: &AccountId, customer_id: &str) -> Result<(), DomainError> {
        self.lock().account_mut(id)?.link_customer(customer_id);
        Ok(())
    }

    async fn apply_subscription(
        &self,
        id: &AccountId,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<bool, DomainError> {
        Ok(self.lock().account_mut(id)?.apply_subscription(snapshot))
    }

    async fn apply_deletion(
        &self,
        id: &AccountId,
        deletion: &SubscriptionDeletion,
    ) -> Result<bool, DomainError> {
        Ok(self.lock().account_mut(id)?.apply_deletion(deletion))
    }

    async fn record_invoice_paid(&self, id: &AccountId, paid_at: Timestamp) -> Result<(), DomainError> {
        self.lock().account_mut(id)?.record_invoice_paid(paid_at);
        Ok(())
    }

    async fn mark_past_due(&self, id: &AccountId) -> Result<(), DomainError> {
        self.lock().account_mut(id)?.mark_past_due();
        Ok(())
    }

    async fn try_consume_ai_credit(
        &self,
        id: &AccountId,
        expected_status: SubscriptionStatus,
        limit: u32,
    ) -> Result<Option<CreditUsage>, DomainError> {
        let mut tables = self.lock();
        let account = tables.account_mut(id)?;
        Ok(account
            .try_consume_ai_credit(expected_status, limit)
            .map(|used| CreditUsage {
                used,
                reset_at: account.ai_credits_reset_at,
            }))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Purchases and resumes
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl PurchaseRepository for InMemoryBillingStore {
    async fn complete(&self, purchase: &Purchase) -> Result<CompletionOutcome, DomainError> {
        let mut tables = self.lock();
        // Validate first so a missing resume leaves no partial write.
        if !tables.resumes.contains_key(&purchase.resume_id) {
            return Err(DomainError::new(
                ErrorCode::ResumeNotFound,
                format!("Resume not found: {}", purchase.resume_id),
            ));
        }

        let completed_at = purchase.completed_at.unwrap_or_else(Timestamp::now);
        let outcome = match tables.purchases.get_mut(&purchase.payment_intent_id) {
            Some(existing) => completion_outcome(existing.complete(completed_at)),
            None => {
                tables.purchases.insert(
                    purchase.payment_intent_id.clone(),
                    purchase.clone().completed(completed_at),
                );
                CompletionOutcome::Completed
            }
        };
        tables.mark_resume_purchased(&purchase.resume_id)?;
        Ok(outcome)
    }

    async fn record_pending(&self, purchase: &Purchase) -> Result<PendingOutcome, DomainError> {
        let mut tables = self.lock();
        if tables.purchases.contains_key(&purchase.payment_intent_id) {
            return Ok(PendingOutcome::AlreadyRecorded);
        }

        let Some(settled_at) = tables.settled_intents.get(&purchase.payment_intent_id).copied() else {
            tables
                .purchases
                .insert(purchase.payment_intent_id.clone(), purchase.clone());
            return Ok(PendingOutcome::Recorded);
        };

        tables.mark_resume_purchased(&purchase.resume_id)?;
        tables.settled_intents.remove(&purchase.payment_intent_id);
        tables.purchases.insert(
            purchase.payment_intent_id.clone(),
            purchase.clone().completed(settled_at),
        );
        Ok(PendingOutcome::CompletedOnArrival)
    }

    async fn complete_pending(
        &self,
        payment_intent_id: &str,
        completed_at: Timestamp,
    ) -> Result<Option<CompletionOutcome>, DomainError> {
        let mut tables = self.lock();
        let Some(resume_id) = tables.purchases.get(payment_intent_id).map(|p| p.resume_id) else {
            tables
                .settled_intents
                .entry(payment_intent_id.to_string())
                .or_insert(completed_at);
            return Ok(None);
        };
        tables.mark_resume_purchased(&resume_id)?;

        let changed = tables
            .purchases
            .get_mut(payment_intent_id)
            .map(|purchase| purchase.complete(completed_at))
            .unwrap_or(false);
        Ok(Some(completion_outcome(changed)))
    }
}

fn completion_outcome(changed: bool) -> CompletionOutcome {
    if changed {
        CompletionOutcome::Completed
    } else {
        CompletionOutcome::AlreadyCompleted
    }
}

#[async_trait]
impl ResumeCatalog for InMemoryBillingStore {
    async fn find(&self, id: &ResumeId) -> Result<Option<ResumeRecord>, DomainError> {
        Ok(self.lock().resumes.get(id).cloned())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook delivery log
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl WebhookEventRepository for InMemoryBillingStore {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.lock().events.get(event_id).cloned())
    }

    async fn record_outcome(&self, record: &WebhookEventRecord) -> Result<(), DomainError> {
        let mut tables = self.lock();
        match tables.events.get_mut(&record.event_id) {
            Some(existing) => {
                existing.status = record.status;
                existing.last_error = record.last_error.clone();
                existing.payload = record.payload.clone();
                existing.updated_at = record.updated_at;
            }
            None => {
                tables.events.insert(record.event_id.clone(), record.clone());
            }
        }
        Ok(())
    }

    async fn record_failure(&self, record: &WebhookEventRecord) -> Result<Option<u32>, DomainError> {
        let mut tables = self.lock();
        match tables.events.get_mut(&record.event_id) {
            Some(existing) if existing.status.is_settled() => Ok(None),
            Some(existing) => {
                existing.attempts += 1;
                existing.last_error = record.last_error.clone();
                existing.updated_at = record.updated_at;
                Ok(Some(existing.attempts))
            }
            None => {
                let mut inserted = record.clone();
                inserted.status = DeliveryStatus::Failed;
                inserted.attempts = 1;
                tables.events.insert(record.event_id.clone(), inserted);
                Ok(Some(1))
            }
        }
    }

    async fn mark_dead_lettered(&self, event_id: &str) -> Result<(), DomainError> {
        if let Some(existing) = self.lock().events.get_mut(event_id) {
            if existing.status == DeliveryStatus::Failed {
                existing.status = DeliveryStatus::DeadLettered;
                existing.updated_at = Timestamp::now();
            }
        }
        Ok(())
    }

    async fn list_dead_lettered(&self, limit: u32) -> Result<Vec<WebhookEventRecord>, DomainError> {
        let mut parked: Vec<WebhookEventRecord> = self
            .lock()
            .events
            .values()
            .filter(|r| r.status == DeliveryStatus::DeadLettered)
            .cloned()
            .collect();
        parked.sort_by_key(|r| r.first_seen_at);
        parked.truncate(limit as usize);
        Ok(parked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::PurchaseStatus;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn purchase(resume_id: ResumeId, payment_intent: &str) -> Purchase {
        Purchase::pending(user(), resume_id, payment_intent, 499, "usd", Timestamp::now())
    }

    #[tokio::test]
    async fn completing_for_missing_resume_writes_nothing() {
        let store = InMemoryBillingStore::new();
        let p = purchase(ResumeId::new(), "pi_1").completed(Timestamp::now());

        let err = store.complete(&p).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::ResumeNotFound);
        assert!(store.purchases().is_empty());
    }

    #[tokio::test]
    async fn completion_is_idempotent_and_marks_resume() {
        let store = InMemoryBillingStore::new();
        let resume_id = ResumeId::new();
        store.seed_resume(resume_id, user(), false);
        let p = purchase(resume_id, "pi_1").completed(Timestamp::now());

        assert_eq!(store.complete(&p).await.unwrap(), CompletionOutcome::Completed);
        assert_eq!(store.complete(&p).await.unwrap(), CompletionOutcome::AlreadyCompleted);

        assert_eq!(store.purchases().len(), 1);
        assert!(store.find(&resume_id).await.unwrap().unwrap().purchased);
    }

    #[tokio::test]
    async fn pending_never_downgrades_completed() {
        let store = InMemoryBillingStore::new();
        let resume_id = ResumeId::new();
        store.seed_resume(resume_id, user(), false);
        store
            .complete(&purchase(resume_id, "pi_1").completed(Timestamp::now()))
            .await
            .unwrap();

        assert_eq!(
            store.record_pending(&purchase(resume_id, "pi_1")).await.unwrap(),
            PendingOutcome::AlreadyRecorded
        );
        let stored = store.purchases();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, PurchaseStatus::Completed);
    }

    #[tokio::test]
    async fn pending_purchase_completes_on_settlement() {
        let store = InMemoryBillingStore::new();
        let resume_id = ResumeId::new();
        store.seed_resume(resume_id, user(), false);
        assert_eq!(
            store.record_pending(&purchase(resume_id, "pi_1")).await.unwrap(),
            PendingOutcome::Recorded
        );
        assert!(!store.find(&resume_id).await.unwrap().unwrap().purchased);

        let outcome = store.complete_pending("pi_1", Timestamp::now()).await.unwrap();

        assert_eq!(outcome, Some(CompletionOutcome::Completed));
        assert!(store.find(&resume_id).await.unwrap().unwrap().purchased);
        assert_eq!(store.complete_pending("pi_unknown", Timestamp::now()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn settlement_before_pending_record_completes_on_arrival() {
        let store = InMemoryBillingStore::new();
        let resume_id = ResumeId::new();
        store.seed_resume(resume_id, user(), false);
        let settled_at = Timestamp::from_unix_secs(1_704_067_200).unwrap();

        assert_eq!(store.complete_pending("pi_1", settled_at).await.unwrap(), None);
        assert!(store.purchases().is_empty());

        let outcome = store.record_pending(&purchase(resume_id, "pi_1")).await.unwrap();

        assert_eq!(outcome, PendingOutcome::CompletedOnArrival);
        let stored = store.purchases();
        assert_eq!(stored[0].status, PurchaseStatus::Completed);
        assert_eq!(stored[0].completed_at, Some(settled_at));
        assert!(store.find(&resume_id).await.unwrap().unwrap().purchased);
        assert_eq!(
            store.record_pending(&purchase(resume_id, "pi_1")).await.unwrap(),
            PendingOutcome::AlreadyRecorded
        );
    }

    #[tokio::test]
    async fn settled_intent_for_missing_resume_writes_nothing() {
        let store = InMemoryBillingStore::new();
        store.complete_pending("pi_1", Timestamp::now()).await.unwrap();

        let err = store
            .record_pending(&purchase(ResumeId::new(), "pi_1"))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::ResumeNotFound);
        assert!(store.purchases().is_empty());
    }

    #[tokio::test]
    async fn failures_stop_counting_once_settled() {
        let store = InMemoryBillingStore::new();
        let failed = WebhookEventRecord::failed("evt_1", "invoice.paid", "boom", serde_json::json!({}));

        assert_eq!(store.record_failure(&failed).await.unwrap(), Some(1));
        assert_eq!(store.record_failure(&failed).await.unwrap(), Some(2));

        let processed = WebhookEventRecord::processed("evt_1", "invoice.paid", serde_json::json!({}));
        store.record_outcome(&processed).await.unwrap();

        assert_eq!(store.record_failure(&failed).await.unwrap(), None);
        let stored = store.find_by_event_id("evt_1").await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Processed);
        assert_eq!(stored.attempts, 2);
    }
}
