//! CheckAccessHandler - entitlement queries.
//!
//! Decisions are recomputed from stored state on every call. Nothing here
//! writes subscription state; the only write is provisioning a missing
//! account on the interactive path.

use std::sync::Arc;

use crate::domain::billing::{AccessDecision, Account, BillingError, EntitlementPolicy};
use crate::domain::foundation::{ResumeId, Timestamp, UserId};
use crate::ports::{AccountRepository, ResumeCatalog};

use super::provision_account::{ProvisionAccountCommand, ProvisionAccountHandler};

/// Query for the caller's access decision.
#[derive(Debug, Clone)]
pub struct CheckAccessQuery {
    pub user_id: UserId,
    pub at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CheckAccessResult {
    pub account: Account,
    pub decision: AccessDecision,
}

#[derive(Clone)]
pub struct CheckAccessHandler {
    accounts: Arc<dyn AccountRepository>,
    resumes: Arc<dyn ResumeCatalog>,
    provisioner: ProvisionAccountHandler,
    policy: EntitlementPolicy,
}

impl CheckAccessHandler {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        resumes: Arc<dyn ResumeCatalog>,
        provisioner: ProvisionAccountHandler,
        policy: EntitlementPolicy,
    ) -> Self {
        Self {
            accounts,
            resumes,
            provisioner,
            policy,
        }
    }

    /// Provisions the caller on first contact, then evaluates.
    pub async fn handle(&self, query: CheckAccessQuery) -> Result<CheckAccessResult, BillingError> {
        let account = self
            .provisioner
            .handle(ProvisionAccountCommand {
                user_id: query.user_id,
                at: query.at,
            })
            .await?;
        let decision = account.access_decision(query.at, &self.policy);
        Ok(CheckAccessResult { account, decision })
    }

    /// Read-only decision; a principal without an account gets level `none`.
    pub async fn decision_for(
        &self,
        user_id: &UserId,
        at: Timestamp,
    ) -> Result<AccessDecision, BillingError> {
        Ok(match self.accounts.find_by_user_id(user_id).await? {
            Some(account) => account.access_decision(at, &self.policy),
            None => AccessDecision::none(),
        })
    }

    /// Fast path for request guards.
    pub async fn is_expired(&self, user_id: &UserId, at: Timestamp) -> Result<bool, BillingError> {
        Ok(self.decision_for(user_id, at).await?.is_expired())
    }

    /// Export is allowed by the subscription, or by a one-time purchase of
    /// this particular resume.
    pub async fn can_export_resume(
        &self,
        user_id: &UserId,
        resume_id: &ResumeId,
        at: Timestamp,
    ) -> Result<bool, BillingError> {
        if self.decision_for(user_id, at).await?.can_export {
            return Ok(true);
        }
        let resume = self
            .resumes
            .find(resume_id)
            .await?
            .ok_or(BillingError::ResumeNotFound(*resume_id))?;
        Ok(resume.is_owned_by(user_id) && resume.purchased)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::domain::billing::{AccessLevel, SubscriptionSnapshot, SubscriptionStatus};

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn handler(store: Arc<InMemoryBillingStore>) -> CheckAccessHandler {
        CheckAccessHandler::new(
            store.clone(),
            store.clone(),
            ProvisionAccountHandler::new(store, 14),
            EntitlementPolicy::default(),
        )
    }

    #[tokio::test]
    async fn first_contact_grants_a_full_trial() {
        let store = Arc::new(InMemoryBillingStore::new());
        let t0 = Timestamp::now();

        let result = handler(store)
            .handle(CheckAccessQuery { user_id: user(), at: t0 })
            .await
            .unwrap();

        assert_eq!(result.decision.level, AccessLevel::Trial);
        assert_eq!(result.decision.days_remaining, 14);
        assert!(result.decision.can_edit && result.decision.can_export && result.decision.can_use_ai);
    }

    #[tokio::test]
    async fn read_only_path_does_not_provision() {
        let store = Arc::new(InMemoryBillingStore::new());
        let handler = handler(store.clone());

        let decision = handler.decision_for(&user(), Timestamp::now()).await.unwrap();

        assert_eq!(decision.level, AccessLevel::None);
        assert!(!handler.is_expired(&user(), Timestamp::now()).await.unwrap());
        assert!(store.find_by_user_id(&user()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn trial_ends_after_fourteen_days() {
        let store = Arc::new(InMemoryBillingStore::new());
        let handler = handler(store);
        let t0 = Timestamp::now();
        handler
            .handle(CheckAccessQuery { user_id: user(), at: t0 })
            .await
            .unwrap();

        assert!(!handler.is_expired(&user(), t0.plus_days(13)).await.unwrap());
        assert!(handler.is_expired(&user(), t0.plus_days(15)).await.unwrap());
    }

    #[tokio::test]
    async fn purchased_resume_is_exportable_after_expiry() {
        let store = Arc::new(InMemoryBillingStore::new());
        let handler = handler(store.clone());
        let t0 = Timestamp::now();
        handler
            .handle(CheckAccessQuery { user_id: user(), at: t0 })
            .await
            .unwrap();
        let bought = ResumeId::new();
        let other = ResumeId::new();
        store.seed_resume(bought, user(), true);
        store.seed_resume(other, user(), false);

        let later = t0.plus_days(30);
        assert!(handler.can_export_resume(&user(), &bought, later).await.unwrap());
        assert!(!handler.can_export_resume(&user(), &other, later).await.unwrap());
    }

    #[tokio::test]
    async fn past_due_keeps_editing_but_not_export() {
        let store = Arc::new(InMemoryBillingStore::new());
        let handler = handler(store.clone());
        let t0 = Timestamp::now();
        let result = handler
            .handle(CheckAccessQuery { user_id: user(), at: t0 })
            .await
            .unwrap();
        store
            .apply_subscription(
                &result.account.id,
                &SubscriptionSnapshot {
                    subscription_id: "sub_1".into(),
                    status: SubscriptionStatus::PastDue,
                    current_period_end: Some(t0),
                    observed_at: t0,
                },
            )
            .await
            .unwrap();

        let decision = handler.decision_for(&user(), t0.plus_days(6)).await.unwrap();
        assert_eq!(decision.level, AccessLevel::Trial);
        assert!(decision.can_edit);
        assert!(!decision.can_export);
    }
}
