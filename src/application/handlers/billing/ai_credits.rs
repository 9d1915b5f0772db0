//! AI credit handlers - the quota ledger's application side.
//!
//! The limit is derived from the subscription status at the moment of the
//! increment. The increment itself is a guarded update on (status, used <
//! limit); when the guard fails the account is re-read and the decision
//! taken again, so a status change racing with consumption never lets the
//! counter pass the limit that applied when it was incremented.

use std::sync::Arc;

use crate::domain::billing::{BillingError, CreditBalance, EntitlementPolicy, QuotaPolicy};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::AccountRepository;

const MAX_CONSUME_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ConsumeAiCreditCommand {
    pub user_id: UserId,
    pub at: Timestamp,
}

pub struct ConsumeAiCreditHandler {
    accounts: Arc<dyn AccountRepository>,
    entitlement: EntitlementPolicy,
    quota: QuotaPolicy,
}

impl ConsumeAiCreditHandler {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        entitlement: EntitlementPolicy,
        quota: QuotaPolicy,
    ) -> Self {
        Self {
            accounts,
            entitlement,
            quota,
        }
    }

    /// Consumes one credit and returns the balance after consumption.
    pub async fn handle(&self, cmd: ConsumeAiCreditCommand) -> Result<CreditBalance, BillingError> {
        for _ in 0..MAX_CONSUME_ATTEMPTS {
            let account = self
                .accounts
                .find_by_user_id(&cmd.user_id)
                .await?
                .ok_or(BillingError::AccountNotFound)?;

            let decision = account.access_decision(cmd.at, &self.entitlement);
            if !decision.can_use_ai {
                return Err(if decision.is_expired() {
                    BillingError::AccessExpired
                } else {
                    BillingError::AiNotAllowed
                });
            }

            let limit = self.quota.limit_for(account.status);
            if account.ai_credits_used >= limit {
                return Err(BillingError::QuotaExhausted { limit });
            }

            if let Some(usage) = self
                .accounts
                .try_consume_ai_credit(&account.id, account.status, limit)
                .await?
            {
                return Ok(CreditBalance::new(limit, usage.used, usage.reset_at));
            }

            tracing::debug!(account_id = %account.id, "AI credit guard failed; re-reading account");
        }

        tracing::warn!(user_id = %cmd.user_id, "AI credit consumption kept racing");
        Err(BillingError::ConcurrentUpdate)
    }
}

pub struct GetCreditBalanceHandler {
    accounts: Arc<dyn AccountRepository>,
    quota: QuotaPolicy,
}

impl GetCreditBalanceHandler {
    pub fn new(accounts: Arc<dyn AccountRepository>, quota: QuotaPolicy) -> Self {
        Self { accounts, quota }
    }

    /// A principal without an account has a zero balance.
    pub async fn handle(&self, user_id: &UserId) -> Result<CreditBalance, BillingError> {
        Ok(match self.accounts.find_by_user_id(user_id).await? {
            Some(account) => account.credit_balance(&self.quota),
            None => CreditBalance::new(0, 0, None),
        })
    }
}
