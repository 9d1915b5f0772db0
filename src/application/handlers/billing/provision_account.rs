//! ProvisionAccountHandler - creates the trial account on first contact.

use std::sync::Arc;

use crate::domain::billing::{Account, BillingError};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::AccountRepository;

#[derive(Debug, Clone)]
pub struct ProvisionAccountCommand {
    pub user_id: UserId,
    pub at: Timestamp,
}

/// Idempotent: a principal that already has an account gets it back unchanged.
#[derive(Clone)]
pub struct ProvisionAccountHandler {
    accounts: Arc<dyn AccountRepository>,
    trial_days: i64,
}

impl ProvisionAccountHandler {
    pub fn new(accounts: Arc<dyn AccountRepository>, trial_days: i64) -> Self {
        Self {
            accounts,
            trial_days,
        }
    }

    pub async fn handle(&self, cmd: ProvisionAccountCommand) -> Result<Account, BillingError> {
        if let Some(existing) = self.accounts.find_by_user_id(&cmd.user_id).await? {
            return Ok(existing);
        }

        let candidate = Account::provision(cmd.user_id, cmd.at, self.trial_days);
        let stored = self.accounts.provision(&candidate).await?;
        if stored.id == candidate.id {
            tracing::info!(
                account_id = %stored.id,
                user_id = %stored.user_id,
                trial_ends_at = %stored.trial_ends_at,
                "Provisioned trial account"
            );
        }
        Ok(stored)
    }
}
