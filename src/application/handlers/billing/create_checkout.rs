//! CreateCheckoutHandler - starts a Stripe checkout for a subscription or a
//! single resume.
//!
//! Resume ownership is checked before anything is created at Stripe. The
//! Stripe customer is created on first checkout and linked to the account
//! so later webhooks can be matched back by customer reference.

use std::sync::Arc;

use crate::domain::billing::{BillingError, PriceType};
use crate::domain::foundation::{ResumeId, Timestamp, UserId};
use crate::ports::{
    AccountRepository, CreateCheckoutRequest, CreateCustomerRequest, PaymentProvider,
    ResumeCatalog,
};

use super::provision_account::{ProvisionAccountCommand, ProvisionAccountHandler};

/// Price ids and redirect targets for hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutCatalog {
    pub monthly_price_id: String,
    pub yearly_price_id: String,
    pub per_cv_price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutCatalog {
    pub fn price_id(&self, price_type: PriceType) -> &str {
        match price_type {
            PriceType::Monthly => &self.monthly_price_id,
            PriceType::Yearly => &self.yearly_price_id,
            PriceType::PerCv => &self.per_cv_price_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub user_id: UserId,
    pub email: Option<String>,
    pub price_type: PriceType,
    pub resume_id: Option<ResumeId>,
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutResult {
    pub session_id: String,
    pub url: String,
}

pub struct CreateCheckoutHandler {
    accounts: Arc<dyn AccountRepository>,
    resumes: Arc<dyn ResumeCatalog>,
    payments: Arc<dyn PaymentProvider>,
    provisioner: ProvisionAccountHandler,
    catalog: CheckoutCatalog,
}

impl CreateCheckoutHandler {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        resumes: Arc<dyn ResumeCatalog>,
        payments: Arc<dyn PaymentProvider>,
        provisioner: ProvisionAccountHandler,
        catalog: CheckoutCatalog,
    ) -> Self {
        Self {
            accounts,
            resumes,
            payments,
            provisioner,
            catalog,
        }
    }

    pub async fn handle(&self, cmd: CreateCheckoutCommand) -> Result<CreateCheckoutResult, BillingError> {
        // 1. Validate the purchase target
        let resume_id = if cmd.price_type.requires_resume() {
            let resume_id = cmd.resume_id.ok_or(BillingError::ResumeRequired)?;
            self.verify_resume(&cmd.user_id, resume_id).await?;
            Some(resume_id)
        } else {
            None
        };

        // 2. Make sure the account exists and has a Stripe customer
        let account = self
            .provisioner
            .handle(ProvisionAccountCommand {
                user_id: cmd.user_id.clone(),
                at: Timestamp::now(),
            })
            .await?;

        let customer_id = match account.stripe_customer_id {
            Some(customer_id) => customer_id,
            None => {
                let customer = self
                    .payments
                    .create_customer(CreateCustomerRequest {
                        user_id: cmd.user_id.clone(),
                        email: cmd.email.clone(),
                        idempotency_key: Some(format!("customer-{}", cmd.user_id)),
                    })
                    .await?;
                self.accounts.link_customer(&account.id, &customer.id).await?;
                tracing::info!(
                    account_id = %account.id,
                    customer_id = %customer.id,
                    "Linked Stripe customer"
                );
                customer.id
            }
        };

        // 3. Create the hosted session
        let session = self
            .payments
            .create_checkout_session(CreateCheckoutRequest {
                customer_id,
                price_id: self.catalog.price_id(cmd.price_type).to_string(),
                mode: cmd.price_type.checkout_mode(),
                user_id: cmd.user_id.clone(),
                resume_id,
                success_url: self.catalog.success_url.clone(),
                cancel_url: self.catalog.cancel_url.clone(),
            })
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            price_type = cmd.price_type.as_str(),
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(CreateCheckoutResult {
            session_id: session.id,
            url: session.url,
        })
    }

    async fn verify_resume(&self, user_id: &UserId, resume_id: ResumeId) -> Result<(), BillingError> {
        let resume = self
            .resumes
            .find(&resume_id)
            .await?
            .ok_or(BillingError::ResumeNotFound(resume_id))?;
        if !resume.is_owned_by(user_id) {
            tracing::warn!(user_id = %user_id, resume_id = %resume_id, "Checkout for resume owned by another user");
            return Err(BillingError::ResumeNotOwned(resume_id));
        }
        if resume.purchased {
            return Err(BillingError::ResumeAlreadyPurchased(resume_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingStore;
    use crate::adapters::stripe::MockPaymentProvider;
    use crate::domain::billing::CheckoutMode;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    fn catalog() -> CheckoutCatalog {
        CheckoutCatalog {
            monthly_price_id: "price_monthly".into(),
            yearly_price_id: "price_yearly".into(),
            per_cv_price_id: "price_cv".into(),
            success_url: "https://app.test/billing/success".into(),
            cancel_url: "https://app.test/billing/cancel".into(),
        }
    }

    fn handler(
        store: Arc<InMemoryBillingStore>,
        payments: Arc<MockPaymentProvider>,
    ) -> CreateCheckoutHandler {
        CreateCheckoutHandler::new(
            store.clone(),
            store.clone(),
            payments,
            ProvisionAccountHandler::new(store, 14),
            catalog(),
        )
    }

    fn command(price_type: PriceType, resume_id: Option<ResumeId>) -> CreateCheckoutCommand {
        CreateCheckoutCommand {
            user_id: user(),
            email: Some("user@example.com".into()),
            price_type,
            resume_id,
        }
    }

    #[tokio::test]
    async fn subscription_checkout_creates_and_links_customer() {
        let store = Arc::new(InMemoryBillingStore::new());
        let payments = Arc::new(MockPaymentProvider::new());
        let handler = handler(store.clone(), payments.clone());

        let result = handler.handle(command(PriceType::Monthly, None)).await.unwrap();

        assert!(result.url.starts_with("https://"));
        let account = store.find_by_user_id(&user()).await.unwrap().unwrap();
        assert!(account.stripe_customer_id.is_some());

        let sessions = payments.checkout_requests();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].price_id, "price_monthly");
        assert_eq!(sessions[0].mode, CheckoutMode::Subscription);
    }

    #[tokio::test]
    async fn customer_is_created_only_once() {
        let store = Arc::new(InMemoryBillingStore::new());
        let payments = Arc::new(MockPaymentProvider::new());
        let handler = handler(store, payments.clone());

        handler.handle(command(PriceType::Monthly, None)).await.unwrap();
        handler.handle(command(PriceType::Yearly, None)).await.unwrap();

        assert_eq!(payments.customer_count(), 1);
    }

    #[tokio::test]
    async fn per_cv_requires_a_resume() {
        let store = Arc::new(InMemoryBillingStore::new());
        let payments = Arc::new(MockPaymentProvider::new());

        let err = handler(store, payments.clone())
            .handle(command(PriceType::PerCv, None))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::ResumeRequired));
        assert!(payments.checkout_requests().is_empty());
    }

    #[tokio::test]
    async fn per_cv_for_foreign_resume_is_rejected_before_stripe() {
        let store = Arc::new(InMemoryBillingStore::new());
        let payments = Arc::new(MockPaymentProvider::new());
        let resume_id = ResumeId::new();
        store.seed_resume(resume_id, UserId::new("someone-else").unwrap(), false);

        let err = handler(store, payments.clone())
            .handle(command(PriceType::PerCv, Some(resume_id)))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::ResumeNotOwned(_)));
        assert_eq!(payments.customer_count(), 0);
    }

    #[tokio::test]
    async fn per_cv_for_unknown_resume_is_not_found() {
        let store = Arc::new(InMemoryBillingStore::new());
        let payments = Arc::new(MockPaymentProvider::new());

        let err = handler(store, payments)
            .handle(command(PriceType::PerCv, Some(ResumeId::new())))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::ResumeNotFound(_)));
    }

    #[tokio::test]
    async fn per_cv_session_carries_resume_metadata() {
        let store = Arc::new(InMemoryBillingStore::new());
        let payments = Arc::new(MockPaymentProvider::new());
        let resume_id = ResumeId::new();
        store.seed_resume(resume_id, user(), false);

        handler(store, payments.clone())
            .handle(command(PriceType::PerCv, Some(resume_id)))
            .await
            .unwrap();

        let sessions = payments.checkout_requests();
        assert_eq!(sessions[0].mode, CheckoutMode::Payment);
        assert_eq!(sessions[0].resume_id, Some(resume_id));
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_payment_error() {
        let store = Arc::new(InMemoryBillingStore::new());
        let payments = Arc::new(MockPaymentProvider::failing());

        let err = handler(store, payments)
            .handle(command(PriceType::Monthly, None))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::PaymentProvider(_)));
    }
}
