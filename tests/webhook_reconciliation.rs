//! Integration tests for Stripe webhook reconciliation.
//!
//! These tests drive signed deliveries through the full ingestion pipeline:
//! 1. Signature verification and typed parsing
//! 2. Delivery-log deduplication
//! 3. Reconciliation against the stores
//! 4. Entitlement and quota reads of the resulting state
//!
//! Uses the in-memory store so no database or Stripe account is needed.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use secrecy::SecretString;
use serde_json::json;

use resume_billing::adapters::memory::InMemoryBillingStore;
use resume_billing::application::handlers::billing::{
    BillingReconciler, CheckAccessHandler, CheckAccessQuery, ConsumeAiCreditCommand,
    ConsumeAiCreditHandler, ProvisionAccountHandler, ReconcileWebhookCommand,
    ReconcileWebhookHandler, ReplayDeadLettersCommand, ReplayDeadLettersHandler, WebhookAck,
    WebhookSettings,
};
use resume_billing::domain::billing::{
    sign_payload, AccessLevel, Account, BillingError, EntitlementPolicy, PurchaseStatus,
    QuotaPolicy, StripeWebhookVerifier, SubscriptionStatus, DEFAULT_TRIAL_DAYS,
};
use resume_billing::domain::foundation::{ResumeId, Timestamp, UserId};
use resume_billing::ports::{
    AccountRepository, DeliveryStatus, ResumeCatalog, WebhookEventRepository,
};

const SECRET: &str = "whsec_integration_secret";
const T0: i64 = 1_704_067_200;
const DAY: i64 = 86_400;

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Harness {
    store: Arc<InMemoryBillingStore>,
    webhooks: ReconcileWebhookHandler,
    access: CheckAccessHandler,
}

impl Harness {
    fn new() -> Self {
        Self::with_attempts(8)
    }

    fn with_attempts(max_delivery_attempts: u32) -> Self {
        let store = Arc::new(InMemoryBillingStore::new());
        let webhooks = ReconcileWebhookHandler::new(
            StripeWebhookVerifier::new(SecretString::new(SECRET.to_string())),
            store.clone(),
            Arc::new(BillingReconciler::new(store.clone(), store.clone())),
            WebhookSettings {
                handler_timeout: Duration::from_secs(5),
                max_delivery_attempts,
                require_livemode: false,
            },
        );
        let access = CheckAccessHandler::new(
            store.clone(),
            store.clone(),
            ProvisionAccountHandler::new(store.clone(), DEFAULT_TRIAL_DAYS),
            EntitlementPolicy::default(),
        );
        Self {
            store,
            webhooks,
            access,
        }
    }

    /// Provisions `user` at T0 and links it to `customer_id`.
    async fn customer(&self, user: &str, customer_id: &str) -> Account {
        let account = self
            .store
            .provision(&Account::provision(user_id(user), at(T0), DEFAULT_TRIAL_DAYS))
            .await
            .unwrap();
        self.store.link_customer(&account.id, customer_id).await.unwrap();
        account
    }

    async fn deliver(&self, body: &serde_json::Value) -> Result<WebhookAck, String> {
        let payload = serde_json::to_vec(body).unwrap();
        let signature = sign_payload(SECRET, chrono::Utc::now().timestamp(), &payload);
        self.webhooks
            .handle(ReconcileWebhookCommand {
                payload,
                signature: Some(signature),
            })
            .await
            .map_err(|e| e.to_string())
    }

    async fn account(&self, user: &str) -> Account {
        self.store.find_by_user_id(&user_id(user)).await.unwrap().unwrap()
    }
}

fn user_id(raw: &str) -> UserId {
    UserId::new(raw).unwrap()
}

fn at(secs: i64) -> Timestamp {
    Timestamp::from_unix_secs(secs).unwrap()
}

fn event(id: &str, event_type: &str, created: i64, object: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "type": event_type,
        "created": created,
        "livemode": false,
        "data": { "object": object }
    })
}

fn subscription_event(
    id: &str,
    event_type: &str,
    created: i64,
    status: &str,
    period_end: i64,
) -> serde_json::Value {
    event(
        id,
        event_type,
        created,
        json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": status,
            "current_period_end": period_end
        }),
    )
}

fn per_cv_checkout(id: &str, resume_id: ResumeId, payment_status: &str) -> serde_json::Value {
    event(
        id,
        "checkout.session.completed",
        T0,
        json!({
            "id": "cs_1",
            "mode": "payment",
            "customer": "cus_1",
            "payment_intent": "pi_1",
            "payment_status": payment_status,
            "amount_total": 499,
            "currency": "usd",
            "metadata": { "resume_id": resume_id.to_string() }
        }),
    )
}

// =============================================================================
// One-time purchases
// =============================================================================

#[tokio::test]
async fn duplicate_purchase_delivery_yields_one_completed_purchase() {
    let harness = Harness::new();
    let account = harness.customer("user-1", "cus_1").await;
    let resume_id = ResumeId::new();
    harness.store.seed_resume(resume_id, account.user_id.clone(), false);

    let checkout = per_cv_checkout("evt_1", resume_id, "paid");
    assert_eq!(harness.deliver(&checkout).await.unwrap(), WebhookAck::Processed);
    assert_eq!(harness.deliver(&checkout).await.unwrap(), WebhookAck::AlreadyProcessed);

    let purchases = harness.store.purchases();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].status, PurchaseStatus::Completed);
    assert_eq!(purchases[0].amount, 499);
    assert!(harness.store.find(&resume_id).await.unwrap().unwrap().purchased);
}

#[tokio::test]
async fn redelivery_under_a_new_event_id_does_not_duplicate_the_purchase() {
    let harness = Harness::new();
    let account = harness.customer("user-1", "cus_1").await;
    let resume_id = ResumeId::new();
    harness.store.seed_resume(resume_id, account.user_id.clone(), false);

    harness.deliver(&per_cv_checkout("evt_1", resume_id, "paid")).await.unwrap();
    harness.deliver(&per_cv_checkout("evt_2", resume_id, "paid")).await.unwrap();

    assert_eq!(harness.store.purchases().len(), 1);
}

#[tokio::test]
async fn settling_payment_completes_after_pending_checkout() {
    let harness = Harness::new();
    let account = harness.customer("user-1", "cus_1").await;
    let resume_id = ResumeId::new();
    harness.store.seed_resume(resume_id, account.user_id.clone(), false);

    harness.deliver(&per_cv_checkout("evt_1", resume_id, "unpaid")).await.unwrap();
    assert_eq!(harness.store.purchases()[0].status, PurchaseStatus::Pending);
    assert!(!harness.store.find(&resume_id).await.unwrap().unwrap().purchased);

    let settled = event("evt_2", "payment_intent.succeeded", T0 + 120, json!({ "id": "pi_1" }));
    assert_eq!(harness.deliver(&settled).await.unwrap(), WebhookAck::Processed);

    assert_eq!(harness.store.purchases()[0].status, PurchaseStatus::Completed);
    assert!(harness.store.find(&resume_id).await.unwrap().unwrap().purchased);
}

#[tokio::test]
async fn payment_settled_before_unpaid_checkout_still_marks_resume_purchased() {
    let harness = Harness::new();
    let account = harness.customer("user-1", "cus_1").await;
    let resume_id = ResumeId::new();
    harness.store.seed_resume(resume_id, account.user_id.clone(), false);

    let settled = event("evt_2", "payment_intent.succeeded", T0 + 120, json!({ "id": "pi_1" }));
    assert_eq!(harness.deliver(&settled).await.unwrap(), WebhookAck::Ignored);
    assert!(harness.store.purchases().is_empty());

    harness.deliver(&per_cv_checkout("evt_1", resume_id, "unpaid")).await.unwrap();

    let purchases = harness.store.purchases();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].status, PurchaseStatus::Completed);
    assert!(harness.store.find(&resume_id).await.unwrap().unwrap().purchased);
}

#[tokio::test]
async fn async_payment_success_completes_a_pending_purchase() {
    let harness = Harness::new();
    let account = harness.customer("user-1", "cus_1").await;
    let resume_id = ResumeId::new();
    harness.store.seed_resume(resume_id, account.user_id.clone(), false);
    harness.deliver(&per_cv_checkout("evt_1", resume_id, "unpaid")).await.unwrap();

    let mut paid = per_cv_checkout("evt_2", resume_id, "paid");
    paid["type"] = json!("checkout.session.async_payment_succeeded");
    paid["created"] = json!(T0 + 3_600);
    assert_eq!(harness.deliver(&paid).await.unwrap(), WebhookAck::Processed);

    assert_eq!(harness.store.purchases()[0].status, PurchaseStatus::Completed);
    assert!(harness.store.find(&resume_id).await.unwrap().unwrap().purchased);
}

#[tokio::test]
async fn late_pending_checkout_never_downgrades_a_completed_purchase() {
    let harness = Harness::new();
    let account = harness.customer("user-1", "cus_1").await;
    let resume_id = ResumeId::new();
    harness.store.seed_resume(resume_id, account.user_id.clone(), false);

    harness.deliver(&per_cv_checkout("evt_2", resume_id, "paid")).await.unwrap();
    harness.deliver(&per_cv_checkout("evt_1", resume_id, "unpaid")).await.unwrap();

    let purchases = harness.store.purchases();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].status, PurchaseStatus::Completed);
}

#[tokio::test]
async fn purchased_resume_stays_exportable_after_access_expires() {
    let harness = Harness::new();
    let account = harness.customer("user-1", "cus_1").await;
    let resume_id = ResumeId::new();
    harness.store.seed_resume(resume_id, account.user_id.clone(), false);
    harness.deliver(&per_cv_checkout("evt_1", resume_id, "paid")).await.unwrap();

    let after_trial = at(T0 + 30 * DAY);
    assert!(harness.access.is_expired(&account.user_id, after_trial).await.unwrap());
    assert!(harness
        .access
        .can_export_resume(&account.user_id, &resume_id, after_trial)
        .await
        .unwrap());
    assert!(!harness
        .access
        .can_export_resume(&user_id("user-2"), &resume_id, after_trial)
        .await
        .unwrap());
}

// =============================================================================
// Subscriptions and invoices
// =============================================================================

#[tokio::test]
async fn deletion_for_unknown_customer_is_acknowledged_without_writes() {
    let harness = Harness::new();
    harness.customer("user-1", "cus_1").await;

    let deletion = event(
        "evt_1",
        "customer.subscription.deleted",
        T0,
        json!({ "id": "sub_9", "customer": "cus_unknown", "status": "canceled" }),
    );
    assert_eq!(harness.deliver(&deletion).await.unwrap(), WebhookAck::TerminalNoop);

    let account = harness.account("user-1").await;
    assert_eq!(account.status, SubscriptionStatus::Trial);
    assert_eq!(account.stripe_subscription_id, None);

    let record = harness.store.find_by_event_id("evt_1").await.unwrap().unwrap();
    assert_eq!(record.status, DeliveryStatus::Skipped);
}

#[tokio::test]
async fn invoice_paid_resets_ai_credits() {
    let harness = Harness::new();
    harness.customer("user-1", "cus_1").await;
    let consume = ConsumeAiCreditHandler::new(
        harness.store.clone(),
        EntitlementPolicy::default(),
        QuotaPolicy::default(),
    );
    for _ in 0..3 {
        consume
            .handle(ConsumeAiCreditCommand {
                user_id: user_id("user-1"),
                at: at(T0 + DAY),
            })
            .await
            .unwrap();
    }
    assert_eq!(harness.account("user-1").await.ai_credits_used, 3);

    let paid = event(
        "evt_1",
        "invoice.paid",
        T0 + 2 * DAY,
        json!({ "id": "in_1", "customer": "cus_1", "subscription": "sub_1" }),
    );
    assert_eq!(harness.deliver(&paid).await.unwrap(), WebhookAck::Processed);

    let account = harness.account("user-1").await;
    assert_eq!(account.status, SubscriptionStatus::Active);
    assert_eq!(account.ai_credits_used, 0);
    assert_eq!(account.ai_credits_reset_at, Some(at(T0 + 2 * DAY)));
}

#[tokio::test]
async fn payment_failure_degrades_then_expires_access() {
    let harness = Harness::new();
    harness.customer("user-1", "cus_1").await;
    let period_end = T0 + 30 * DAY;

    harness
        .deliver(&subscription_event("evt_1", "customer.subscription.created", T0, "active", period_end))
        .await
        .unwrap();
    let failed = event(
        "evt_2",
        "invoice.payment_failed",
        period_end,
        json!({ "id": "in_1", "customer": "cus_1", "subscription": "sub_1" }),
    );
    assert_eq!(harness.deliver(&failed).await.unwrap(), WebhookAck::Processed);

    let user = user_id("user-1");
    let degraded = harness.access.decision_for(&user, at(period_end + 6 * DAY)).await.unwrap();
    assert_eq!(degraded.level, AccessLevel::Trial);
    assert!(degraded.can_edit);
    assert!(!degraded.can_export);
    assert!(!degraded.can_use_ai);

    let expired = harness.access.decision_for(&user, at(period_end + 8 * DAY)).await.unwrap();
    assert_eq!(expired.level, AccessLevel::Expired);
}

#[tokio::test]
async fn past_due_grace_boundary_is_exact() {
    let harness = Harness::new();
    harness.customer("user-1", "cus_1").await;
    harness
        .deliver(&subscription_event("evt_1", "customer.subscription.updated", T0, "past_due", T0))
        .await
        .unwrap();

    let user = user_id("user-1");
    let inside = harness.access.decision_for(&user, at(T0 + 7 * DAY - 1)).await.unwrap();
    assert_eq!(inside.level, AccessLevel::Trial);
    assert!(!inside.can_export);

    let outside = harness.access.decision_for(&user, at(T0 + 7 * DAY + 1)).await.unwrap();
    assert_eq!(outside.level, AccessLevel::Expired);
}

#[tokio::test]
async fn first_contact_provisions_a_full_trial() {
    let harness = Harness::new();

    let result = harness
        .access
        .handle(CheckAccessQuery {
            user_id: user_id("user-new"),
            at: at(T0),
        })
        .await
        .unwrap();

    assert_eq!(result.account.status, SubscriptionStatus::Trial);
    assert_eq!(result.account.trial_ends_at, at(T0 + 14 * DAY));
    assert_eq!(result.decision.level, AccessLevel::Trial);
    assert_eq!(result.decision.days_remaining, 14);
    assert!(result.decision.can_edit && result.decision.can_export && result.decision.can_use_ai);

    let again = harness
        .access
        .handle(CheckAccessQuery {
            user_id: user_id("user-new"),
            at: at(T0 + DAY),
        })
        .await
        .unwrap();
    assert_eq!(again.account.id, result.account.id);
    assert_eq!(again.account.trial_ends_at, at(T0 + 14 * DAY));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn subscription_updates_converge_in_any_order(
        deliveries in prop::collection::vec((0usize..4, 1i64..365), 1..7)
            .prop_map(|specs| specs.into_iter().enumerate().collect::<Vec<_>>())
            .prop_shuffle()
    ) {
        const STATUSES: [&str; 4] = ["active", "past_due", "canceled", "trialing"];

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (status, period_end) = runtime.block_on(async {
            let harness = Harness::new();
            harness.customer("user-1", "cus_1").await;

            for (seq, (status, days)) in &deliveries {
                let body = subscription_event(
                    &format!("evt_{}", seq),
                    "customer.subscription.updated",
                    T0 + *seq as i64 * 60,
                    STATUSES[*status],
                    T0 + days * DAY,
                );
                harness.deliver(&body).await.unwrap();
            }

            let account = harness.account("user-1").await;
            (account.status, account.current_period_end)
        });

        let (_, (latest_status, latest_days)) = deliveries
            .iter()
            .max_by_key(|(seq, _)| *seq)
            .unwrap();
        prop_assert_eq!(status, SubscriptionStatus::from_stripe(STATUSES[*latest_status]));
        prop_assert_eq!(period_end, Some(at(T0 + latest_days * DAY)));
    }
}

// =============================================================================
// Quota
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumption_never_exceeds_the_limit() {
    let harness = Harness::new();
    harness.customer("user-1", "cus_1").await;
    let consume = Arc::new(ConsumeAiCreditHandler::new(
        harness.store.clone(),
        EntitlementPolicy::default(),
        QuotaPolicy::default(),
    ));

    let tasks: Vec<_> = (0..40)
        .map(|_| {
            let consume = consume.clone();
            tokio::spawn(async move {
                consume
                    .handle(ConsumeAiCreditCommand {
                        user_id: user_id("user-1"),
                        at: at(T0 + DAY),
                    })
                    .await
            })
        })
        .collect();

    let mut reported_used = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Ok(balance) => reported_used.push(balance.used),
            Err(BillingError::QuotaExhausted { limit }) => assert_eq!(limit, 10),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // Each grant reports the counter it wrote, so no two callers see the same balance.
    reported_used.sort_unstable();
    assert_eq!(reported_used, (1..=10).collect::<Vec<u32>>());
    assert_eq!(harness.account("user-1").await.ai_credits_used, 10);
}

// =============================================================================
// Dead letters
// =============================================================================

#[tokio::test]
async fn repeated_retryable_failure_is_parked_then_replayed() {
    let harness = Harness::with_attempts(3);
    let update = event(
        "evt_1",
        "customer.subscription.updated",
        T0,
        json!({
            "id": "sub_1",
            "customer": "cus_late",
            "status": "active",
            "current_period_end": T0 + 30 * DAY
        }),
    );

    for _ in 0..2 {
        assert!(harness.deliver(&update).await.is_err());
    }
    assert_eq!(harness.deliver(&update).await.unwrap(), WebhookAck::DeadLettered);
    assert_eq!(harness.deliver(&update).await.unwrap(), WebhookAck::AlreadyProcessed);

    let parked = harness.store.list_dead_lettered(10).await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].attempts, 3);

    harness.customer("user-late", "cus_late").await;
    let replay = ReplayDeadLettersHandler::new(
        harness.store.clone(),
        Arc::new(BillingReconciler::new(harness.store.clone(), harness.store.clone())),
        Duration::from_secs(5),
    );
    let result = replay.handle(ReplayDeadLettersCommand { limit: 10 }).await.unwrap();

    assert_eq!(result.replayed, 1);
    assert_eq!(result.still_failing, 0);
    assert_eq!(harness.account("user-late").await.status, SubscriptionStatus::Active);
    assert!(harness.store.list_dead_lettered(10).await.unwrap().is_empty());
    let record = harness.store.find_by_event_id("evt_1").await.unwrap().unwrap();
    assert_eq!(record.status, DeliveryStatus::Processed);
}

#[tokio::test]
async fn unhandled_event_types_are_acknowledged() {
    let harness = Harness::new();
    let body = event("evt_1", "customer.created", T0, json!({ "id": "cus_2" }));

    assert_eq!(harness.deliver(&body).await.unwrap(), WebhookAck::Ignored);
}
