//! PurchaseRepository port - one-time resume purchases.
//!
//! A purchase is unique by Stripe payment intent. Completing one always
//! sets the resume's `purchased` flag in the same transaction, so no reader
//! can observe one without the other.
//!
//! `payment_intent.succeeded` can arrive before the checkout that records
//! the pending purchase. Settling an intent nobody has recorded yet leaves a
//! settlement marker, and a later `record_pending` for that intent completes
//! on the spot. Both paths serialize per payment intent.

use async_trait::async_trait;

use crate::domain::billing::Purchase;
use crate::domain::foundation::{DomainError, Timestamp};

/// Result of recording a completed purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// This call moved the purchase to completed.
    Completed,
    /// The purchase was already completed; only the resume flag was re-asserted.
    AlreadyCompleted,
}

/// Result of recording a pending purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOutcome {
    /// A new pending purchase was stored.
    Recorded,
    /// The payment intent was already known; nothing changed.
    AlreadyRecorded,
    /// The intent had already settled, so the purchase was stored completed
    /// and its resume marked purchased.
    CompletedOnArrival,
}

#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Atomically upserts `purchase` as completed and marks its resume purchased.
    ///
    /// Fails with `ErrorCode::ResumeNotFound` (and writes nothing) if the
    /// resume does not exist.
    async fn complete(&self, purchase: &Purchase) -> Result<CompletionOutcome, DomainError>;

    /// Inserts a pending purchase. Does nothing if the payment intent is
    /// already known, whatever its status.
    ///
    /// If the intent already settled, the purchase is stored completed at the
    /// settlement time and its resume marked purchased, failing with
    /// `ErrorCode::ResumeNotFound` (and writing nothing) if the resume is gone.
    async fn record_pending(&self, purchase: &Purchase) -> Result<PendingOutcome, DomainError>;

    /// Completes the pending purchase for `payment_intent_id`, marking its
    /// resume purchased in the same transaction.
    ///
    /// Returns `None` if no purchase exists for the intent. The settlement is
    /// then remembered for the next `record_pending` of that intent.
    async fn complete_pending(
        &self,
        payment_intent_id: &str,
        completed_at: Timestamp,
    ) -> Result<Option<CompletionOutcome>, DomainError>;
}
