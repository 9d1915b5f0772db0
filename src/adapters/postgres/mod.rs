//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresAccountRepository` - Billing accounts with guarded updates
//! - `PostgresPurchaseRepository` - Purchases, transactional with the resume flag
//! - `PostgresResumeCatalog` - Read-only resume ownership lookups
//! - `PostgresWebhookEventRepository` - Stripe delivery log and dead letters

mod account_repository;
mod purchase_repository;
mod webhook_event_repository;

pub use account_repository::PostgresAccountRepository;
pub use purchase_repository::{PostgresPurchaseRepository, PostgresResumeCatalog};
pub use webhook_event_repository::PostgresWebhookEventRepository;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Maps a sqlx failure to a database error naming the operation.
pub(super) fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", operation, e))
}
