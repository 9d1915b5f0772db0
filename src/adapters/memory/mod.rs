//! In-memory adapters for tests and local development.

mod billing_store;

pub use billing_store::InMemoryBillingStore;
