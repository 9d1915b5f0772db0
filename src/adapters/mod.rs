//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing core to external systems:
//! - `http` - Axum routes, extractors and middleware
//! - `memory` - In-memory stores for tests and local development
//! - `postgres` - PostgreSQL repositories (sqlx)
//! - `stripe` - Stripe REST client and a recording mock

pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
