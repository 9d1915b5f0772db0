//! HTTP middleware for axum.
//!
//! This module contains middleware layers for cross-cutting concerns:
//!
//! - `auth` - Principal extraction from the gateway header
//! - `entitlement` - 402 guard for expired accounts

pub mod auth;
pub mod entitlement;

pub use auth::{principal_from_headers, AuthRejection, RequireAuth, PRINCIPAL_HEADER};
pub use entitlement::require_access;
