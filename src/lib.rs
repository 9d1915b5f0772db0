//! Resume Billing - Stripe reconciliation and entitlements for the resume builder
//!
//! This crate turns at-least-once, possibly reordered Stripe webhook
//! deliveries into local account and purchase state, and derives the
//! access decision and AI credit quota every protected request relies on.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
