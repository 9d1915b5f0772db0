//! Postgres pool for the billing tables.
//!
//! One pool backs `accounts`, `purchases`, `settled_payment_intents` and
//! `webhook_events`, and reads the editor's `resumes` table. A webhook
//! delivery holds a connection only for its own short transactions, so the
//! pool is sized for concurrent deliveries plus API reads.

use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://` connection URL.
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connections kept open between webhook bursts.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Seconds to wait for a free connection. Must stay below the webhook
    /// handler timeout so a starved delivery fails as a database error.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Pool settings; the caller connects with `.connect(&self.url)`.
    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
    }

    /// Checks the URL scheme, the pool bounds, and that acquiring a
    /// connection cannot outlast `handler_timeout`.
    pub fn validate(&self, handler_timeout: Duration) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("DATABASE__URL"));
        }
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(ValidationError::InvalidPoolSize);
        }
        if self.acquire_timeout_secs == 0
            || Duration::from_secs(self.acquire_timeout_secs) >= handler_timeout
        {
            return Err(ValidationError::AcquireTimeoutTooLong);
        }
        Ok(())
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_idle_timeout_secs() -> u64 {
    300
}
