//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `RESUME_BILLING` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use resume_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr().unwrap());
//! ```

mod billing;
mod database;
mod error;
mod payment;
mod server;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{LogFormat, ServerConfig};

use serde::Deserialize;

use crate::adapters::http::BillingRules;
use crate::application::handlers::billing::WebhookSettings;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Listener and logging
    #[serde(default)]
    pub server: ServerConfig,

    /// Postgres pool
    pub database: DatabaseConfig,

    /// Payment configuration (Stripe)
    pub payment: PaymentConfig,

    /// Trial, grace, quota and webhook settings
    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `RESUME_BILLING` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `RESUME_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `RESUME_BILLING__BILLING__TRIAL_DAYS=30` -> `billing.trial_days = 30`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("RESUME_BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.billing.validate()?;
        let handler_timeout = self.billing.webhook_handler_timeout();
        self.server.validate(handler_timeout)?;
        self.database.validate(handler_timeout)?;
        self.payment.validate()?;
        Ok(())
    }

    pub fn webhook_settings(&self) -> WebhookSettings {
        WebhookSettings {
            handler_timeout: self.billing.webhook_handler_timeout(),
            max_delivery_attempts: self.billing.max_delivery_attempts,
            require_livemode: self.payment.require_livemode,
        }
    }

    pub fn billing_rules(&self) -> BillingRules {
        BillingRules {
            trial_days: self.billing.trial_days,
            entitlement: self.billing.entitlement_policy(),
            quota: self.billing.quota_policy(),
            webhook: self.webhook_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const MINIMAL_ENV: &[(&str, &str)] = &[
        ("RESUME_BILLING__DATABASE__URL", "postgresql://test@localhost/test"),
        ("RESUME_BILLING__PAYMENT__STRIPE_API_KEY", "sk_test_xxx"),
        ("RESUME_BILLING__PAYMENT__STRIPE_WEBHOOK_SECRET", "whsec_xxx"),
        ("RESUME_BILLING__PAYMENT__STRIPE_MONTHLY_PRICE_ID", "price_month"),
        ("RESUME_BILLING__PAYMENT__STRIPE_YEARLY_PRICE_ID", "price_year"),
        ("RESUME_BILLING__PAYMENT__STRIPE_PER_CV_PRICE_ID", "price_cv"),
    ];

    const OPTIONAL_ENV: &[&str] = &[
        "RESUME_BILLING__SERVER__PORT",
        "RESUME_BILLING__SERVER__LOG_FORMAT",
        "RESUME_BILLING__DATABASE__ACQUIRE_TIMEOUT_SECS",
        "RESUME_BILLING__BILLING__TRIAL_DAYS",
        "RESUME_BILLING__PAYMENT__REQUIRE_LIVEMODE",
    ];

    /// Helper to set environment variables for testing
    fn set_minimal_env() {
        for (key, value) in MINIMAL_ENV {
            env::set_var(key, value);
        }
    }

    /// Helper to clear environment variables after testing
    fn clear_env() {
        for (key, _) in MINIMAL_ENV {
            env::remove_var(key);
        }
        for key in OPTIONAL_ENV {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.payment.stripe_per_cv_price_id, "price_cv");
    }

    #[test]
    fn test_validate_full_config() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_format, LogFormat::Pretty);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.billing.trial_days, 14);
        assert!(!config.payment.require_livemode);
    }

    #[test]
    fn test_json_logs() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("RESUME_BILLING__SERVER__LOG_FORMAT", "json");
        let result = AppConfig::load();
        clear_env();

        assert_eq!(result.unwrap().server.log_format, LogFormat::Json);
    }

    #[test]
    fn test_acquire_timeout_checked_against_handler_timeout() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("RESUME_BILLING__DATABASE__ACQUIRE_TIMEOUT_SECS", "30");
        let result = AppConfig::load();
        clear_env();

        assert!(matches!(
            result.unwrap().validate(),
            Err(ValidationError::AcquireTimeoutTooLong)
        ));
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("RESUME_BILLING__SERVER__PORT", "3000");
        env::set_var("RESUME_BILLING__BILLING__TRIAL_DAYS", "30");
        env::set_var("RESUME_BILLING__PAYMENT__REQUIRE_LIVEMODE", "true");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.billing.trial_days, 30);
        let rules = config.billing_rules();
        assert_eq!(rules.trial_days, 30);
        assert!(rules.webhook.require_livemode);
    }
}
