//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Host and port do not form a socket address")]
    InvalidBindAddress,

    #[error("Request or webhook handler timeout out of range")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool needs max_connections >= min_connections and at least one connection")]
    InvalidPoolSize,

    #[error("Connection acquire timeout must be positive and below the webhook handler timeout")]
    AcquireTimeoutTooLong,

    #[error("Invalid Stripe API key format")]
    InvalidStripeKey,

    #[error("Invalid Stripe webhook secret format")]
    InvalidStripeWebhookSecret,

    #[error("Invalid Stripe price ID: {0}")]
    InvalidPriceId(&'static str),

    #[error("Checkout redirect URLs must be absolute")]
    InvalidRedirectUrl,

    #[error("Trial and grace lengths cannot be negative")]
    NegativeDuration,

    #[error("Signature tolerance must be positive")]
    InvalidSignatureTolerance,

    #[error("Max delivery attempts must be at least 1")]
    InvalidDeliveryAttempts,
}
