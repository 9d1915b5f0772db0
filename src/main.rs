//! resume-billing server.
//!
//! `resume-billing` serves the billing API. `resume-billing replay-dead-letters
//! [limit]` re-runs parked webhook deliveries once and exits.

use std::sync::Arc;

use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use axum::{routing::get, Router};
use sqlx::PgPool;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use resume_billing::adapters::http::{billing_router, BillingAppState, BillingStores};
use resume_billing::adapters::postgres::{
    PostgresAccountRepository, PostgresPurchaseRepository, PostgresResumeCatalog,
    PostgresWebhookEventRepository,
};
use resume_billing::adapters::stripe::StripePaymentAdapter;
use resume_billing::application::handlers::billing::ReplayDeadLettersCommand;
use resume_billing::config::{AppConfig, ConfigError, LogFormat, ServerConfig};

const DEFAULT_REPLAY_LIMIT: u32 = 100;

#[derive(Debug, Error)]
enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("replay failed: {0}")]
    Replay(String),
    #[error("usage: resume-billing [replay-dead-letters [limit]]")]
    Usage,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    init_logging(&config.server);
    config.validate().map_err(ConfigError::from)?;

    let pool = connect(&config).await?;
    let stores = BillingStores {
        accounts: Arc::new(PostgresAccountRepository::new(pool.clone())),
        purchases: Arc::new(PostgresPurchaseRepository::new(pool.clone())),
        resumes: Arc::new(PostgresResumeCatalog::new(pool.clone())),
        events: Arc::new(PostgresWebhookEventRepository::new(pool)),
    };

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None => serve(&config, stores).await,
        Some("replay-dead-letters") => {
            let limit = match args.next() {
                Some(raw) => raw.parse().map_err(|_| AppError::Usage)?,
                None => DEFAULT_REPLAY_LIMIT,
            };
            replay(&config, stores, limit).await
        }
        Some(_) => Err(AppError::Usage),
    }
}

fn init_logging(server: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| server.log_filter.clone().into());

    match server.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn connect(config: &AppConfig) -> Result<PgPool, AppError> {
    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    Ok(pool)
}

async fn serve(config: &AppConfig, stores: BillingStores) -> Result<(), AppError> {
    let stripe = config.payment.stripe_config();
    let verifier = stripe.webhook_verifier(config.billing.signature_tolerance_secs);
    let state = BillingAppState::new(
        stores,
        Arc::new(StripePaymentAdapter::new(stripe)),
        verifier,
        config.payment.checkout_catalog(),
        config.billing_rules(),
    );

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", billing_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(cors(&config.server));

    let addr = config.server.socket_addr().map_err(ConfigError::from)?;
    tracing::info!(%addr, live = config.payment.is_live_mode(), "resume-billing listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn cors(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .frontend_origins()
        .into_iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}

async fn replay(config: &AppConfig, stores: BillingStores, limit: u32) -> Result<(), AppError> {
    let handler = stores.replay_handler(&config.billing_rules());
    let result = handler
        .handle(ReplayDeadLettersCommand { limit })
        .await
        .map_err(|e| AppError::Replay(e.to_string()))?;

    tracing::info!(
        replayed = result.replayed,
        skipped = result.skipped,
        still_failing = result.still_failing,
        "Replay complete"
    );
    Ok(())
}
