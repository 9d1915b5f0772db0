//! Entitlement guard for protected routes.
//!
//! Rejects principals whose access has fully expired with 402 Payment
//! Required before the handler runs. Finer checks (export, AI) stay in the
//! handlers, which have the context to decide.
//!
//! # Example
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/billing/credits/consume", post(consume_ai_credit))
//!     .route_layer(middleware::from_fn_with_state(access_handler, require_access));
//! ```

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::handlers::billing::CheckAccessHandler;
use crate::domain::foundation::Timestamp;

use super::auth::{principal_from_headers, AuthRejection};

pub async fn require_access(
    State(access): State<CheckAccessHandler>,
    request: Request,
    next: Next,
) -> Response {
    let Some(user_id) = principal_from_headers(request.headers()) else {
        return AuthRejection::Unauthenticated.into_response();
    };

    match access.is_expired(&user_id, Timestamp::now()).await {
        Ok(false) => next.run(request).await,
        Ok(true) => {
            tracing::debug!(user_id = %user_id, "Blocked request from expired account");
            (
                StatusCode::PAYMENT_REQUIRED,
                Json(serde_json::json!({
                    "error": "Your access has expired",
                    "code": "ACCESS_EXPIRED"
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Entitlement check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": e.message(),
                    "code": e.code()
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use tower::ServiceExt;

    use crate::adapters::memory::InMemoryBillingStore;
    use crate::application::handlers::billing::ProvisionAccountHandler;
    use crate::domain::billing::{Account, EntitlementPolicy};
    use crate::domain::foundation::UserId;
    use crate::ports::AccountRepository;

    fn app(store: Arc<InMemoryBillingStore>) -> Router {
        let access = CheckAccessHandler::new(
            store.clone(),
            store.clone(),
            ProvisionAccountHandler::new(store, 14),
            EntitlementPolicy::default(),
        );
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(access, require_access))
    }

    fn request(user: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().uri("/protected");
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn trial_account_passes() {
        let store = Arc::new(InMemoryBillingStore::new());
        store
            .provision(&Account::provision(UserId::new("fresh").unwrap(), Timestamp::now(), 14))
            .await
            .unwrap();

        let response = app(store).oneshot(request(Some("fresh"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn expired_trial_is_payment_required() {
        let store = Arc::new(InMemoryBillingStore::new());
        let long_ago = Timestamp::now().plus_days(-30);
        store
            .provision(&Account::provision(UserId::new("lapsed").unwrap(), long_ago, 14))
            .await
            .unwrap();

        let response = app(store).oneshot(request(Some("lapsed"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn missing_principal_is_unauthorized() {
        let store = Arc::new(InMemoryBillingStore::new());
        let response = app(store).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
