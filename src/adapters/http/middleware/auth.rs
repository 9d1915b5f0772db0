//! Principal extraction for axum.
//!
//! Authentication happens upstream: the gateway validates the session and
//! forwards the principal in the `X-User-Id` header. This module only reads
//! that header.
//!
//! - `RequireAuth` - Extractor that rejects requests without a principal
//! - `principal_from_headers` - Shared lookup used by middleware
//!
//! # Example
//!
//! ```ignore
//! async fn my_handler(RequireAuth(user_id): RequireAuth) -> impl IntoResponse {
//!     format!("Hello, {}!", user_id)
//! }
//! ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::foundation::UserId;

/// Header carrying the authenticated principal.
pub const PRINCIPAL_HEADER: &str = "X-User-Id";

/// Reads the principal from request headers, if present and well-formed.
pub fn principal_from_headers(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| UserId::new(s.trim()).ok())
}

/// Extractor that requires an authenticated principal.
///
/// Returns 401 Unauthorized when the header is missing or empty.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers)
            .map(RequireAuth)
            .ok_or(AuthRejection::Unauthenticated)
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone)]
pub enum AuthRejection {
    /// No principal was forwarded with the request.
    Unauthenticated,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthRejection::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "Authentication required")
            }
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "code": "UNAUTHENTICATED"
            })),
        )
            .into_response()
    }
}
