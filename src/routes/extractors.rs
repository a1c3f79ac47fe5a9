use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::context::AppContext;
use crate::error::AppError;

/// Identity of the caller, proven by a valid Bearer access token.
///
/// Usage:
/// ```ignore
/// async fn handler(AuthenticatedUser(user_id): AuthenticatedUser, ...) { ... }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub i64);

#[async_trait]
impl FromRequestParts<Arc<AppContext>> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        context: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Auth("missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Auth("authorization header is not a bearer token".to_string()))?;

        let user_id = context.auth.verify_token(token).map_err(|err| {
            tracing::debug!(error = %err, "access token rejected");
            err
        })?;

        Ok(AuthenticatedUser(user_id))
    }
}
