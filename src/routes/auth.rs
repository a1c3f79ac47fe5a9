use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    if !email.contains('@') {
        return Err(AppError::Validation("invalid email address".to_string()));
    }
    if password.len() < 6 {
        return Err(AppError::Validation(
            "password must be at least 6 characters".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/signup
pub async fn sign_up(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<SignUpRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_credentials(&request.email, &request.password)?;

    let pair = context.tokens.sign_up(&request.email, &request.password).await?;
    Ok((StatusCode::CREATED, Json(pair)))
}

/// POST /api/login
pub async fn login(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = context.tokens.login(&request.email, &request.password).await?;
    Ok(Json(pair))
}

/// POST /api/refresh
///
/// Rotates the presented refresh token. The old token is consumed on any
/// outcome past lookup, so a replayed token always fails.
pub async fn refresh(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = context.tokens.refresh(&request.refresh_token).await?;
    Ok(Json(pair))
}

/// GET /api/profile
pub async fn profile(
    State(context): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let user = context.tokens.profile(user_id).await?;
    Ok(Json(user))
}
