use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use crate::db::GatewayError;
use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
///
/// Covers every failure the request path can surface, with a stable
/// status-code and error-code mapping for the HTTP boundary. Nothing here
/// is fatal to the process; every failure is a returned result.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Authentication =====
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email already exists")]
    EmailAlreadyExists,

    #[error("refresh token not found")]
    RefreshTokenNotFound,

    #[error("token expired")]
    TokenExpired,

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("password hash error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    // ===== Requests =====
    #[error("validation error: {0}")]
    Validation(String),

    #[error("user not found")]
    UserNotFound,

    // ===== Storage =====
    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("database call timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials
            | AppError::RefreshTokenNotFound
            | AppError::TokenExpired
            | AppError::Auth(_)
            | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
            AppError::EmailAlreadyExists => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UserNotFound => StatusCode::NOT_FOUND,
            AppError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Bcrypt(_) | AppError::Database(_) | AppError::Unknown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// User-facing message. Credential failures share one message so the
    /// caller cannot tell a missing account from a wrong password, and
    /// server errors never expose internal detail.
    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidCredentials => "invalid email or password".to_string(),
            AppError::EmailAlreadyExists => "email already exists".to_string(),
            AppError::RefreshTokenNotFound => "refresh token not found".to_string(),
            AppError::TokenExpired => "token expired".to_string(),
            AppError::Auth(msg) => msg.clone(),
            AppError::Jwt(_) => "invalid or expired token".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::UserNotFound => "user not found".to_string(),
            AppError::CircuitOpen(_) => "service temporarily unavailable".to_string(),
            AppError::Timeout => "request timed out".to_string(),
            _ => "internal server error".to_string(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            AppError::RefreshTokenNotFound => "REFRESH_TOKEN_NOT_FOUND",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::Auth(_) => "AUTH_ERROR",
            AppError::Jwt(_) => "JWT_ERROR",
            AppError::Bcrypt(_) => "HASH_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::UserNotFound => "NOT_FOUND",
            AppError::CircuitOpen(_) => "CIRCUIT_OPEN",
            AppError::Timeout => "TIMEOUT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log this error with a level matching its severity.
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(error = %self, error_code = %code, "server error");
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(error = %self, error_code = %code, "authentication failed");
        } else {
            tracing::debug!(error = %self, error_code = %code, "client error");
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        self.log();

        let status = self.status_code();
        let body = json!({
            "error": self.user_message(),
            "error_code": self.error_code(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::CircuitOpen(name) => AppError::CircuitOpen(name),
            GatewayError::DeadlineExceeded(_) => AppError::Timeout,
            GatewayError::Database(err) => AppError::Database(err),
            GatewayError::Task(err) => AppError::Unknown(err.into()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound => AppError::UserNotFound,
            StoreError::RefreshTokenNotFound => AppError::RefreshTokenNotFound,
            StoreError::Gateway(err) => err.into(),
        }
    }
}
