pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;

use crate::db::GatewayError;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,

    #[error("refresh token not found")]
    RefreshTokenNotFound,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Persistence surface for accounts and refresh tokens. The Postgres
/// implementation routes every query through the breaker-guarded gateway;
/// the in-memory one backs the service tests.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<(), StoreError>;

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError>;

    /// Persist a refresh token, replacing any previous token held by the
    /// same user. At most one refresh token is live per user at a time.
    async fn store_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn get_refresh_token(&self, token: &str) -> Result<RefreshTokenRecord, StoreError>;

    async fn delete_refresh_token(&self, token: &str) -> Result<(), StoreError>;
}
