use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::Db;
use crate::store::{RefreshTokenRecord, StoreError, User, UserStore};

/// Postgres-backed store. Every query goes through the gateway, so it is
/// subject to the shared circuit breaker and the per-query deadline.
#[derive(Clone)]
pub struct PgUserStore {
    db: Db,
}

impl PgUserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<(), StoreError> {
        let email = email.to_string();
        let password_hash = password_hash.to_string();

        self.db
            .run(move |pool| async move {
                sqlx::query("INSERT INTO users (email, password_hash) VALUES ($1, $2)")
                    .bind(&email)
                    .bind(&password_hash)
                    .execute(&pool)
                    .await?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let email = email.to_string();

        self.db
            .run(move |pool| async move {
                sqlx::query_as::<_, User>(
                    "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
                )
                .bind(&email)
                .fetch_optional(&pool)
                .await
            })
            .await?
            .ok_or(StoreError::UserNotFound)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.db
            .run(move |pool| async move {
                sqlx::query_as::<_, User>(
                    "SELECT id, email, password_hash, created_at FROM users WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&pool)
                .await
            })
            .await?
            .ok_or(StoreError::UserNotFound)
    }

    async fn store_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let token = token.to_string();

        // Delete-then-insert in one transaction keeps the one-live-token
        // invariant even when two refreshes race for the same user.
        self.db
            .run(move |pool| async move {
                let mut tx = pool.begin().await?;

                sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query(
                    "INSERT INTO refresh_tokens (user_id, token, expires_at) VALUES ($1, $2, $3)",
                )
                .bind(user_id)
                .bind(&token)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<RefreshTokenRecord, StoreError> {
        let token = token.to_string();

        self.db
            .run(move |pool| async move {
                sqlx::query_as::<_, RefreshTokenRecord>(
                    "SELECT user_id, token, expires_at FROM refresh_tokens WHERE token = $1",
                )
                .bind(&token)
                .fetch_optional(&pool)
                .await
            })
            .await?
            .ok_or(StoreError::RefreshTokenNotFound)
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        let token = token.to_string();

        self.db
            .run(move |pool| async move {
                sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
                    .bind(&token)
                    .execute(&pool)
                    .await?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
