use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::store::{RefreshTokenRecord, StoreError, User, UserStore};

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: HashMap<i64, User>,
    tokens: HashMap<String, RefreshTokenRecord>,
}

/// In-memory store for tests. Single mutex, never held across an await.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.users.insert(
            id,
            User {
                id,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.lock()
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }

    async fn store_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.tokens.retain(|_, record| record.user_id != user_id);
        inner.tokens.insert(
            token.to_string(),
            RefreshTokenRecord {
                user_id,
                token: token.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_refresh_token(&self, token: &str) -> Result<RefreshTokenRecord, StoreError> {
        self.lock()
            .tokens
            .get(token)
            .cloned()
            .ok_or(StoreError::RefreshTokenNotFound)
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.lock().tokens.remove(token);
        Ok(())
    }
}
