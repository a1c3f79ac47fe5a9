use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::auth::AuthManager;
use crate::error::{AppError, AppResult};
use crate::store::{StoreError, User, UserStore};

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Account and token lifecycle: signup, login, refresh rotation. All
/// credential failures collapse into `InvalidCredentials` so a caller
/// cannot probe which emails are registered.
pub struct TokenService {
    store: Arc<dyn UserStore>,
    auth: Arc<AuthManager>,
}

impl TokenService {
    pub fn new(store: Arc<dyn UserStore>, auth: Arc<AuthManager>) -> Self {
        Self { store, auth }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AppResult<TokenPair> {
        match self.store.get_user_by_email(email).await {
            Ok(_) => return Err(AppError::EmailAlreadyExists),
            Err(StoreError::UserNotFound) => {}
            Err(err) => return Err(err.into()),
        }

        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
        self.store.create_user(email, &password_hash).await?;

        // Re-read so the pair carries the database-assigned id.
        let user = self.store.get_user_by_email(email).await?;

        info!(user_id = user.id, "user signed up");
        self.issue_pair(user.id).await
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<TokenPair> {
        let user = match self.store.get_user_by_email(email).await {
            Ok(user) => user,
            Err(StoreError::UserNotFound) => return Err(AppError::InvalidCredentials),
            Err(err) => return Err(err.into()),
        };

        if !bcrypt::verify(password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        info!(user_id = user.id, "user logged in");
        self.issue_pair(user.id).await
    }

    /// Rotate a refresh token: the presented token is consumed whether or
    /// not the rotation succeeds past validation, so each refresh token
    /// works exactly once.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let record = self.store.get_refresh_token(refresh_token).await?;

        if record.expires_at <= chrono::Utc::now() {
            self.store.delete_refresh_token(refresh_token).await?;
            return Err(AppError::TokenExpired);
        }

        self.store.delete_refresh_token(refresh_token).await?;

        info!(user_id = record.user_id, "refresh token rotated");
        self.issue_pair(record.user_id).await
    }

    pub async fn profile(&self, user_id: i64) -> AppResult<User> {
        Ok(self.store.get_user_by_id(user_id).await?)
    }

    async fn issue_pair(&self, user_id: i64) -> AppResult<TokenPair> {
        let access_token = self.auth.create_access_token(user_id)?;
        let (refresh_token, expires_at) = self.auth.create_refresh_token(user_id)?;

        self.store
            .store_refresh_token(user_id, &refresh_token, expires_at)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::store::memory::MemoryUserStore;
    use std::time::Duration;

    fn service() -> TokenService {
        let auth = AuthManager::new(&TokenConfig {
            secret: "test-secret".to_string(),
            access_ttl: Duration::from_secs(300),
            refresh_ttl: Duration::from_secs(3600),
        });
        TokenService::new(Arc::new(MemoryUserStore::new()), Arc::new(auth))
    }

    #[tokio::test]
    async fn sign_up_issues_a_usable_pair() {
        let svc = service();
        let pair = svc.sign_up("a@example.com", "secret1").await.unwrap();

        assert!(!pair.access_token.is_empty());
        assert!(!pair.refresh_token.is_empty());
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[tokio::test]
    async fn sign_up_rejects_duplicate_email() {
        let svc = service();
        svc.sign_up("a@example.com", "secret1").await.unwrap();

        assert!(matches!(
            svc.sign_up("a@example.com", "other-pw").await,
            Err(AppError::EmailAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn login_with_correct_password_succeeds() {
        let svc = service();
        svc.sign_up("a@example.com", "secret1").await.unwrap();

        let pair = svc.login("a@example.com", "secret1").await.unwrap();
        assert!(!pair.refresh_token.is_empty());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_are_indistinguishable() {
        let svc = service();
        svc.sign_up("a@example.com", "secret1").await.unwrap();

        let wrong_pw = svc.login("a@example.com", "bad").await.unwrap_err();
        let unknown = svc.login("nobody@example.com", "bad").await.unwrap_err();

        assert!(matches!(wrong_pw, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong_pw.user_message(), unknown.user_message());
    }

    #[tokio::test]
    async fn refresh_rotates_to_a_distinct_pair() {
        let svc = service();
        let first = svc.sign_up("a@example.com", "secret1").await.unwrap();

        let second = svc.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_ne!(first.access_token, second.access_token);
    }

    #[tokio::test]
    async fn refresh_token_is_single_use() {
        let svc = service();
        let first = svc.sign_up("a@example.com", "secret1").await.unwrap();

        svc.refresh(&first.refresh_token).await.unwrap();

        assert!(matches!(
            svc.refresh(&first.refresh_token).await,
            Err(AppError::RefreshTokenNotFound)
        ));
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_rejected() {
        let svc = service();

        assert!(matches!(
            svc.refresh("no-such-token").await,
            Err(AppError::RefreshTokenNotFound)
        ));
    }

    #[tokio::test]
    async fn expired_refresh_token_is_consumed() {
        let svc = service();
        let pair = svc.sign_up("a@example.com", "secret1").await.unwrap();

        // Age the stored record past its expiry.
        let record = svc
            .store
            .get_refresh_token(&pair.refresh_token)
            .await
            .unwrap();
        svc.store
            .store_refresh_token(
                record.user_id,
                &pair.refresh_token,
                chrono::Utc::now() - chrono::Duration::seconds(1),
            )
            .await
            .unwrap();

        assert!(matches!(
            svc.refresh(&pair.refresh_token).await,
            Err(AppError::TokenExpired)
        ));
        // Consumed: a second attempt no longer finds it.
        assert!(matches!(
            svc.refresh(&pair.refresh_token).await,
            Err(AppError::RefreshTokenNotFound)
        ));
    }

    #[tokio::test]
    async fn login_replaces_the_previous_refresh_token() {
        let svc = service();
        let first = svc.sign_up("a@example.com", "secret1").await.unwrap();
        let second = svc.login("a@example.com", "secret1").await.unwrap();

        // At most one live refresh token per user: the older one is gone.
        assert!(matches!(
            svc.refresh(&first.refresh_token).await,
            Err(AppError::RefreshTokenNotFound)
        ));
        svc.refresh(&second.refresh_token).await.unwrap();
    }

    #[tokio::test]
    async fn profile_returns_the_account() {
        let svc = service();
        svc.sign_up("a@example.com", "secret1").await.unwrap();
        let user = svc.store.get_user_by_email("a@example.com").await.unwrap();

        let profile = svc.profile(user.id).await.unwrap();
        assert_eq!(profile.email, "a@example.com");

        assert!(matches!(
            svc.profile(9999).await,
            Err(AppError::UserNotFound)
        ));
    }
}
