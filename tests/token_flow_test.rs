// End-to-end token lifecycle over the in-memory store: signup issues a
// pair, refresh rotates it, and a replayed refresh token is rejected.

use std::sync::Arc;
use std::time::Duration;

use brokerapp::auth::AuthManager;
use brokerapp::config::TokenConfig;
use brokerapp::error::AppError;
use brokerapp::service::TokenService;
use brokerapp::store::memory::MemoryUserStore;

fn service() -> TokenService {
    let auth = AuthManager::new(&TokenConfig {
        secret: "integration-secret".to_string(),
        access_ttl: Duration::from_secs(300),
        refresh_ttl: Duration::from_secs(86_400),
    });
    TokenService::new(Arc::new(MemoryUserStore::new()), Arc::new(auth))
}

#[tokio::test]
async fn full_token_lifecycle() {
    let svc = service();

    // Signup issues a fresh pair.
    let first = svc.sign_up("trader@example.com", "hunter22").await.unwrap();
    assert!(!first.access_token.is_empty());

    // Refresh rotates to a new, distinct pair.
    let second = svc.refresh(&first.refresh_token).await.unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_ne!(second.access_token, first.access_token);

    // The consumed token no longer works.
    assert!(matches!(
        svc.refresh(&first.refresh_token).await,
        Err(AppError::RefreshTokenNotFound)
    ));

    // The new one does, exactly once.
    let third = svc.refresh(&second.refresh_token).await.unwrap();
    assert!(matches!(
        svc.refresh(&second.refresh_token).await,
        Err(AppError::RefreshTokenNotFound)
    ));
    assert_ne!(third.refresh_token, second.refresh_token);
}

#[tokio::test]
async fn login_after_signup_reuses_credentials() {
    let svc = service();
    svc.sign_up("trader@example.com", "hunter22").await.unwrap();

    let pair = svc.login("trader@example.com", "hunter22").await.unwrap();
    svc.refresh(&pair.refresh_token).await.unwrap();

    assert!(matches!(
        svc.login("trader@example.com", "wrong-pw").await,
        Err(AppError::InvalidCredentials)
    ));
}
