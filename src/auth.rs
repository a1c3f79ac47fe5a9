use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub jti: String, // unique per token
    pub exp: i64,    // expiration time
    pub iat: i64,    // issued at
}

/// Issues and verifies the two token kinds: short-lived access tokens for
/// API calls and longer-lived refresh tokens used only to obtain new
/// pairs. Both are HS256-signed with the service secret; the access token
/// is stateless, the refresh token is also persisted so it can be revoked.
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthManager {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_ttl: Duration::seconds(config.access_ttl.as_secs() as i64),
            refresh_ttl: Duration::seconds(config.refresh_ttl.as_secs() as i64),
        }
    }

    /// Create an access token (short-lived, for REST API calls).
    pub fn create_access_token(&self, user_id: i64) -> Result<String, AppError> {
        let (token, _) = self.sign(user_id, self.access_ttl)?;
        Ok(token)
    }

    /// Create a refresh token (long-lived, persisted for rotation).
    /// Returns the token and its expiry for storage.
    pub fn create_refresh_token(&self, user_id: i64) -> Result<(String, DateTime<Utc>), AppError> {
        self.sign(user_id, self.refresh_ttl)
    }

    fn sign(&self, user_id: i64, ttl: Duration) -> Result<(String, DateTime<Utc>), AppError> {
        let now = Utc::now();
        let exp = now + ttl;
        let claims = Claims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, exp))
    }

    /// Verify a bearer token: signature and expiry. Returns the user id
    /// carried in the `sub` claim.
    pub fn verify_token(&self, token: &str) -> Result<i64, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        data.claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Auth("invalid user id claim".to_string()))
    }
}
