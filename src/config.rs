use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_SERVER_PORT: u16 = 8080;

// Token lifetimes (in seconds)
const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 300; // 5 minutes
const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 86_400; // 24 hours

// Database pool
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_DB_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_DB_QUERY_DEADLINE_SECS: u64 = 10;

// Circuit breaker
const DEFAULT_BREAKER_MAX_HALF_OPEN_REQUESTS: u32 = 3;
const DEFAULT_BREAKER_RESET_INTERVAL_SECS: u64 = 30;
const DEFAULT_BREAKER_OPEN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BREAKER_TRIP_THRESHOLD: u32 = 3;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// Deadline for a single breaker-mediated database call. Work that
    /// exceeds it is abandoned, not cancelled.
    pub query_deadline: Duration,
}

/// Circuit breaker tuning for the database resource
#[derive(Clone, Debug)]
pub struct BreakerConfig {
    pub max_half_open_requests: u32,
    pub reset_interval: Duration,
    pub open_timeout: Duration,
    /// Strictly more than this many consecutive failures opens the circuit.
    pub trip_threshold: u32,
}

/// JWT signing configuration
#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub db: DbConfig,
    pub breaker: BreakerConfig,
    pub tokens: TokenConfig,
}

impl Config {
    /// Loads configuration from the process environment. Every option has
    /// a default except the database password and the JWT secret.
    pub fn from_env() -> Result<Self> {
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = env_or("DB_HOST", "localhost".to_string())?;
                let port = env_or("DB_PORT", "5432".to_string())?;
                let user = env_or("DB_USER", "postgres".to_string())?;
                let name = env_or("DB_NAME", "brokerapp".to_string())?;
                let password =
                    env::var("DB_PASSWORD").context("DB_PASSWORD (or DATABASE_URL) is required")?;
                format!("postgres://{user}:{password}@{host}:{port}/{name}")
            }
        };

        let secret = env::var("JWT_SECRET").context("JWT_SECRET is required")?;
        if secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }

        let config = Self {
            server_port: env_or("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            database_url,
            db: DbConfig {
                max_connections: env_or("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
                acquire_timeout: secs_env(
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    DEFAULT_DB_ACQUIRE_TIMEOUT_SECS,
                )?,
                idle_timeout: secs_env("DB_IDLE_TIMEOUT_SECS", DEFAULT_DB_IDLE_TIMEOUT_SECS)?,
                query_deadline: secs_env("DB_QUERY_DEADLINE_SECS", DEFAULT_DB_QUERY_DEADLINE_SECS)?,
            },
            breaker: BreakerConfig {
                max_half_open_requests: env_or(
                    "BREAKER_MAX_HALF_OPEN_REQUESTS",
                    DEFAULT_BREAKER_MAX_HALF_OPEN_REQUESTS,
                )?,
                reset_interval: secs_env(
                    "BREAKER_RESET_INTERVAL_SECS",
                    DEFAULT_BREAKER_RESET_INTERVAL_SECS,
                )?,
                open_timeout: secs_env(
                    "BREAKER_OPEN_TIMEOUT_SECS",
                    DEFAULT_BREAKER_OPEN_TIMEOUT_SECS,
                )?,
                trip_threshold: env_or("BREAKER_TRIP_THRESHOLD", DEFAULT_BREAKER_TRIP_THRESHOLD)?,
            },
            tokens: TokenConfig {
                secret,
                access_ttl: secs_env("ACCESS_TOKEN_TTL_SECS", DEFAULT_ACCESS_TOKEN_TTL_SECS)?,
                refresh_ttl: secs_env("REFRESH_TOKEN_TTL_SECS", DEFAULT_REFRESH_TOKEN_TTL_SECS)?,
            },
        };

        tracing::info!(
            server_port = config.server_port,
            db_max_connections = config.db.max_connections,
            query_deadline_secs = config.db.query_deadline.as_secs(),
            breaker_trip_threshold = config.breaker.trip_threshold,
            access_token_ttl_secs = config.tokens.access_ttl.as_secs(),
            refresh_token_ttl_secs = config.tokens.refresh_ttl.as_secs(),
            "configuration loaded"
        );

        Ok(config)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("invalid {key}: {err}")),
        Err(_) => Ok(default),
    }
}

fn secs_env(key: &str, default_secs: u64) -> Result<Duration> {
    Ok(Duration::from_secs(env_or(key, default_secs)?))
}
