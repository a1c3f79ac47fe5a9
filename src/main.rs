// ============================================================================
// Brokerage Backend
// ============================================================================
//
// REST backend for a small brokerage:
// - Account signup / login / token refresh (JWT pairs, rotated refresh)
// - Holdings, orderbook and positions per account
// - Postgres access guarded by a circuit breaker and per-query deadline
//
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brokerapp::auth::AuthManager;
use brokerapp::breaker::CircuitBreaker;
use brokerapp::config::Config;
use brokerapp::context::AppContext;
use brokerapp::db::{self, Db};
use brokerapp::routes::create_router;
use brokerapp::service::TokenService;
use brokerapp::store::postgres::PgUserStore;
use brokerapp::store::UserStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    info!("connecting to database...");
    let pool = db::connect(&config.database_url, &config.db)
        .await
        .context("failed to initialize database")?;
    info!("connected to database");

    let breaker = CircuitBreaker::builder("postgres-db")
        .max_half_open_requests(config.breaker.max_half_open_requests)
        .reset_interval(config.breaker.reset_interval)
        .open_timeout(config.breaker.open_timeout)
        .trip_when({
            let threshold = config.breaker.trip_threshold;
            move |counts| counts.consecutive_failures > threshold
        })
        .on_state_change(|name, from, to| {
            tracing::warn!(breaker = name, %from, %to, "circuit breaker state changed");
        })
        .build();

    let db = Db::new(pool, Arc::new(breaker), config.db.query_deadline);

    let auth = Arc::new(AuthManager::new(&config.tokens));
    let store: Arc<dyn UserStore> = Arc::new(PgUserStore::new(db.clone()));
    let tokens = Arc::new(TokenService::new(store, auth.clone()));

    let context = Arc::new(AppContext {
        db,
        tokens,
        auth,
        config: config.clone(),
    });

    let app = create_router(context);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.server_port)
        .parse()
        .context("failed to parse bind address")?;

    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
