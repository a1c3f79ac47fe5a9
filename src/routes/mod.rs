// ============================================================================
// HTTP Routes
// ============================================================================
//
// Public surface:
// - POST /api/signup    - Create account, returns token pair
// - POST /api/login     - Authenticate, returns token pair
// - POST /api/refresh   - Rotate refresh token
//
// Authenticated (Bearer access token):
// - GET  /api/profile   - Current account
// - GET  /api/holdings  - List holdings
// - POST /api/holdings  - Add a holding
// - GET  /api/orderbook - Orders plus realized P&L
// - POST /api/orders    - Place an order
// - GET  /api/positions - Open positions
//
// ============================================================================

pub mod auth;
pub mod extractors;
pub mod health;
pub mod holdings;
pub mod orders;
pub mod positions;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

pub fn create_router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/signup", post(auth::sign_up))
        .route("/api/login", post(auth::login))
        .route("/api/refresh", post(auth::refresh))
        .route("/api/profile", get(auth::profile))
        .route(
            "/api/holdings",
            get(holdings::list_holdings).post(holdings::create_holding),
        )
        .route("/api/orderbook", get(orders::orderbook))
        .route("/api/orders", post(orders::create_order))
        .route("/api/positions", get(positions::list_positions))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(context)
}
