use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub symbol: String,
    pub side: String,
    pub price: f64,
    pub quantity: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    pub side: String,
    pub price: f64,
    pub quantity: i32,
}

#[derive(Debug, Default, FromRow, Serialize)]
pub struct Pnl {
    pub unrealized: f64,
    pub realized: f64,
    pub total: f64,
}

#[derive(Debug, Serialize)]
pub struct OrderbookResponse {
    pub orders: Vec<Order>,
    pub pnl: Pnl,
}

/// GET /api/orderbook
///
/// All orders for the caller, newest first, plus the P&L summed over
/// their positions.
pub async fn orderbook(
    State(context): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let orders = context
        .db
        .run(move |pool| async move {
            sqlx::query_as::<_, Order>(
                "SELECT id, symbol, side, price, quantity, status, created_at \
                 FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&pool)
            .await
        })
        .await?;

    let pnl = context
        .db
        .run(move |pool| async move {
            sqlx::query_as::<_, Pnl>(
                "SELECT COALESCE(SUM(unrealized_pnl), 0) AS unrealized, \
                        COALESCE(SUM(realized_pnl), 0) AS realized, \
                        COALESCE(SUM(total_pnl), 0) AS total \
                 FROM positions WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_one(&pool)
            .await
        })
        .await?;

    Ok(Json(OrderbookResponse { orders, pnl }))
}

/// POST /api/orders
pub async fn create_order(
    State(context): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.side != "buy" && request.side != "sell" {
        return Err(AppError::Validation(
            "side must be 'buy' or 'sell'".to_string(),
        ));
    }
    if request.symbol.is_empty() {
        return Err(AppError::Validation("symbol must not be empty".to_string()));
    }

    context
        .db
        .run(move |pool| async move {
            sqlx::query(
                "INSERT INTO orders (user_id, symbol, side, price, quantity, status) \
                 VALUES ($1, $2, $3, $4, $5, 'pending')",
            )
            .bind(user_id)
            .bind(&request.symbol)
            .bind(&request.side)
            .bind(request.price)
            .bind(request.quantity)
            .execute(&pool)
            .await?;
            Ok(())
        })
        .await?;

    Ok(StatusCode::CREATED)
}
