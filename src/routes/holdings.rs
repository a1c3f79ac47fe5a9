use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, FromRow, Serialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: i32,
    pub price: f64,
    pub value: f64,
}

#[derive(Debug, Deserialize)]
pub struct CreateHoldingRequest {
    pub symbol: String,
    pub quantity: i32,
    pub price: f64,
}

/// GET /api/holdings
pub async fn list_holdings(
    State(context): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let holdings = context
        .db
        .run(move |pool| async move {
            sqlx::query_as::<_, Holding>(
                "SELECT symbol, quantity, price, value FROM holdings WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_all(&pool)
            .await
        })
        .await?;

    Ok(Json(holdings))
}

/// POST /api/holdings
pub async fn create_holding(
    State(context): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(request): Json<CreateHoldingRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.symbol.is_empty() {
        return Err(AppError::Validation("symbol must not be empty".to_string()));
    }

    let value = f64::from(request.quantity) * request.price;

    context
        .db
        .run(move |pool| async move {
            sqlx::query(
                "INSERT INTO holdings (user_id, symbol, quantity, price, value) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(user_id)
            .bind(&request.symbol)
            .bind(request.quantity)
            .bind(request.price)
            .bind(value)
            .execute(&pool)
            .await?;
            Ok(())
        })
        .await?;

    Ok(StatusCode::CREATED)
}
