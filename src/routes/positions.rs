use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use sqlx::FromRow;

use crate::context::AppContext;
use crate::error::AppError;
use crate::routes::extractors::AuthenticatedUser;

#[derive(Debug, FromRow, Serialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: i32,
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
}

/// GET /api/positions
pub async fn list_positions(
    State(context): State<Arc<AppContext>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let positions = context
        .db
        .run(move |pool| async move {
            sqlx::query_as::<_, Position>(
                "SELECT symbol, quantity, entry_price, current_price, unrealized_pnl \
                 FROM positions WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_all(&pool)
            .await
        })
        .await?;

    Ok(Json(positions))
}
