use axum::extract::{Path, State};
use axum::Json;

use types::order::Order;
use types::primitives::Address;

use crate::error::AppError;
use crate::state::AppState;

/// GET /orders/:address: all orders placed by a maker.
pub async fn get_orders(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<Order>>, AppError> {
    let address =
        Address::from_hex(&address).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let orders = state.orders.get_by_address(&address).await?;
    Ok(Json(orders))
}
