use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use types::primitives::Address;
use types::trade::Trade;

use crate::error::AppError;
use crate::state::AppState;

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesQuery {
    pub base_token: Address,
    pub quote_token: Address,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// GET /trades?baseToken=..&quoteToken=..: recent trades for a pair.
pub async fn get_trades(
    State(state): State<AppState>,
    Query(query): Query<TradesQuery>,
) -> Result<Json<Vec<Trade>>, AppError> {
    let pair = state
        .pairs
        .get_by_tokens(&query.base_token, &query.quote_token)
        .await?
        .ok_or_else(|| AppError::NotFound("no pair for those tokens".to_string()))?;
    let trades = state.trades.get_by_pair(&pair.name, query.limit).await?;
    Ok(Json(trades))
}
