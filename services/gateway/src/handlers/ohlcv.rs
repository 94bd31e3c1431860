use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use types::primitives::Address;

use crate::error::AppError;
use crate::services::ohlcv::Tick;
use crate::state::AppState;

fn default_units() -> String {
    "min".to_string()
}

fn default_duration() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OhlcvQuery {
    pub base_token: Address,
    pub quote_token: Address,
    #[serde(default = "default_units")]
    pub units: String,
    #[serde(default = "default_duration")]
    pub duration: i64,
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
}

/// GET /ohlcv: candles for a pair at the requested resolution.
pub async fn get_ohlcv(
    State(state): State<AppState>,
    Query(query): Query<OhlcvQuery>,
) -> Result<Json<Vec<Tick>>, AppError> {
    let pair = state
        .pairs
        .get_by_tokens(&query.base_token, &query.quote_token)
        .await?
        .ok_or_else(|| AppError::NotFound("no pair for those tokens".to_string()))?;

    let ticks = state
        .ohlcv
        .snapshot(
            &pair.name,
            &query.units,
            query.duration,
            query.from,
            query.to,
        )
        .await;
    Ok(Json(ticks))
}
