use axum::extract::State;
use axum::Json;

use types::pair::{Token, TokenPair};

use crate::error::AppError;
use crate::state::AppState;

/// GET /pairs: all registered markets.
pub async fn get_pairs(State(state): State<AppState>) -> Result<Json<Vec<TokenPair>>, AppError> {
    Ok(Json(state.pairs.all().await?))
}

/// GET /tokens: all tokens participating in a market.
pub async fn get_tokens(State(state): State<AppState>) -> Result<Json<Vec<Token>>, AppError> {
    Ok(Json(state.pairs.tokens().await?))
}
