use axum::extract::{Path, State};
use axum::Json;

use types::account::Account;
use types::primitives::Address;

use crate::error::AppError;
use crate::state::AppState;

/// GET /accounts/:address: the account with its token balances.
pub async fn get_account(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Account>, AppError> {
    let address =
        Address::from_hex(&address).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let account = state
        .accounts
        .get_by_address(&address)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no account for {}", address)))?;
    Ok(Json(account))
}
