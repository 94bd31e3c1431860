use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, markets, ohlcv, orders, socket, trades};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/orders/:address", get(orders::get_orders))
        .route("/trades", get(trades::get_trades))
        .route("/pairs", get(markets::get_pairs))
        .route("/tokens", get(markets::get_tokens))
        .route("/accounts/:address", get(accounts::get_account))
        .route("/ohlcv", get(ohlcv::get_ohlcv))
        .route("/socket", get(socket::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
