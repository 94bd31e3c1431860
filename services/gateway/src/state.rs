//! Shared application state
//!
//! All dependencies are injected once at startup and cloned into
//! handlers; nothing here is a process-wide static.

use std::sync::Arc;

use matching_engine::BookStore;

use crate::hub::SubscriptionHub;
use crate::services::{OhlcvService, OrderBookService, OrderService};
use crate::store::{AccountDao, OrderDao, PairDao, TradeDao};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SubscriptionHub>,
    pub order_service: Arc<OrderService>,
    pub orderbook: Arc<OrderBookService>,
    pub ohlcv: Arc<OhlcvService>,
    pub book: Arc<dyn BookStore>,
    pub orders: Arc<dyn OrderDao>,
    pub trades: Arc<dyn TradeDao>,
    pub accounts: Arc<dyn AccountDao>,
    pub pairs: Arc<dyn PairDao>,
}
