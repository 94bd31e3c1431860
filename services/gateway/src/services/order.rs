//! Order service
//!
//! Validates client orders, routes them onto the engine queue, persists
//! every state transition coming back on the response bus, and drives
//! the trade-signing handshake: REQUEST_SIGNATURE to the taker's private
//! channel, await the signed NEW_TRADE, submit to settlement, notify
//! both sides, and enqueue TRADE_CANCELLED when the taker goes silent or
//! the submission fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use matching_engine::{BookStore, QueueError, QueueProducer};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use types::account::{Account, TokenBalance};
use types::errors::ValidationError;
use types::events::{EngineMessage, EngineResponse, TradeMatch};
use types::numeric::TokenAmount;
use types::order::{Order, OrderCancel, OrderStatus};
use types::primitives::{Address, Hash};
use types::trade::Trade;
use types::ws;

use crate::hub::SubscriptionHub;
use crate::settlement::SettlementClient;
use crate::store::{AccountDao, DaoError, OrderDao, PairDao, TradeDao};

/// How many levels per side go into order_book broadcasts.
const BOOK_DEPTH: usize = 20;

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Dao(#[from] DaoError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

pub struct OrderService {
    orders: Arc<dyn OrderDao>,
    trades: Arc<dyn TradeDao>,
    accounts: Arc<dyn AccountDao>,
    pairs: Arc<dyn PairDao>,
    book: Arc<dyn BookStore>,
    queue: Arc<dyn QueueProducer>,
    hub: Arc<SubscriptionHub>,
    settlement: Arc<dyn SettlementClient>,
    signature_timeout: Duration,
    default_balance: TokenAmount,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderDao>,
        trades: Arc<dyn TradeDao>,
        accounts: Arc<dyn AccountDao>,
        pairs: Arc<dyn PairDao>,
        book: Arc<dyn BookStore>,
        queue: Arc<dyn QueueProducer>,
        hub: Arc<SubscriptionHub>,
        settlement: Arc<dyn SettlementClient>,
        signature_timeout: Duration,
        default_balance: TokenAmount,
    ) -> Self {
        Self {
            orders,
            trades,
            accounts,
            pairs,
            book,
            queue,
            hub,
            settlement,
            signature_timeout,
            default_balance,
        }
    }

    /// Validate and route a new order to the engine.
    pub async fn new_order(&self, mut order: Order) -> Result<(), ServiceError> {
        let computed = order.compute_hash();
        if order.hash != computed {
            return Err(ValidationError::HashMismatch {
                claimed: order.hash,
                computed,
            }
            .into());
        }

        let signature = order.signature.ok_or(ValidationError::MissingSignature)?;
        signature
            .verify(&order.hash, &order.maker)
            .map_err(ValidationError::BadSignature)?;

        let pair = self
            .pairs
            .get_by_tokens(&order.token_buy, &order.token_sell)
            .await?
            .ok_or(ValidationError::UnknownPair {
                token_buy: order.token_buy,
                token_sell: order.token_sell,
            })?;
        order.derive_market_fields(&pair).map_err(ValidationError::Order)?;

        let now = unix_now();
        if order.expires <= now {
            return Err(ValidationError::Expired {
                expires: order.expires,
            }
            .into());
        }

        let mut account = self.get_or_create_account(&order.maker).await?;
        if account.is_blocked {
            return Err(ValidationError::AccountBlocked {
                address: order.maker,
            }
            .into());
        }
        account
            .lock(&order.token_sell, &order.amount_sell)
            .map_err(ValidationError::Account)?;
        self.accounts.update(&account).await?;

        order.status = OrderStatus::New;
        self.orders.create(&mut order).await?;
        self.queue.push(&EngineMessage::NewOrder(order.clone())).await?;

        info!(order = %order.hash, pair = %order.pair_name, "order accepted and enqueued");
        Ok(())
    }

    /// Verify and route a cancellation to the engine.
    pub async fn cancel_order(&self, cancel: OrderCancel) -> Result<(), ServiceError> {
        let computed = cancel.compute_hash();
        if cancel.hash != computed {
            return Err(ValidationError::HashMismatch {
                claimed: cancel.hash,
                computed,
            }
            .into());
        }

        let order = self
            .orders
            .get_by_hash(&cancel.order_hash)
            .await?
            .ok_or(DaoError::NotFound)?;

        let signature = cancel.signature.ok_or(ValidationError::MissingSignature)?;
        signature
            .verify(&cancel.hash, &order.maker)
            .map_err(ValidationError::BadSignature)?;

        self.queue.push(&EngineMessage::CancelOrder(cancel)).await?;
        Ok(())
    }

    /// Consume the response bus until it closes.
    pub async fn run(self: Arc<Self>, mut rx: broadcast::Receiver<EngineResponse>) {
        loop {
            match rx.recv().await {
                Ok(response) => self.handle_engine_response(response).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "order service lagged on response bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Persist the response's state and fan out notifications.
    pub async fn handle_engine_response(self: &Arc<Self>, response: EngineResponse) {
        match response {
            EngineResponse::OrderAdded { order } => {
                self.persist_order(&order).await;
                self.hub.send_order_message(
                    &order.hash,
                    ws::ORDER_ADDED,
                    serde_json::to_value(&order).unwrap_or_default(),
                );
                self.broadcast_order_book(&order.pair_name).await;
            }

            EngineResponse::OrderCancelled { order } => {
                self.persist_order(&order).await;
                self.release_remaining_lock(&order).await;
                self.hub.send_order_message(
                    &order.hash,
                    ws::ORDER_CANCELLED,
                    serde_json::to_value(&order).unwrap_or_default(),
                );
                self.broadcast_order_book(&order.pair_name).await;
            }

            EngineResponse::OrderFilled { order, matches }
            | EngineResponse::OrderPartiallyFilled { order, matches } => {
                self.persist_order(&order).await;
                for m in &matches {
                    self.persist_order(&m.maker_order).await;
                }

                // Trade creation doubles as at-least-once dedup: a
                // replayed response finds its trades already stored.
                let mut fresh = Vec::new();
                for m in matches {
                    let mut trade = m.trade.clone();
                    match self.trades.create(&mut trade).await {
                        Ok(()) => fresh.push(m),
                        Err(DaoError::Duplicate) => {
                            debug!(trade = %trade.hash, "duplicate trade delivery ignored")
                        }
                        Err(e) => error!(trade = %trade.hash, error = %e, "trade persist failed"),
                    }
                }

                if !fresh.is_empty() {
                    self.broadcast_trades(&order.pair_name, fresh.iter().map(|m| &m.trade))
                        .await;
                    let service = self.clone();
                    let taker = order.clone();
                    tokio::spawn(async move {
                        service.run_signature_handshake(taker, fresh).await;
                    });
                }
                self.broadcast_order_book(&order.pair_name).await;
            }

            EngineResponse::TradesCancelled { trades, orders } => {
                for order in &orders {
                    self.persist_order(order).await;
                    if order.status == OrderStatus::Cancelled {
                        self.release_remaining_lock(order).await;
                    }
                }
                for trade in &trades {
                    if let Err(e) = self.trades.upsert(trade).await {
                        error!(trade = %trade.hash, error = %e, "trade upsert failed");
                    }
                    // The taker was notified when its handshake failed;
                    // the maker learns about the reversal here.
                    self.hub.send_order_message(
                        &trade.maker_order_hash,
                        ws::TRADE_TX_ERROR,
                        serde_json::to_value(trade).unwrap_or_default(),
                    );
                }
                if let Some(pair_name) = trades.first().map(|t| t.pair_name.clone()) {
                    self.broadcast_trades(&pair_name, trades.iter()).await;
                    self.broadcast_order_book(&pair_name).await;
                }
            }

            EngineResponse::Error { message, hash } => {
                warn!(error = %message, "engine rejected input");
                if let Some(hash) = hash {
                    self.hub.send_order_message(
                        &hash,
                        ws::ERROR,
                        serde_json::Value::String(message),
                    );
                }
            }
        }
    }

    /// Drive the signing handshake for the fresh trades of one taker.
    async fn run_signature_handshake(self: Arc<Self>, taker: Order, matches: Vec<TradeMatch>) {
        let taker_hash = taker.hash;
        let mut client_rx = self.hub.take_client_receiver(&taker_hash).await;

        let mut pending: HashMap<Hash, TradeMatch> = HashMap::new();
        for m in matches {
            self.hub.send_order_message(
                &taker_hash,
                ws::REQUEST_SIGNATURE,
                serde_json::to_value(&m).unwrap_or_default(),
            );
            pending.insert(m.trade.hash, m);
        }

        let deadline = Instant::now() + self.signature_timeout;
        while !pending.is_empty() {
            let Some(rx) = client_rx.as_mut() else {
                // No registered client; everything below times out
                break;
            };
            let payload = match timeout_at(deadline, rx.recv()).await {
                Ok(Some(payload)) => payload,
                Ok(None) | Err(_) => break,
            };
            if payload.message_type != ws::NEW_TRADE {
                continue;
            }
            let Ok(signed) = serde_json::from_value::<Trade>(payload.data) else {
                warn!(order = %taker_hash, "undecodable NEW_TRADE payload");
                continue;
            };
            let Some(m) = pending.remove(&signed.hash) else {
                debug!(trade = %signed.hash, "signature for unknown or settled trade");
                continue;
            };

            match self.verify_taker_signature(&signed, &taker) {
                Ok(()) => self.settle_trade(signed, &m, &taker).await,
                Err(e) => {
                    warn!(trade = %signed.hash, error = %e, "taker signature invalid");
                    self.fail_trade(&m.trade, &taker_hash).await;
                }
            }
        }

        // Unanswered trades: settlement recovery reverses them
        for (_, m) in pending {
            info!(trade = %m.trade.hash, order = %taker_hash, "signature timeout");
            self.fail_trade(&m.trade, &taker_hash).await;
        }
    }

    fn verify_taker_signature(&self, signed: &Trade, taker: &Order) -> Result<(), ValidationError> {
        if signed.compute_hash() != signed.hash {
            return Err(ValidationError::HashMismatch {
                claimed: signed.hash,
                computed: signed.compute_hash(),
            });
        }
        let signature = signed.signature.ok_or(ValidationError::MissingSignature)?;
        signature
            .verify(&signed.hash, &taker.maker)
            .map_err(ValidationError::BadSignature)?;
        Ok(())
    }

    /// Submit a signed trade, wait for the on-chain outcome, and notify
    /// both private channels at each step.
    async fn settle_trade(&self, mut trade: Trade, m: &TradeMatch, taker: &Order) {
        let tx_hash = match self.settlement.submit_trade(&trade, &m.maker_order).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                warn!(trade = %trade.hash, error = %e, "settlement submission failed");
                self.fail_trade(&trade, &taker.hash).await;
                return;
            }
        };

        // Submission accepted: both sides see the pending transaction
        trade.tx_hash = Some(tx_hash);
        if let Err(e) = self.trades.upsert(&trade).await {
            error!(trade = %trade.hash, error = %e, "submitted trade persist failed");
        }
        let data = serde_json::to_value(&trade).unwrap_or_default();
        for hash in [&trade.taker_order_hash, &trade.maker_order_hash] {
            self.hub.send_order_message(hash, ws::TRADE_EXECUTED, data.clone());
        }

        // Settlement is final only once the transaction confirms
        if let Err(e) = self.settlement.wait_receipt(tx_hash).await {
            warn!(trade = %trade.hash, tx = %tx_hash, error = %e, "settlement transaction failed");
            self.fail_trade(&trade, &taker.hash).await;
            return;
        }

        trade.mark_success(tx_hash, unix_now());
        if let Err(e) = self.trades.upsert(&trade).await {
            error!(trade = %trade.hash, error = %e, "settled trade persist failed");
        }
        self.apply_trade_settlement(&trade, &m.maker_order, taker).await;

        let data = serde_json::to_value(&trade).unwrap_or_default();
        for hash in [&trade.taker_order_hash, &trade.maker_order_hash] {
            self.hub
                .send_order_message(hash, ws::TRADE_TX_SUCCESS, data.clone());
        }
        self.broadcast_trades(&trade.pair_name, std::iter::once(&trade))
            .await;
        info!(trade = %trade.hash, tx = %tx_hash, "trade settled");
    }

    /// Mark a trade failed, tell the taker, and trigger engine recovery.
    async fn fail_trade(&self, trade: &Trade, taker_hash: &Hash) {
        let mut failed = trade.clone();
        failed.mark_error(unix_now());
        if let Err(e) = self.trades.upsert(&failed).await {
            error!(trade = %failed.hash, error = %e, "failed trade persist failed");
        }
        self.hub.send_order_message(
            taker_hash,
            ws::TRADE_TX_ERROR,
            serde_json::to_value(&failed).unwrap_or_default(),
        );
        if let Err(e) = self
            .queue
            .push(&EngineMessage::TradeCancelled(failed.clone()))
            .await
        {
            error!(trade = %failed.hash, error = %e, "recovery enqueue failed");
        }
    }

    /// Move settled balances: each side spends its sell leg and receives
    /// its buy leg, proportional to the traded base amount.
    async fn apply_trade_settlement(&self, trade: &Trade, maker_order: &Order, taker: &Order) {
        for order in [maker_order, taker] {
            let sell_leg = order.sell_amount_for(&trade.amount);
            let buy_leg = order.buy_amount_for(&trade.amount);
            match self.accounts.get_by_address(&order.maker).await {
                Ok(Some(mut account)) => {
                    if let Err(e) = account.spend(&order.token_sell, &sell_leg) {
                        warn!(account = %order.maker, error = %e, "settlement debit failed");
                        continue;
                    }
                    if let Err(e) = account.credit(&order.token_buy, &buy_leg) {
                        warn!(account = %order.maker, error = %e, "settlement credit failed");
                    }
                    if let Err(e) = self.accounts.update(&account).await {
                        error!(account = %order.maker, error = %e, "account persist failed");
                    }
                }
                Ok(None) => warn!(account = %order.maker, "settled trade for unknown account"),
                Err(e) => error!(account = %order.maker, error = %e, "account lookup failed"),
            }
        }
    }

    async fn persist_order(&self, order: &Order) {
        if let Err(e) = self.orders.upsert(order).await {
            error!(order = %order.hash, error = %e, "order persist failed");
        }
    }

    /// Release the sell-side lock covering an order's unfilled amount.
    async fn release_remaining_lock(&self, order: &Order) {
        let remaining = order.sell_amount_for(&order.unfilled());
        if remaining.is_zero() {
            return;
        }
        match self.accounts.get_by_address(&order.maker).await {
            Ok(Some(mut account)) => {
                if account.unlock(&order.token_sell, &remaining).is_ok() {
                    if let Err(e) = self.accounts.update(&account).await {
                        error!(account = %order.maker, error = %e, "account persist failed");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => error!(account = %order.maker, error = %e, "account lookup failed"),
        }
    }

    async fn get_or_create_account(&self, address: &Address) -> Result<Account, ServiceError> {
        if let Some(account) = self.accounts.get_by_address(address).await? {
            return Ok(account);
        }

        let mut account = Account::new(*address);
        account.created_at = unix_now();
        account.updated_at = account.created_at;
        for token in self.pairs.tokens().await? {
            account.token_balances.insert(
                token.address,
                TokenBalance::new(&token, self.default_balance, self.default_balance),
            );
        }
        self.accounts.create(&account).await?;
        Ok(account)
    }

    async fn broadcast_order_book(&self, pair_name: &str) {
        match self.book.depth(pair_name, BOOK_DEPTH).await {
            Ok(snapshot) => {
                let payload = serde_json::json!({
                    "type": ws::UPDATE,
                    "data": snapshot,
                });
                self.hub.broadcast(
                    &ws::orderbook_channel_id(pair_name),
                    types::ws::WebSocketMessage::new(ws::ORDERBOOK_CHANNEL, payload),
                );
            }
            Err(e) => error!(pair = pair_name, error = %e, "depth snapshot failed"),
        }
    }

    async fn broadcast_trades<'a>(
        &self,
        pair_name: &str,
        trades: impl Iterator<Item = &'a Trade>,
    ) {
        let trades: Vec<&Trade> = trades.collect();
        if trades.is_empty() {
            return;
        }
        let payload = serde_json::json!({
            "type": ws::UPDATE,
            "data": trades,
        });
        self.hub.broadcast(
            &ws::trades_channel_id(pair_name),
            types::ws::WebSocketMessage::new(ws::TRADE_CHANNEL, payload),
        );
    }
}
