//! Matching logic
//!
//! One `Matcher` per process, shared by all shard workers. Every queue
//! message produces exactly one engine response. Logical failures (cancel
//! of a missing order, replayed recovery) become `ERROR` or empty
//! responses with state unchanged; store failures propagate so the worker
//! skips the ack and the message is redelivered.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use types::events::{EngineMessage, EngineResponse, TradeMatch};
use types::order::{Order, OrderCancel, OrderStatus};
use types::trade::Trade;

use crate::error::EngineError;
use crate::store::BookStore;

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Applies engine messages to the shared book store.
pub struct Matcher<S> {
    store: Arc<S>,
}

impl<S: BookStore> Matcher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Process one queue message and produce its response.
    pub async fn process(&self, message: EngineMessage) -> Result<EngineResponse, EngineError> {
        match message {
            EngineMessage::NewOrder(order) => self.new_order(order).await,
            EngineMessage::CancelOrder(cancel) => self.cancel_order(cancel).await,
            EngineMessage::TradeCancelled(trade) => self.trade_cancelled(trade).await,
        }
    }

    /// Walk the opposite side of the book for an incoming taker order.
    ///
    /// Execution price is always the resting maker's price; fills stop
    /// when the taker is consumed or the next maker violates its limit.
    async fn new_order(&self, order: Order) -> Result<EngineResponse, EngineError> {
        let now = unix_now();
        let mut taker = order;

        if let Some(existing) = self.store.get_order(&taker.hash).await? {
            if existing.status != OrderStatus::New {
                return Ok(EngineResponse::Error {
                    message: format!("order already processed with status {:?}", existing.status),
                    hash: Some(taker.hash),
                });
            }
        }

        let makers = self
            .store
            .matching_orders(
                &taker.pair_name,
                taker.side.opposite(),
                &taker.price,
                &taker.unfilled(),
            )
            .await?;

        if makers.is_empty() {
            taker.open(now);
            self.store.add_order(&taker).await?;
            info!(
                order = %taker.hash,
                pair = %taker.pair_name,
                price = %taker.price,
                "order added to book"
            );
            return Ok(EngineResponse::OrderAdded { order: taker });
        }

        let mut matches = Vec::with_capacity(makers.len());
        for mut maker in makers {
            if taker.unfilled().is_zero() {
                break;
            }

            let fillable = taker.unfilled().min(maker.unfilled());
            if fillable.is_zero() {
                continue;
            }

            let nonce = self.store.next_trade_nonce(&taker.pair_name).await?;
            if let Err(e) = maker.apply_fill(fillable, now) {
                warn!(maker = %maker.hash, error = %e, "maker fill rejected");
                return Ok(EngineResponse::Error {
                    message: e.to_string(),
                    hash: Some(maker.hash),
                });
            }
            if let Err(e) = taker.apply_fill(fillable, now) {
                warn!(taker = %taker.hash, error = %e, "taker fill rejected");
                return Ok(EngineResponse::Error {
                    message: e.to_string(),
                    hash: Some(taker.hash),
                });
            }

            let trade = Trade::new(&maker, &taker, fillable, nonce, now);

            self.store.update_order(&maker).await?;
            if maker.is_filled() {
                self.store.remove_order(&maker).await?;
            }

            debug!(
                trade = %trade.hash,
                maker = %maker.hash,
                taker = %taker.hash,
                amount = %trade.amount,
                price = %trade.price,
                "trade matched"
            );
            matches.push(TradeMatch {
                trade,
                maker_order: maker,
            });
        }

        if taker.is_filled() {
            self.store.update_order(&taker).await?;
            info!(order = %taker.hash, fills = matches.len(), "taker fully filled");
            Ok(EngineResponse::OrderFilled {
                order: taker,
                matches,
            })
        } else {
            // Remainder rests on the taker's own side at its limit price
            self.store.add_order(&taker).await?;
            info!(
                order = %taker.hash,
                unfilled = %taker.unfilled(),
                fills = matches.len(),
                "taker partially filled, remainder rests"
            );
            Ok(EngineResponse::OrderPartiallyFilled {
                order: taker,
                matches,
            })
        }
    }

    /// Honor a cancel for OPEN and PARTIAL_FILLED orders only.
    async fn cancel_order(&self, cancel: OrderCancel) -> Result<EngineResponse, EngineError> {
        let now = unix_now();

        let Some(mut order) = self.store.get_order(&cancel.order_hash).await? else {
            return Ok(EngineResponse::Error {
                message: "cancel of unknown order".to_string(),
                hash: Some(cancel.order_hash),
            });
        };

        if let Err(e) = order.cancel(now) {
            return Ok(EngineResponse::Error {
                message: e.to_string(),
                hash: Some(order.hash),
            });
        }

        self.store.remove_order(&order).await?;
        self.store.update_order(&order).await?;
        info!(order = %order.hash, pair = %order.pair_name, "order cancelled");
        Ok(EngineResponse::OrderCancelled { order })
    }

    /// Reverse a trade after downstream settlement failed.
    ///
    /// The maker's fill is restored and the maker reopens (reinserted if
    /// it had left the book). The taker's fill is decremented but the
    /// taker is never re-added; clients resubmit if they still want the
    /// fill. Keyed on the trade hash, so replays are no-ops.
    async fn trade_cancelled(&self, trade: Trade) -> Result<EngineResponse, EngineError> {
        let now = unix_now();

        if !self.store.mark_trade_reversed(&trade.hash).await? {
            debug!(trade = %trade.hash, "recovery replay ignored");
            return Ok(EngineResponse::TradesCancelled {
                trades: Vec::new(),
                orders: Vec::new(),
            });
        }

        let Some(mut maker) = self.store.get_order(&trade.maker_order_hash).await? else {
            return Ok(EngineResponse::Error {
                message: "recovery references unknown maker order".to_string(),
                hash: Some(trade.maker_order_hash),
            });
        };

        let maker_left_book = !matches!(
            maker.status,
            OrderStatus::Open | OrderStatus::PartialFilled
        );
        maker.revert_fill(trade.amount, now);
        self.store.update_order(&maker).await?;
        if maker_left_book {
            self.store.add_order(&maker).await?;
        }
        info!(
            maker = %maker.hash,
            trade = %trade.hash,
            restored = %trade.amount,
            "maker restored after settlement failure"
        );

        let mut orders = vec![maker];
        if let Some(mut taker) = self.store.get_order(&trade.taker_order_hash).await? {
            let taker_resting = matches!(
                taker.status,
                OrderStatus::Open | OrderStatus::PartialFilled
            );
            taker.revert_fill(trade.amount, now);
            if !taker_resting {
                // Not re-added to the book; the client resubmits if desired
                taker
                    .cancel(now)
                    .expect("revert_fill always leaves a cancellable status");
            }
            self.store.update_order(&taker).await?;
            orders.push(taker);
        }

        let mut reversed = trade;
        reversed.mark_error(now);
        Ok(EngineResponse::TradesCancelled {
            trades: vec![reversed],
            orders,
        })
    }
}
