//! In-memory book store
//!
//! The default store for single-process deployments and the test double
//! for the engine suites. Mirrors the cache-backed store's semantics:
//! FIFO price levels, eagerly maintained head pointers, and an idempotent
//! reversed-trade set.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use types::numeric::{Price, TokenAmount};
use types::order::{Order, Side};
use types::primitives::Hash;

use crate::error::StoreError;

use super::{crosses, improves, BookStore, DepthSnapshot, PriceLevelView};

#[derive(Default)]
struct PairBook {
    /// Best (highest) bid iterates first via `Reverse` keys.
    bids: BTreeMap<Reverse<Price>, VecDeque<Hash>>,
    asks: BTreeMap<Price, VecDeque<Hash>>,
    head_bid: Option<Price>,
    head_ask: Option<Price>,
}

impl PairBook {
    fn push(&mut self, side: Side, price: Price, hash: Hash) {
        match side {
            Side::Buy => {
                self.bids.entry(Reverse(price)).or_default().push_back(hash);
                if self.head_bid.map_or(true, |h| improves(Side::Buy, &price, &h)) {
                    self.head_bid = Some(price);
                }
            }
            Side::Sell => {
                self.asks.entry(price).or_default().push_back(hash);
                if self.head_ask.map_or(true, |h| improves(Side::Sell, &price, &h)) {
                    self.head_ask = Some(price);
                }
            }
        }
    }

    fn remove(&mut self, side: Side, price: Price, hash: &Hash) {
        match side {
            Side::Buy => {
                if let Some(level) = self.bids.get_mut(&Reverse(price)) {
                    level.retain(|h| h != hash);
                    if level.is_empty() {
                        self.bids.remove(&Reverse(price));
                    }
                }
                if self.head_bid == Some(price) {
                    self.head_bid = self.bids.keys().next().map(|k| k.0);
                }
            }
            Side::Sell => {
                if let Some(level) = self.asks.get_mut(&price) {
                    level.retain(|h| h != hash);
                    if level.is_empty() {
                        self.asks.remove(&price);
                    }
                }
                if self.head_ask == Some(price) {
                    self.head_ask = self.asks.keys().next().copied();
                }
            }
        }
    }

    fn head(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.head_bid,
            Side::Sell => self.head_ask,
        }
    }

    /// Price levels in matching order for the given resting side.
    fn levels(&self, side: Side) -> Vec<(Price, Vec<Hash>)> {
        match side {
            Side::Buy => self
                .bids
                .iter()
                .map(|(k, v)| (k.0, v.iter().copied().collect()))
                .collect(),
            Side::Sell => self
                .asks
                .iter()
                .map(|(k, v)| (*k, v.iter().copied().collect()))
                .collect(),
        }
    }
}

#[derive(Default)]
struct Inner {
    books: HashMap<String, PairBook>,
    orders: HashMap<Hash, Order>,
    nonces: HashMap<String, u64>,
    reversed: HashSet<Hash>,
}

/// Book store backed by process memory.
#[derive(Default)]
pub struct MemoryBookStore {
    inner: RwLock<Inner>,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn add_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .books
            .entry(order.pair_name.clone())
            .or_default()
            .push(order.side, order.price, order.hash);
        inner.orders.insert(order.hash, order.clone());
        Ok(())
    }

    async fn remove_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(book) = inner.books.get_mut(&order.pair_name) {
            book.remove(order.side, order.price, &order.hash);
        }
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.orders.insert(order.hash, order.clone());
        Ok(())
    }

    async fn get_order(&self, hash: &Hash) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.orders.get(hash).cloned())
    }

    async fn head(&self, pair_name: &str, side: Side) -> Result<Option<Price>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.books.get(pair_name).and_then(|b| b.head(side)))
    }

    async fn matching_orders(
        &self,
        pair_name: &str,
        side: Side,
        limit_price: &Price,
        needed: &TokenAmount,
    ) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.read().await;
        let Some(book) = inner.books.get(pair_name) else {
            return Ok(Vec::new());
        };

        let mut result = Vec::new();
        let mut accumulated = TokenAmount::zero();

        'levels: for (price, hashes) in book.levels(side) {
            if !crosses(side, &price, limit_price) {
                break;
            }
            for hash in hashes {
                let Some(order) = inner.orders.get(&hash) else {
                    continue;
                };
                if order.unfilled().is_zero() {
                    continue;
                }
                accumulated = accumulated + order.unfilled();
                result.push(order.clone());
                if accumulated >= *needed {
                    break 'levels;
                }
            }
        }

        Ok(result)
    }

    async fn depth(
        &self,
        pair_name: &str,
        max_levels: usize,
    ) -> Result<DepthSnapshot, StoreError> {
        let inner = self.inner.read().await;
        let mut snapshot = DepthSnapshot {
            pair_name: pair_name.to_string(),
            bids: Vec::new(),
            asks: Vec::new(),
        };
        let Some(book) = inner.books.get(pair_name) else {
            return Ok(snapshot);
        };

        for side in [Side::Buy, Side::Sell] {
            let levels = book
                .levels(side)
                .into_iter()
                .take(max_levels)
                .map(|(price, hashes)| {
                    let mut amount = TokenAmount::zero();
                    let mut count = 0;
                    for hash in &hashes {
                        if let Some(order) = inner.orders.get(hash) {
                            amount = amount + order.unfilled();
                            count += 1;
                        }
                    }
                    PriceLevelView {
                        price,
                        amount,
                        order_count: count,
                    }
                })
                .collect();
            match side {
                Side::Buy => snapshot.bids = levels,
                Side::Sell => snapshot.asks = levels,
            }
        }

        Ok(snapshot)
    }

    async fn next_trade_nonce(&self, pair_name: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let nonce = inner.nonces.entry(pair_name.to_string()).or_insert(0);
        *nonce += 1;
        Ok(*nonce)
    }

    async fn mark_trade_reversed(&self, trade_hash: &Hash) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.reversed.insert(*trade_hash))
    }
}
