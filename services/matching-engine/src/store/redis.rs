//! Cache-backed book store
//!
//! Production store over an external key/value cache. Level membership,
//! head pointer, and order body writes for one mutation are committed in
//! a single MULTI/EXEC pipeline. Read-modify-write sequences are safe
//! because the worker pool keeps a single writer per pair.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use types::numeric::{Price, TokenAmount};
use types::order::{Order, Side};
use types::primitives::Hash;

use crate::error::StoreError;

use super::{crosses, improves, BookStore, DepthSnapshot, PriceLevelView};

/// `book:<pair>:<side>:<price>` → FIFO list of order hashes.
fn level_key(pair_name: &str, side: Side, price: &Price) -> String {
    format!("book:{}:{}:{}", pair_name, side.as_key(), price)
}

/// `book:<pair>:<side>:head` → current best price.
fn head_key(pair_name: &str, side: Side) -> String {
    format!("book:{}:{}:head", pair_name, side.as_key())
}

/// `order:<hash>` → serialized order body.
fn order_key(hash: &Hash) -> String {
    format!("order:{}", hash)
}

fn level_pattern(pair_name: &str, side: Side) -> String {
    format!("book:{}:{}:*", pair_name, side.as_key())
}

fn nonce_key(pair_name: &str) -> String {
    format!("trades:nonce:{}", pair_name)
}

const REVERSED_SET_KEY: &str = "trades:reversed";

/// Book store over a shared cache.
#[derive(Clone)]
pub struct RedisBookStore {
    conn: ConnectionManager,
}

impl RedisBookStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::Cache)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(StoreError::Cache)?;
        Ok(Self::new(conn))
    }

    /// Price levels currently present for one side, sorted in matching
    /// order (descending bids, ascending asks).
    async fn level_prices(&self, pair_name: &str, side: Side) -> Result<Vec<Price>, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(level_pattern(pair_name, side)).await?;

        let mut prices = Vec::new();
        for key in keys {
            let Some(last) = key.rsplit(':').next() else {
                continue;
            };
            if last == "head" {
                continue;
            }
            let price = Price::from_str(last)
                .map_err(|e| StoreError::Corrupt(format!("bad price key {}: {}", key, e)))?;
            prices.push(price);
        }

        match side {
            Side::Buy => prices.sort_by(|a, b| b.cmp(a)),
            Side::Sell => prices.sort(),
        }
        Ok(prices)
    }

    async fn orders_at_level(
        &self,
        pair_name: &str,
        side: Side,
        price: &Price,
    ) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.conn.clone();
        let hashes: Vec<String> = conn.lrange(level_key(pair_name, side, price), 0, -1).await?;

        let mut orders = Vec::with_capacity(hashes.len());
        for hex in hashes {
            let hash = Hash::from_hex(&hex)
                .map_err(|e| StoreError::Corrupt(format!("bad hash in level: {}", e)))?;
            if let Some(order) = self.get_order(&hash).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}

#[async_trait]
impl BookStore for RedisBookStore {
    async fn add_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(order)?;

        let current_head: Option<String> = conn.get(head_key(&order.pair_name, order.side)).await?;
        let new_head = match current_head {
            Some(raw) => {
                let head = Price::from_str(&raw)
                    .map_err(|e| StoreError::Corrupt(format!("bad head price: {}", e)))?;
                improves(order.side, &order.price, &head)
            }
            None => true,
        };

        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(
                level_key(&order.pair_name, order.side, &order.price),
                order.hash.to_hex(),
            )
            .set(order_key(&order.hash), body);
        if new_head {
            pipe.set(
                head_key(&order.pair_name, order.side),
                order.price.to_string(),
            );
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn remove_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let level = level_key(&order.pair_name, order.side, &order.price);

        let _removed: i64 = conn.lrem(&level, 1, order.hash.to_hex()).await?;
        let remaining: i64 = conn.llen(&level).await?;
        if remaining > 0 {
            return Ok(());
        }

        let head: Option<String> = conn.get(head_key(&order.pair_name, order.side)).await?;
        let was_head = head.as_deref() == Some(order.price.to_string().as_str());

        let mut pipe = redis::pipe();
        pipe.atomic().del(&level);
        if was_head {
            // Next-best price from the remaining stored levels, if any
            let prices = self.level_prices(&order.pair_name, order.side).await?;
            match prices.iter().find(|p| **p != order.price) {
                Some(next) => {
                    pipe.set(head_key(&order.pair_name, order.side), next.to_string());
                }
                None => {
                    pipe.del(head_key(&order.pair_name, order.side));
                }
            }
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(order)?;
        conn.set::<_, _, ()>(order_key(&order.hash), body).await?;
        Ok(())
    }

    async fn get_order(&self, hash: &Hash) -> Result<Option<Order>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(order_key(hash)).await?;
        match raw {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn head(&self, pair_name: &str, side: Side) -> Result<Option<Price>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(head_key(pair_name, side)).await?;
        match raw {
            Some(value) => Price::from_str(&value)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("bad head price: {}", e))),
            None => Ok(None),
        }
    }

    async fn matching_orders(
        &self,
        pair_name: &str,
        side: Side,
        limit_price: &Price,
        needed: &TokenAmount,
    ) -> Result<Vec<Order>, StoreError> {
        let mut result = Vec::new();
        let mut accumulated = TokenAmount::zero();

        'levels: for price in self.level_prices(pair_name, side).await? {
            if !crosses(side, &price, limit_price) {
                break;
            }
            for order in self.orders_at_level(pair_name, side, &price).await? {
                if order.unfilled().is_zero() {
                    continue;
                }
                accumulated = accumulated + order.unfilled();
                result.push(order);
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
        let mut snapshot = DepthSnapshot {
            pair_name: pair_name.to_string(),
            bids: Vec::new(),
            asks: Vec::new(),
        };

        for side in [Side::Buy, Side::Sell] {
            let mut levels = Vec::new();
            for price in self
                .level_prices(pair_name, side)
                .await?
                .into_iter()
                .take(max_levels)
            {
                let orders = self.orders_at_level(pair_name, side, &price).await?;
                let mut amount = TokenAmount::zero();
                for order in &orders {
                    amount = amount + order.unfilled();
                }
                levels.push(PriceLevelView {
                    price,
                    amount,
                    order_count: orders.len(),
                });
            }
            match side {
                Side::Buy => snapshot.bids = levels,
                Side::Sell => snapshot.asks = levels,
            }
        }

        Ok(snapshot)
    }

    async fn next_trade_nonce(&self, pair_name: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let nonce: u64 = conn.incr(nonce_key(pair_name), 1i64).await?;
        Ok(nonce)
    }

    async fn mark_trade_reversed(&self, trade_hash: &Hash) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(REVERSED_SET_KEY, trade_hash.to_hex()).await?;
        Ok(added == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let price = Price::from_u64(100);
        assert_eq!(
            level_key("WETH/DAI", Side::Buy, &price),
            "book:WETH/DAI:buy:100"
        );
        assert_eq!(head_key("WETH/DAI", Side::Sell), "book:WETH/DAI:sell:head");
        assert_eq!(nonce_key("WETH/DAI"), "trades:nonce:WETH/DAI");
    }

    #[test]
    fn test_price_parse_from_key_segment() {
        let key = level_key("WETH/DAI", Side::Sell, &Price::from_str("99.5").unwrap());
        let segment = key.rsplit(':').next().unwrap();
        assert_eq!(Price::from_str(segment).unwrap(), Price::from_str("99.5").unwrap());
    }
}
