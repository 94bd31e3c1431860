//! Order book store
//!
//! The book lives outside the engine process so workers can share state
//! and survive restarts. Keys encode (pair, side, price) → FIFO list of
//! order hashes, (pair, side) → best-price head pointer, and hash → order
//! body. All implementations serialize mutations per pair; the worker
//! pool guarantees a single writer per pair on top of that.

mod memory;
mod redis;

pub use memory::MemoryBookStore;
pub use redis::RedisBookStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use types::numeric::{Price, TokenAmount};
use types::order::{Order, Side};
use types::primitives::Hash;

use crate::error::StoreError;

/// One aggregated price level in a depth snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevelView {
    pub price: Price,
    /// Total unfilled base amount resting at this price.
    pub amount: TokenAmount,
    pub order_count: usize,
}

/// Aggregated view of one pair's book, sent as the order_book INIT
/// payload and recomputed for UPDATE deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    pub pair_name: String,
    /// Best (highest) bid first.
    pub bids: Vec<PriceLevelView>,
    /// Best (lowest) ask first.
    pub asks: Vec<PriceLevelView>,
}

/// Storage contract for the shared order book.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Append the order to its (pair, side, price) level, advance the
    /// head pointer if this price beats it, and persist the body.
    async fn add_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Remove the order's hash from its price level. When the level
    /// empties and held the head, the head is recomputed from the
    /// remaining price keys. The body stays persisted.
    async fn remove_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Write-through of the order body (filled amount, status).
    async fn update_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn get_order(&self, hash: &Hash) -> Result<Option<Order>, StoreError>;

    /// Current best price on a side, or `None` for an empty side.
    async fn head(&self, pair_name: &str, side: Side) -> Result<Option<Price>, StoreError>;

    /// Resting orders on `side` able to match a taker limited at
    /// `limit_price`, in price-improving order (descending bids,
    /// ascending asks; FIFO within a level). Iteration stops once the
    /// accumulated unfilled amount reaches `needed` or the next price
    /// violates the limit.
    async fn matching_orders(
        &self,
        pair_name: &str,
        side: Side,
        limit_price: &Price,
        needed: &TokenAmount,
    ) -> Result<Vec<Order>, StoreError>;

    /// Aggregated depth for the pair, at most `max_levels` per side.
    async fn depth(&self, pair_name: &str, max_levels: usize)
        -> Result<DepthSnapshot, StoreError>;

    /// Monotonic per-pair trade nonce.
    async fn next_trade_nonce(&self, pair_name: &str) -> Result<u64, StoreError>;

    /// Record a trade hash as reversed. Returns `false` when the hash was
    /// already recorded, making settlement recovery idempotent.
    async fn mark_trade_reversed(&self, trade_hash: &Hash) -> Result<bool, StoreError>;
}

/// Whether `candidate` is a strictly better price than `current` for the
/// given resting side (higher bids, lower asks).
pub(crate) fn improves(side: Side, candidate: &Price, current: &Price) -> bool {
    match side {
        Side::Buy => candidate > current,
        Side::Sell => candidate < current,
    }
}

/// Whether a resting price satisfies a taker limited at `limit`.
pub(crate) fn crosses(resting_side: Side, resting: &Price, limit: &Price) -> bool {
    match resting_side {
        // Resting bids must pay at least the seller's limit
        Side::Buy => resting >= limit,
        // Resting asks must charge at most the buyer's limit
        Side::Sell => resting <= limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_improves_by_side() {
        let better = Price::from_u64(101);
        let current = Price::from_u64(100);
        assert!(improves(Side::Buy, &better, &current));
        assert!(!improves(Side::Sell, &better, &current));
        assert!(improves(Side::Sell, &current, &better));
    }

    #[test]
    fn test_crossing_rules() {
        let limit = Price::from_u64(100);
        assert!(crosses(Side::Sell, &Price::from_u64(99), &limit));
        assert!(crosses(Side::Sell, &Price::from_u64(100), &limit));
        assert!(!crosses(Side::Sell, &Price::from_u64(101), &limit));

        assert!(crosses(Side::Buy, &Price::from_u64(101), &limit));
        assert!(!crosses(Side::Buy, &Price::from_u64(99), &limit));
    }
}
