//! Trade records
//!
//! A trade pins one maker order against one taker order for some base
//! amount at the maker's price. It is created only by the matching engine
//! and mutated only by settlement callbacks: the taker's signature during
//! the handshake, then the transaction outcome.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::numeric::{Price, TokenAmount};
use crate::order::Order;
use crate::primitives::{keccak256, Address, Hash};
use crate::signature::Signature;

/// Settlement status of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// Created by the engine, awaiting the signature handshake
    #[default]
    Pending,
    /// Confirmed on chain (terminal)
    Success,
    /// Signature timeout or transaction failure; reversed by the engine
    Error,
    /// Rejected before submission (terminal)
    Invalid,
}

/// A match between a resting maker order and an incoming taker order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Internal opaque id, assigned on persistence.
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    pub maker_order_hash: Hash,
    pub taker_order_hash: Hash,
    pub maker: Address,
    pub taker: Address,
    pub pair_name: String,
    /// Matched amount in base-token units.
    pub amount: TokenAmount,
    /// Execution price: the resting maker's price.
    pub price: Price,
    /// Monotonic per-pair nonce assigned by the engine.
    pub trade_nonce: u64,
    pub hash: Hash,
    /// Filled by the taker during the signature handshake.
    pub signature: Option<Signature>,
    /// Filled once the settlement transaction is submitted.
    pub tx_hash: Option<Hash>,
    #[serde(default)]
    pub status: TradeStatus,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Trade {
    /// Create a trade for a match produced by the engine.
    pub fn new(
        maker_order: &Order,
        taker_order: &Order,
        amount: TokenAmount,
        trade_nonce: u64,
        timestamp: i64,
    ) -> Self {
        let mut trade = Self {
            id: Uuid::nil(),
            maker_order_hash: maker_order.hash,
            taker_order_hash: taker_order.hash,
            maker: maker_order.maker,
            taker: taker_order.maker,
            pair_name: maker_order.pair_name.clone(),
            amount,
            price: maker_order.price,
            trade_nonce,
            hash: Hash::zero(),
            signature: None,
            tx_hash: None,
            status: TradeStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
        };
        trade.hash = trade.compute_hash();
        trade
    }

    /// Content hash over the immutable fields.
    ///
    /// Preimage layout: maker order hash, taker order hash, taker
    /// address, amount (32-byte BE), trade nonce (32-byte BE).
    pub fn compute_hash(&self) -> Hash {
        let nonce = TokenAmount::from_u64(self.trade_nonce);
        keccak256(&[
            self.maker_order_hash.as_bytes(),
            self.taker_order_hash.as_bytes(),
            self.taker.as_bytes(),
            &self.amount.to_be_bytes(),
            &nonce.to_be_bytes(),
        ])
    }

    pub fn is_pending(&self) -> bool {
        self.status == TradeStatus::Pending
    }

    /// Record the on-chain transaction hash after a successful submit.
    pub fn mark_success(&mut self, tx_hash: Hash, timestamp: i64) {
        self.status = TradeStatus::Success;
        self.tx_hash = Some(tx_hash);
        self.updated_at = timestamp;
    }

    /// Record a settlement failure; the engine reverses the fill.
    pub fn mark_error(&mut self, timestamp: i64) {
        self.status = TradeStatus::Error;
        self.updated_at = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;
    use crate::pair::{Token, TokenPair};

    fn test_pair() -> TokenPair {
        let base = Token::new(
            Address::from_hex("0x2034842261b82651885751fc293bba7ba5398156").unwrap(),
            "WETH",
            18,
        );
        let quote = Token::new(
            Address::from_hex("0x67b95b2e1c7e9a2c6fe3486acb01d1a454dfc8b3").unwrap(),
            "DAI",
            18,
        );
        TokenPair::new(base, quote)
    }

    fn order(side: Side, maker_hex: &str) -> Order {
        Order::limit(
            &test_pair(),
            Address::from_hex(maker_hex).unwrap(),
            Address::zero(),
            side,
            TokenAmount::from_u64(10),
            TokenAmount::from_u64(1000),
            7,
            4_102_444_800,
        )
        .unwrap()
    }

    fn test_trade() -> Trade {
        let maker = order(Side::Buy, "0xe8e84ee367bc63ddb38d3d01bccef106c194dc47");
        let taker = order(Side::Sell, "0x6e6bb166f420ddd682caebf55dafbafda74f2c9c");
        Trade::new(&maker, &taker, TokenAmount::from_u64(10), 1, 1000)
    }

    #[test]
    fn test_trade_takes_maker_price() {
        let trade = test_trade();
        assert_eq!(trade.price, Price::from_u64(100));
        assert_eq!(trade.status, TradeStatus::Pending);
    }

    #[test]
    fn test_trade_hash_stable_across_roundtrip() {
        let trade = test_trade();
        let json = serde_json::to_string(&trade).unwrap();
        let back: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(back.compute_hash(), trade.hash);
    }

    #[test]
    fn test_trade_hash_ignores_mutable_fields() {
        let mut trade = test_trade();
        let original = trade.hash;
        trade.mark_success(keccak256(&[b"tx"]), 2000);
        assert_eq!(trade.compute_hash(), original);
    }

    #[test]
    fn test_settlement_transitions() {
        let mut trade = test_trade();
        assert!(trade.is_pending());

        trade.mark_error(2000);
        assert_eq!(trade.status, TradeStatus::Error);
        assert!(trade.tx_hash.is_none());
    }
}
