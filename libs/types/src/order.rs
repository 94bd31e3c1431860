//! Order lifecycle types
//!
//! An order is an intent to swap `amount_sell` of one token for
//! `amount_buy` of another on a given pair. Its identity is the keccak-256
//! hash of the immutable fields; everything mutable (status, filled
//! amount, timestamps) sits outside the hash preimage.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::OrderError;
use crate::numeric::{Price, TokenAmount};
use crate::pair::TokenPair;
use crate::primitives::{keccak256, Address, Hash};
use crate::signature::Signature;

/// Order side relative to the pair's base token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buying the base token (a bid)
    Buy,
    /// Selling the base token (an ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Lowercase key fragment used in the book store.
    pub fn as_key(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted by the service, not yet seen by the engine
    #[default]
    New,
    /// Resting in the book with no fills
    Open,
    /// Resting in the book with partial fills
    PartialFilled,
    /// Completely filled (terminal)
    Filled,
    /// Cancelled; reopened only by settlement recovery
    Cancelled,
    /// Failed validation (terminal)
    InvalidOrder,
    /// Engine-level failure (terminal)
    Error,
}

impl OrderStatus {
    /// Whether the order can still rest in or enter the book.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::Open | OrderStatus::PartialFilled
        )
    }

    /// Whether a cancel request is honored in this state.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartialFilled)
    }
}

/// A limit order.
///
/// `amount_buy`/`amount_sell` are the raw swap amounts; `side`, `price`
/// and `amount` (base units) are derived against the pair and used by the
/// matching engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Internal opaque id, assigned on persistence. The hash is the
    /// primary external key.
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    pub hash: Hash,
    pub maker: Address,
    pub exchange_address: Address,
    pub token_buy: Address,
    pub token_sell: Address,
    pub symbol_buy: String,
    pub symbol_sell: String,
    pub amount_buy: TokenAmount,
    pub amount_sell: TokenAmount,
    pub side: Side,
    /// Derived quote/base price.
    pub price: Price,
    /// Derived base-token amount; fills are tracked against this.
    pub amount: TokenAmount,
    pub pair_name: String,
    pub nonce: u64,
    /// Unix seconds after which the order is no longer valid.
    pub expires: i64,
    #[serde(default)]
    pub fee_make: TokenAmount,
    #[serde(default)]
    pub fee_take: TokenAmount,
    pub signature: Option<Signature>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub filled_amount: TokenAmount,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Order {
    /// Build an unsigned limit order for `pair`.
    ///
    /// `base_amount` and `quote_amount` are the swap legs; which one is
    /// bought depends on `side`. The hash is computed, the signature is
    /// left empty for the wallet to fill.
    pub fn limit(
        pair: &TokenPair,
        maker: Address,
        exchange_address: Address,
        side: Side,
        base_amount: TokenAmount,
        quote_amount: TokenAmount,
        nonce: u64,
        expires: i64,
    ) -> Result<Self, OrderError> {
        let (token_buy, token_sell, symbol_buy, symbol_sell, amount_buy, amount_sell) = match side
        {
            Side::Buy => (
                pair.base_token.address,
                pair.quote_token.address,
                pair.base_token.symbol.clone(),
                pair.quote_token.symbol.clone(),
                base_amount,
                quote_amount,
            ),
            Side::Sell => (
                pair.quote_token.address,
                pair.base_token.address,
                pair.quote_token.symbol.clone(),
                pair.base_token.symbol.clone(),
                quote_amount,
                base_amount,
            ),
        };

        let price =
            Price::from_ratio(&quote_amount, &base_amount).ok_or(OrderError::ZeroAmount)?;

        let mut order = Self {
            id: Uuid::nil(),
            hash: Hash::zero(),
            maker,
            exchange_address,
            token_buy,
            token_sell,
            symbol_buy,
            symbol_sell,
            amount_buy,
            amount_sell,
            side,
            price,
            amount: base_amount,
            pair_name: pair.name.clone(),
            nonce,
            expires,
            fee_make: TokenAmount::zero(),
            fee_take: TokenAmount::zero(),
            signature: None,
            status: OrderStatus::New,
            filled_amount: TokenAmount::zero(),
            created_at: 0,
            updated_at: 0,
        };
        order.hash = order.compute_hash();
        Ok(order)
    }

    /// Content hash over the immutable fields.
    ///
    /// Preimage layout (fixed-width concatenation): exchange address,
    /// buy token, buy amount (32-byte BE), sell token, sell amount,
    /// expiry, nonce, maker address. Stable across serde round trips.
    pub fn compute_hash(&self) -> Hash {
        let expires = TokenAmount::from_u256(U256::from(self.expires.max(0) as u64));
        let nonce = TokenAmount::from_u64(self.nonce);
        keccak256(&[
            self.exchange_address.as_bytes(),
            self.token_buy.as_bytes(),
            &self.amount_buy.to_be_bytes(),
            self.token_sell.as_bytes(),
            &self.amount_sell.to_be_bytes(),
            &expires.to_be_bytes(),
            &nonce.to_be_bytes(),
            self.maker.as_bytes(),
        ])
    }

    /// Recompute derived market fields against the resolved pair.
    ///
    /// Rejects orders whose token addresses do not form the pair.
    pub fn derive_market_fields(&mut self, pair: &TokenPair) -> Result<(), OrderError> {
        if self.token_buy == pair.base_token.address
            && self.token_sell == pair.quote_token.address
        {
            self.side = Side::Buy;
            self.amount = self.amount_buy;
            self.price = Price::from_ratio(&self.amount_sell, &self.amount_buy)
                .ok_or(OrderError::ZeroAmount)?;
        } else if self.token_buy == pair.quote_token.address
            && self.token_sell == pair.base_token.address
        {
            self.side = Side::Sell;
            self.amount = self.amount_sell;
            self.price = Price::from_ratio(&self.amount_buy, &self.amount_sell)
                .ok_or(OrderError::ZeroAmount)?;
        } else {
            return Err(OrderError::TokenMismatch {
                pair: pair.name.clone(),
            });
        }
        self.pair_name = pair.name.clone();
        Ok(())
    }

    /// Remaining base amount.
    pub fn unfilled(&self) -> TokenAmount {
        self.amount.saturating_sub(&self.filled_amount)
    }

    /// Sell-side amount corresponding to `base` units of the pair's base
    /// token, scaled through the order's own ratio.
    pub fn sell_amount_for(&self, base: &TokenAmount) -> TokenAmount {
        self.amount_sell
            .mul_div(base, &self.amount)
            .unwrap_or(TokenAmount::zero())
    }

    /// Buy-side amount corresponding to `base` units of the base token.
    pub fn buy_amount_for(&self, base: &TokenAmount) -> TokenAmount {
        self.amount_buy
            .mul_div(base, &self.amount)
            .unwrap_or(TokenAmount::zero())
    }

    pub fn is_filled(&self) -> bool {
        self.filled_amount >= self.amount
    }

    /// NEW → OPEN once the engine accepts the order into the book.
    pub fn open(&mut self, timestamp: i64) {
        if self.status == OrderStatus::New {
            self.status = OrderStatus::Open;
            self.updated_at = timestamp;
        }
    }

    /// Advance the filled amount, updating status to PARTIAL_FILLED or
    /// FILLED.
    pub fn apply_fill(&mut self, fill: TokenAmount, timestamp: i64) -> Result<(), OrderError> {
        let new_filled = self
            .filled_amount
            .checked_add(&fill)
            .filter(|f| *f <= self.amount)
            .ok_or(OrderError::Overfill {
                hash: self.hash,
                amount: self.amount,
            })?;

        self.filled_amount = new_filled;
        self.status = if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartialFilled
        };
        self.updated_at = timestamp;
        Ok(())
    }

    /// Reverse a previous fill during settlement recovery.
    ///
    /// Status falls back to OPEN (no fills left) or PARTIAL_FILLED.
    pub fn revert_fill(&mut self, fill: TokenAmount, timestamp: i64) {
        self.filled_amount = self.filled_amount.saturating_sub(&fill);
        self.status = if self.filled_amount.is_zero() {
            OrderStatus::Open
        } else {
            OrderStatus::PartialFilled
        };
        self.updated_at = timestamp;
    }

    /// Cancel the order; only OPEN and PARTIAL_FILLED orders qualify.
    pub fn cancel(&mut self, timestamp: i64) -> Result<(), OrderError> {
        if !self.status.is_cancellable() {
            return Err(OrderError::NotCancellable {
                hash: self.hash,
                status: self.status,
            });
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = timestamp;
        Ok(())
    }
}

/// A signed cancellation request for a resting order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancel {
    pub order_hash: Hash,
    pub pair_name: String,
    pub hash: Hash,
    pub signature: Option<Signature>,
}

impl OrderCancel {
    pub fn new(order_hash: Hash, pair_name: impl Into<String>) -> Self {
        let mut cancel = Self {
            order_hash,
            pair_name: pair_name.into(),
            hash: Hash::zero(),
            signature: None,
        };
        cancel.hash = cancel.compute_hash();
        cancel
    }

    pub fn compute_hash(&self) -> Hash {
        keccak256(&[self.order_hash.as_bytes()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::Token;

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

    fn test_order(side: Side, base: u64, quote: u64) -> Order {
        Order::limit(
            &test_pair(),
            Address::from_hex("0xe8e84ee367bc63ddb38d3d01bccef106c194dc47").unwrap(),
            Address::from_hex("0xae55690d4b079460e6ac28aaa58c9ec7b73a7485").unwrap(),
            side,
            TokenAmount::from_u64(base),
            TokenAmount::from_u64(quote),
            1,
            4_102_444_800,
        )
        .unwrap()
    }

    #[test]
    fn test_hash_is_pure_function_of_immutable_fields() {
        let mut order = test_order(Side::Buy, 10, 1000);
        let original = order.hash;

        order.status = OrderStatus::PartialFilled;
        order.filled_amount = TokenAmount::from_u64(3);
        order.updated_at = 12345;

        assert_eq!(order.compute_hash(), original);
    }

    #[test]
    fn test_hash_survives_serde_roundtrip() {
        let order = test_order(Side::Sell, 15, 1485);
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back.compute_hash(), order.hash);
    }

    #[test]
    fn test_buy_order_price_and_amount() {
        let order = test_order(Side::Buy, 10, 1000);
        assert_eq!(order.price, Price::from_u64(100));
        assert_eq!(order.amount, TokenAmount::from_u64(10));
        assert_eq!(order.token_buy, test_pair().base_token.address);
    }

    #[test]
    fn test_sell_order_price_and_amount() {
        let order = test_order(Side::Sell, 10, 990);
        assert_eq!(order.price, Price::from_u64(99));
        assert_eq!(order.amount, TokenAmount::from_u64(10));
        assert_eq!(order.token_sell, test_pair().base_token.address);
    }

    #[test]
    fn test_derive_market_fields_rejects_foreign_tokens() {
        let mut order = test_order(Side::Buy, 10, 1000);
        order.token_buy = Address::zero();
        assert!(matches!(
            order.derive_market_fields(&test_pair()),
            Err(OrderError::TokenMismatch { .. })
        ));
    }

    #[test]
    fn test_fill_transitions() {
        let mut order = test_order(Side::Buy, 10, 1000);
        order.open(1);
        assert_eq!(order.status, OrderStatus::Open);

        order.apply_fill(TokenAmount::from_u64(4), 2).unwrap();
        assert_eq!(order.status, OrderStatus::PartialFilled);
        assert_eq!(order.unfilled(), TokenAmount::from_u64(6));

        order.apply_fill(TokenAmount::from_u64(6), 3).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.unfilled().is_zero());
    }

    #[test]
    fn test_overfill_rejected() {
        let mut order = test_order(Side::Buy, 10, 1000);
        order.open(1);
        let err = order.apply_fill(TokenAmount::from_u64(11), 2).unwrap_err();
        assert!(matches!(err, OrderError::Overfill { .. }));
        assert_eq!(order.status, OrderStatus::Open);
    }

    #[test]
    fn test_revert_fill_reopens() {
        let mut order = test_order(Side::Buy, 10, 1000);
        order.open(1);
        order.apply_fill(TokenAmount::from_u64(10), 2).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);

        order.revert_fill(TokenAmount::from_u64(10), 3);
        assert_eq!(order.status, OrderStatus::Open);
        assert!(order.filled_amount.is_zero());
    }

    #[test]
    fn test_cancel_rules() {
        let mut order = test_order(Side::Buy, 10, 1000);
        assert!(order.cancel(1).is_err()); // NEW is not cancellable

        order.open(1);
        order.cancel(2).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.cancel(3).is_err());
    }

    #[test]
    fn test_order_cancel_hash() {
        let order = test_order(Side::Buy, 10, 1000);
        let cancel = OrderCancel::new(order.hash, &order.pair_name);
        assert_eq!(cancel.hash, keccak256(&[order.hash.as_bytes()]));
    }

    #[test]
    fn test_wire_format_uses_camel_case_and_strings() {
        let order = test_order(Side::Buy, 10, 1000);
        let json = serde_json::to_value(&order).unwrap();
        assert!(json.get("amountBuy").unwrap().is_string());
        assert!(json.get("pairName").is_some());
        assert_eq!(json.get("status").unwrap(), "NEW");
    }
}
