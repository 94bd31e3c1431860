//! Engine queue messages and engine responses
//!
//! `EngineMessage` is the JSON envelope pushed onto the durable work queue
//! by the order service; `EngineResponse` is what the engine publishes for
//! every processed input. Both are tagged enums so consumers dispatch on
//! the `type` discriminator.

use serde::{Deserialize, Serialize};

use crate::order::{Order, OrderCancel};
use crate::primitives::Hash;
use crate::trade::Trade;

/// A message on the `matching.engine` work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineMessage {
    #[serde(rename = "NEW_ORDER")]
    NewOrder(Order),

    #[serde(rename = "CANCEL_ORDER")]
    CancelOrder(OrderCancel),

    /// Settlement recovery: reverse this trade's effect on the book.
    #[serde(rename = "TRADE_CANCELLED")]
    TradeCancelled(Trade),
}

impl EngineMessage {
    /// Pair the message belongs to, used to keep a single writer per pair.
    pub fn pair_name(&self) -> &str {
        match self {
            EngineMessage::NewOrder(order) => &order.pair_name,
            EngineMessage::CancelOrder(cancel) => &cancel.pair_name,
            EngineMessage::TradeCancelled(trade) => &trade.pair_name,
        }
    }
}

/// One maker-side match: the trade plus a snapshot of the maker order
/// after the fill was applied. Pushed to the taker during the signature
/// handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeMatch {
    pub trade: Trade,
    pub maker_order: Order,
}

/// Engine output, one per processed queue message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineResponse {
    /// Resting order accepted at its limit price.
    #[serde(rename = "ORDER_ADDED")]
    OrderAdded { order: Order },

    /// Taker filled partially; the remainder rests in the book.
    #[serde(rename = "ORDER_PARTIALLY_FILLED")]
    OrderPartiallyFilled {
        order: Order,
        matches: Vec<TradeMatch>,
    },

    /// Taker fully consumed.
    #[serde(rename = "ORDER_FILLED")]
    OrderFilled {
        order: Order,
        matches: Vec<TradeMatch>,
    },

    /// Cancel applied; remaining volume removed from the book.
    #[serde(rename = "ORDER_CANCELLED")]
    OrderCancelled { order: Order },

    /// Settlement recovery applied: trades reversed, orders restored.
    #[serde(rename = "TRADES_CANCELLED")]
    TradesCancelled {
        trades: Vec<Trade>,
        orders: Vec<Order>,
    },

    /// Invalid input; state unchanged.
    #[serde(rename = "ERROR")]
    Error {
        message: String,
        hash: Option<Hash>,
    },
}

impl EngineResponse {
    /// The `type` discriminator as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            EngineResponse::OrderAdded { .. } => "ORDER_ADDED",
            EngineResponse::OrderPartiallyFilled { .. } => "ORDER_PARTIALLY_FILLED",
            EngineResponse::OrderFilled { .. } => "ORDER_FILLED",
            EngineResponse::OrderCancelled { .. } => "ORDER_CANCELLED",
            EngineResponse::TradesCancelled { .. } => "TRADES_CANCELLED",
            EngineResponse::Error { .. } => "ERROR",
        }
    }

    /// Pair the response concerns, when one is identifiable.
    pub fn pair_name(&self) -> Option<&str> {
        match self {
            EngineResponse::OrderAdded { order }
            | EngineResponse::OrderPartiallyFilled { order, .. }
            | EngineResponse::OrderFilled { order, .. }
            | EngineResponse::OrderCancelled { order } => Some(&order.pair_name),
            EngineResponse::TradesCancelled { trades, .. } => {
                trades.first().map(|t| t.pair_name.as_str())
            }
            EngineResponse::Error { .. } => None,
        }
    }

    /// Trades carried by this response, if any.
    pub fn trades(&self) -> Vec<&Trade> {
        match self {
            EngineResponse::OrderPartiallyFilled { matches, .. }
            | EngineResponse::OrderFilled { matches, .. } => {
                matches.iter().map(|m| &m.trade).collect()
            }
            EngineResponse::TradesCancelled { trades, .. } => trades.iter().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::TokenAmount;
    use crate::order::Side;
    use crate::pair::{Token, TokenPair};
    use crate::primitives::Address;

    fn sample_order() -> Order {
        let pair = TokenPair::new(
            Token::new(
                Address::from_hex("0x2034842261b82651885751fc293bba7ba5398156").unwrap(),
                "WETH",
                18,
            ),
            Token::new(
                Address::from_hex("0x67b95b2e1c7e9a2c6fe3486acb01d1a454dfc8b3").unwrap(),
                "DAI",
                18,
            ),
        );
        Order::limit(
            &pair,
            Address::zero(),
            Address::zero(),
            Side::Buy,
            TokenAmount::from_u64(10),
            TokenAmount::from_u64(1000),
            1,
            4_102_444_800,
        )
        .unwrap()
    }

    #[test]
    fn test_engine_message_wire_tag() {
        let msg = EngineMessage::NewOrder(sample_order());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json.get("type").unwrap(), "NEW_ORDER");
        assert!(json.get("payload").is_some());
    }

    #[test]
    fn test_engine_message_roundtrip() {
        let msg = EngineMessage::NewOrder(sample_order());
        let json = serde_json::to_string(&msg).unwrap();
        let back: EngineMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn test_response_type_names() {
        let resp = EngineResponse::OrderAdded {
            order: sample_order(),
        };
        assert_eq!(resp.type_name(), "ORDER_ADDED");

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json.get("type").unwrap(), "ORDER_ADDED");
    }

    #[test]
    fn test_response_pair_name() {
        let resp = EngineResponse::OrderAdded {
            order: sample_order(),
        };
        assert_eq!(resp.pair_name(), Some("WETH/DAI"));

        let err = EngineResponse::Error {
            message: "bad input".into(),
            hash: None,
        };
        assert_eq!(err.pair_name(), None);
    }

    #[test]
    fn test_message_pair_routing() {
        let msg = EngineMessage::NewOrder(sample_order());
        assert_eq!(msg.pair_name(), "WETH/DAI");
    }
}
