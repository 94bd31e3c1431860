//! Websocket protocol envelope
//!
//! Every frame is `{ "channel": ..., "payload": ... }`. On the `orders`
//! channel the payload is a `{type, hash?, data}` triple; on the public
//! channels (`order_book`, `trades`, `ohlcv`) inbound payloads are
//! subscription requests and outbound payloads are INIT snapshots or
//! UPDATE deltas.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::WsError;
use crate::order::{Order, OrderCancel};
use crate::pair::PairQuery;
use crate::primitives::Hash;
use crate::trade::Trade;

pub const ORDER_CHANNEL: &str = "orders";
pub const ORDERBOOK_CHANNEL: &str = "order_book";
pub const TRADE_CHANNEL: &str = "trades";
pub const OHLCV_CHANNEL: &str = "ohlcv";

// Payload type discriminators.
pub const NEW_ORDER: &str = "NEW_ORDER";
pub const CANCEL_ORDER: &str = "CANCEL_ORDER";
pub const NEW_TRADE: &str = "NEW_TRADE";
pub const ORDER_ADDED: &str = "ORDER_ADDED";
pub const ORDER_CANCELLED: &str = "ORDER_CANCELLED";
pub const REQUEST_SIGNATURE: &str = "REQUEST_SIGNATURE";
pub const TRADE_EXECUTED: &str = "TRADE_EXECUTED";
pub const TRADE_TX_SUCCESS: &str = "TRADE_TX_SUCCESS";
pub const TRADE_TX_ERROR: &str = "TRADE_TX_ERROR";
pub const ERROR: &str = "ERROR";
pub const INIT: &str = "INIT";
pub const UPDATE: &str = "UPDATE";

/// Channel id for order book updates on a pair.
pub fn orderbook_channel_id(pair_name: &str) -> String {
    format!("{}/{}", ORDERBOOK_CHANNEL, pair_name)
}

/// Channel id for the public trade stream on a pair.
pub fn trades_channel_id(pair_name: &str) -> String {
    format!("{}/{}", TRADE_CHANNEL, pair_name)
}

/// Channel id for an OHLCV stream on a pair at a given resolution.
pub fn ohlcv_channel_id(pair_name: &str, units: &str, duration: i64) -> String {
    format!("{}/{}/{}/{}", OHLCV_CHANNEL, pair_name, units, duration)
}

/// Private channel id for one order's signing handshake.
pub fn order_channel_id(hash: &Hash) -> String {
    format!("order/{}", hash)
}

/// The outer websocket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketMessage {
    pub channel: String,
    pub payload: Value,
}

/// Typed payload used on the `orders` channel in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketPayload {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<Hash>,
    #[serde(default)]
    pub data: Value,
}

/// Whether a subscription frame opens or closes the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionEvent {
    Subscribe,
    Unsubscribe,
    Fetch,
}

/// Extra parameters on subscription frames; only OHLCV uses them all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Params {
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub units: String,
    #[serde(default, rename = "tickID")]
    pub tick_id: String,
}

/// Inbound payload on the public channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    pub event: SubscriptionEvent,
    pub pair: PairQuery,
    #[serde(default)]
    pub params: Params,
}

/// A decoded client-to-server message on the `orders` channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOrderMessage {
    NewOrder(Order),
    CancelOrder(OrderCancel),
    /// Taker returns the signed trade during the handshake; `order_hash`
    /// routes it to the right private channel.
    NewTrade { order_hash: Hash, trade: Trade },
}

impl WebSocketMessage {
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }

    /// Build an `orders`-channel frame with a typed payload.
    pub fn order_message(message_type: &str, hash: Option<Hash>, data: Value) -> Self {
        let payload = WebSocketPayload {
            message_type: message_type.to_string(),
            hash,
            data,
        };
        Self {
            channel: ORDER_CHANNEL.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    /// Decode the payload as an `orders`-channel triple.
    pub fn order_payload(&self) -> Result<WebSocketPayload, WsError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| WsError::BadPayload(e.to_string()))
    }

    /// Decode the payload as a public-channel subscription request.
    pub fn subscription(&self) -> Result<SubscriptionMessage, WsError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| WsError::BadPayload(e.to_string()))
    }

    /// Decode a client-to-server `orders` message by its discriminator.
    pub fn decode_order_message(&self) -> Result<InboundOrderMessage, WsError> {
        let payload = self.order_payload()?;
        match payload.message_type.as_str() {
            NEW_ORDER => {
                let order: Order = serde_json::from_value(payload.data)
                    .map_err(|e| WsError::BadPayload(e.to_string()))?;
                Ok(InboundOrderMessage::NewOrder(order))
            }
            CANCEL_ORDER => {
                let cancel: OrderCancel = serde_json::from_value(payload.data)
                    .map_err(|e| WsError::BadPayload(e.to_string()))?;
                Ok(InboundOrderMessage::CancelOrder(cancel))
            }
            NEW_TRADE => {
                let trade: Trade = serde_json::from_value(payload.data)
                    .map_err(|e| WsError::BadPayload(e.to_string()))?;
                let order_hash = payload.hash.unwrap_or(trade.taker_order_hash);
                Ok(InboundOrderMessage::NewTrade { order_hash, trade })
            }
            other => Err(WsError::UnknownMessageType {
                channel: self.channel.clone(),
                message_type: other.to_string(),
            }),
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
    fn test_channel_id_builders() {
        assert_eq!(orderbook_channel_id("WETH/DAI"), "order_book/WETH/DAI");
        assert_eq!(trades_channel_id("WETH/DAI"), "trades/WETH/DAI");
        assert_eq!(
            ohlcv_channel_id("WETH/DAI", "min", 5),
            "ohlcv/WETH/DAI/min/5"
        );
    }

    #[test]
    fn test_decode_new_order() {
        let order = sample_order();
        let msg = WebSocketMessage::order_message(
            NEW_ORDER,
            Some(order.hash),
            serde_json::to_value(&order).unwrap(),
        );

        match msg.decode_order_message().unwrap() {
            InboundOrderMessage::NewOrder(decoded) => assert_eq!(decoded.hash, order.hash),
            other => panic!("expected NewOrder, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_type() {
        let msg = WebSocketMessage::order_message("BOGUS", None, Value::Null);
        assert!(matches!(
            msg.decode_order_message(),
            Err(WsError::UnknownMessageType { .. })
        ));
    }

    #[test]
    fn test_subscription_decode() {
        let json = serde_json::json!({
            "channel": "ohlcv",
            "payload": {
                "event": "subscribe",
                "pair": {
                    "baseToken": "0x2034842261b82651885751fc293bba7ba5398156",
                    "quoteToken": "0x67b95b2e1c7e9a2c6fe3486acb01d1a454dfc8b3"
                },
                "params": {"from": 0, "to": 0, "duration": 5, "units": "min", "tickID": ""}
            }
        });
        let msg: WebSocketMessage = serde_json::from_value(json).unwrap();
        let sub = msg.subscription().unwrap();
        assert_eq!(sub.event, SubscriptionEvent::Subscribe);
        assert_eq!(sub.params.duration, 5);
        assert_eq!(sub.params.units, "min");
    }

    #[test]
    fn test_payload_hash_omitted_when_absent() {
        let msg = WebSocketMessage::order_message(ERROR, None, Value::String("oops".into()));
        let text = serde_json::to_string(&msg).unwrap();
        assert!(!text.contains("\"hash\""));
    }

    #[test]
    fn test_new_trade_falls_back_to_taker_hash() {
        let order = sample_order();
        let trade = Trade::new(
            &order,
            &order,
            TokenAmount::from_u64(5),
            1,
            1000,
        );
        let msg = WebSocketMessage::order_message(
            NEW_TRADE,
            None,
            serde_json::to_value(&trade).unwrap(),
        );
        match msg.decode_order_message().unwrap() {
            InboundOrderMessage::NewTrade { order_hash, .. } => {
                assert_eq!(order_hash, trade.taker_order_hash)
            }
            other => panic!("expected NewTrade, got {:?}", other),
        }
    }
}
