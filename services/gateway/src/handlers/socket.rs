//! The `/socket` websocket endpoint
//!
//! Each connection gets a reader loop (this handler) and one writer task
//! draining the hub-side outbound queue, so all writes on a connection
//! are serialized. Inbound frames are dispatched on the envelope's
//! channel; the payload decode is driven by the (channel, type) pair.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use types::ws::{self, InboundOrderMessage, SubscriptionEvent, SubscriptionMessage,
    WebSocketMessage, WebSocketPayload};

use crate::hub::ConnectionHandle;
use crate::state::AppState;

/// How many recent trades go into a trades INIT snapshot.
const TRADES_INIT_LIMIT: usize = 50;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (conn, mut outbound) = state.hub.register_connection();

    // Single writer per connection
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let message: WebSocketMessage = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "undecodable websocket frame");
                send_channel_error(&conn, ws::ORDER_CHANNEL, &e.to_string());
                continue;
            }
        };
        dispatch(&state, &conn, message).await;
    }

    // Mandatory cleanup: the connection leaves every subscriber set
    state.hub.connection_closed(conn.id());
    writer.abort();
}

async fn dispatch(state: &AppState, conn: &ConnectionHandle, message: WebSocketMessage) {
    match message.channel.as_str() {
        ws::ORDER_CHANNEL => handle_order_message(state, conn, &message).await,
        ws::ORDERBOOK_CHANNEL | ws::TRADE_CHANNEL | ws::OHLCV_CHANNEL => {
            handle_subscription(state, conn, &message).await
        }
        other => {
            warn!(channel = other, "message on unknown channel");
            send_channel_error(conn, other, "unknown channel");
        }
    }
}

/// NEW_ORDER / CANCEL_ORDER / NEW_TRADE on the `orders` channel.
async fn handle_order_message(state: &AppState, conn: &ConnectionHandle, message: &WebSocketMessage) {
    match message.decode_order_message() {
        Ok(InboundOrderMessage::NewOrder(order)) => {
            // The private channel exists before validation so rejections
            // reach the client
            state.hub.register_order_channel(order.hash, conn);
            let hash = order.hash;
            if let Err(e) = state.order_service.new_order(order).await {
                warn!(order = %hash, error = %e, "order rejected");
                state
                    .hub
                    .send_order_message(&hash, ws::ERROR, Value::String(e.to_string()));
            }
        }
        Ok(InboundOrderMessage::CancelOrder(cancel)) => {
            state.hub.register_order_channel(cancel.order_hash, conn);
            let hash = cancel.order_hash;
            if let Err(e) = state.order_service.cancel_order(cancel).await {
                warn!(order = %hash, error = %e, "cancel rejected");
                state
                    .hub
                    .send_order_message(&hash, ws::ERROR, Value::String(e.to_string()));
            }
        }
        Ok(InboundOrderMessage::NewTrade { order_hash, trade }) => {
            let payload = WebSocketPayload {
                message_type: ws::NEW_TRADE.to_string(),
                hash: Some(order_hash),
                data: serde_json::to_value(&trade).unwrap_or_default(),
            };
            if !state.hub.forward_client_payload(&order_hash, payload) {
                debug!(order = %order_hash, "NEW_TRADE for unknown order channel");
            }
        }
        Err(e) => {
            send_channel_error(conn, ws::ORDER_CHANNEL, &e.to_string());
        }
    }
}

/// subscribe / unsubscribe / fetch on the public channels.
async fn handle_subscription(state: &AppState, conn: &ConnectionHandle, message: &WebSocketMessage) {
    let subscription = match message.subscription() {
        Ok(subscription) => subscription,
        Err(e) => {
            send_channel_error(conn, &message.channel, &e.to_string());
            return;
        }
    };

    let pair = match state
        .pairs
        .get_by_tokens(
            &subscription.pair.base_token,
            &subscription.pair.quote_token,
        )
        .await
    {
        Ok(Some(pair)) => pair,
        _ => {
            send_channel_error(conn, &message.channel, "no pair for those tokens");
            return;
        }
    };

    let channel_id = match channel_id_for(&message.channel, &pair.name, &subscription) {
        Some(id) => id,
        None => {
            send_channel_error(conn, &message.channel, "bad subscription parameters");
            return;
        }
    };

    match subscription.event {
        SubscriptionEvent::Subscribe => {
            state.hub.subscribe(&channel_id, conn);
            send_init(state, conn, &message.channel, &pair.name, &subscription).await;
        }
        SubscriptionEvent::Fetch => {
            send_init(state, conn, &message.channel, &pair.name, &subscription).await;
        }
        SubscriptionEvent::Unsubscribe => {
            state.hub.unsubscribe(&channel_id, conn.id());
        }
    }
}

fn channel_id_for(
    channel: &str,
    pair_name: &str,
    subscription: &SubscriptionMessage,
) -> Option<String> {
    match channel {
        ws::ORDERBOOK_CHANNEL => Some(ws::orderbook_channel_id(pair_name)),
        ws::TRADE_CHANNEL => Some(ws::trades_channel_id(pair_name)),
        ws::OHLCV_CHANNEL => {
            if subscription.params.units.is_empty() || subscription.params.duration <= 0 {
                return None;
            }
            Some(ws::ohlcv_channel_id(
                pair_name,
                &subscription.params.units,
                subscription.params.duration,
            ))
        }
        _ => None,
    }
}

/// Full snapshot pushed on subscribe, before any UPDATE deltas.
async fn send_init(
    state: &AppState,
    conn: &ConnectionHandle,
    channel: &str,
    pair_name: &str,
    subscription: &SubscriptionMessage,
) {
    let data = match channel {
        ws::ORDERBOOK_CHANNEL => match state.orderbook.snapshot(pair_name).await {
            Ok(snapshot) => serde_json::to_value(snapshot).unwrap_or_default(),
            Err(e) => {
                warn!(pair = pair_name, error = %e, "snapshot failed");
                return;
            }
        },
        ws::TRADE_CHANNEL => match state.trades.get_by_pair(pair_name, TRADES_INIT_LIMIT).await {
            Ok(trades) => serde_json::to_value(trades).unwrap_or_default(),
            Err(e) => {
                warn!(pair = pair_name, error = %e, "trade history failed");
                return;
            }
        },
        ws::OHLCV_CHANNEL => {
            let params = &subscription.params;
            let ticks = state
                .ohlcv
                .snapshot(
                    pair_name,
                    &params.units,
                    params.duration,
                    params.from,
                    params.to,
                )
                .await;
            serde_json::to_value(ticks).unwrap_or_default()
        }
        _ => return,
    };

    let payload = serde_json::json!({
        "type": ws::INIT,
        "data": data,
    });
    conn.send(WebSocketMessage::new(channel, payload));
}

fn send_channel_error(conn: &ConnectionHandle, channel: &str, message: &str) {
    let payload = serde_json::json!({
        "type": ws::ERROR,
        "data": message,
    });
    conn.send(WebSocketMessage::new(channel, payload));
}
