//! Subscription hub
//!
//! Tracks two populations: public channels (order book, trades, OHLCV
//! per pair) with broadcast fanout, and private per-order channels used
//! for the trade-signing handshake. Each websocket connection owns one
//! bounded outbound queue drained by a single writer task, so writes are
//! serialized and a broadcaster never blocks: a subscriber whose queue
//! overflows is dropped instead. A closed connection is removed from
//! every subscriber set.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use types::primitives::Hash;
use types::ws::{WebSocketMessage, WebSocketPayload};

/// Opaque id for one websocket connection.
pub type ConnectionId = u64;

/// Sender half of one connection's outbound queue.
///
/// Cloneable; the matching receiver is drained by the connection's
/// writer task.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<WebSocketMessage>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Non-blocking send. `false` means the connection is gone or its
    /// queue overflowed and the caller should drop it.
    pub fn send(&self, message: WebSocketMessage) -> bool {
        self.tx.try_send(message).is_ok()
    }
}

/// Private bidirectional path for one order hash.
struct OrderChannel {
    owner: ConnectionHandle,
    to_service: mpsc::UnboundedSender<WebSocketPayload>,
    /// Parked until the order service claims it for the handshake.
    client_rx: Mutex<Option<mpsc::UnboundedReceiver<WebSocketPayload>>>,
}

/// Central registry for public and private channels.
pub struct SubscriptionHub {
    next_id: AtomicU64,
    outbound_buffer: usize,
    channels: DashMap<String, Vec<ConnectionHandle>>,
    order_channels: DashMap<Hash, OrderChannel>,
}

impl SubscriptionHub {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            outbound_buffer,
            channels: DashMap::new(),
            order_channels: DashMap::new(),
        }
    }

    /// Register a connection, returning its handle and the outbound
    /// queue for the writer task.
    pub fn register_connection(&self) -> (ConnectionHandle, mpsc::Receiver<WebSocketMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        (ConnectionHandle { id, tx }, rx)
    }

    /// Add a connection to a public channel (idempotent).
    pub fn subscribe(&self, channel_id: &str, handle: &ConnectionHandle) {
        let mut entry = self.channels.entry(channel_id.to_string()).or_default();
        if !entry.iter().any(|h| h.id == handle.id) {
            entry.push(handle.clone());
            debug!(channel = channel_id, conn = handle.id, "subscribed");
        }
    }

    pub fn unsubscribe(&self, channel_id: &str, conn: ConnectionId) {
        if let Some(mut entry) = self.channels.get_mut(channel_id) {
            entry.retain(|h| h.id != conn);
        }
    }

    /// Broadcast to every subscriber of a public channel.
    ///
    /// Sends never block; subscribers that fail (overflow or closed) are
    /// dropped from the hub entirely.
    pub fn broadcast(&self, channel_id: &str, message: WebSocketMessage) {
        let mut dropped = Vec::new();
        if let Some(entry) = self.channels.get(channel_id) {
            for handle in entry.iter() {
                if !handle.send(message.clone()) {
                    dropped.push(handle.id);
                }
            }
        }
        for conn in dropped {
            warn!(channel = channel_id, conn, "dropping slow subscriber");
            self.connection_closed(conn);
        }
    }

    pub fn subscriber_count(&self, channel_id: &str) -> usize {
        self.channels.get(channel_id).map_or(0, |e| e.len())
    }

    /// Channel ids with at least one subscriber under a prefix; used by
    /// the OHLCV broadcaster to find live resolutions for a pair.
    pub fn channels_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.channels
            .iter()
            .filter(|entry| !entry.value().is_empty() && entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Register `owner` as the private channel owner for an order hash.
    ///
    /// Re-registration replaces the previous channel (the client
    /// reconnected).
    pub fn register_order_channel(&self, hash: Hash, owner: &ConnectionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.order_channels.insert(
            hash,
            OrderChannel {
                owner: owner.clone(),
                to_service: tx,
                client_rx: Mutex::new(Some(rx)),
            },
        );
        debug!(order = %hash, conn = owner.id, "order channel registered");
    }

    pub fn has_order_channel(&self, hash: &Hash) -> bool {
        self.order_channels.contains_key(hash)
    }

    /// Claim the client-to-service half of an order channel. The order
    /// service takes this once, for the signature handshake.
    pub async fn take_client_receiver(
        &self,
        hash: &Hash,
    ) -> Option<mpsc::UnboundedReceiver<WebSocketPayload>> {
        let entry = self.order_channels.get(hash)?;
        let mut slot = entry.client_rx.lock().await;
        slot.take()
    }

    /// Relay an inbound client payload (NEW_TRADE) onto the service side
    /// of the order channel.
    pub fn forward_client_payload(&self, hash: &Hash, payload: WebSocketPayload) -> bool {
        match self.order_channels.get(hash) {
            Some(entry) => entry.to_service.send(payload).is_ok(),
            None => false,
        }
    }

    /// Push a service-to-client message on an order's private channel.
    pub fn send_order_message(&self, hash: &Hash, message_type: &str, data: Value) -> bool {
        let Some(entry) = self.order_channels.get(hash) else {
            return false;
        };
        let message = WebSocketMessage::order_message(message_type, Some(*hash), data);
        let delivered = entry.owner.send(message);
        if !delivered {
            let conn = entry.owner.id;
            drop(entry);
            warn!(order = %hash, conn, "order channel owner unreachable");
            self.connection_closed(conn);
        }
        delivered
    }

    pub fn unregister_order_channel(&self, hash: &Hash) {
        self.order_channels.remove(hash);
    }

    /// Remove a connection from every subscriber set and drop the order
    /// channels it owns. Invoked on disconnect and on send failure.
    pub fn connection_closed(&self, conn: ConnectionId) {
        for mut entry in self.channels.iter_mut() {
            entry.value_mut().retain(|h| h.id != conn);
        }
        self.order_channels.retain(|_, ch| ch.owner.id != conn);
    }
}
