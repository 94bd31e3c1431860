//! Durable work queue
//!
//! One logical queue, `matching.engine`, between the order service and
//! the engine workers. The cache-backed implementation uses the
//! reliable-queue pattern: consumers move an entry into a processing list
//! and only delete it on ack, so a crashed worker leaves its message for
//! redelivery. The in-memory implementation backs single-process
//! deployments and tests.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

use types::events::EngineMessage;

use crate::error::QueueError;

/// Default queue key.
pub const ENGINE_QUEUE_KEY: &str = "matching.engine";

/// One message popped from the queue; `token` holds whatever the
/// implementation needs to ack it later.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: EngineMessage,
    token: Option<String>,
}

/// Producer half: used by the order service.
#[async_trait]
pub trait QueueProducer: Send + Sync {
    async fn push(&self, message: &EngineMessage) -> Result<(), QueueError>;
}

/// Consumer half: used by the engine worker pool. `pop` may return
/// `None` on a poll timeout so callers can observe shutdown.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    async fn pop(&self) -> Result<Option<Delivery>, QueueError>;

    /// Acked only after book mutations committed and the response was
    /// published.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;
}

/// In-process queue over an unbounded channel.
pub struct MemoryQueue;

impl MemoryQueue {
    /// Split into a cloneable producer and a single consumer.
    pub fn channel() -> (MemoryQueueProducer, MemoryQueueConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MemoryQueueProducer { tx },
            MemoryQueueConsumer {
                rx: Mutex::new(rx),
            },
        )
    }
}

#[derive(Clone)]
pub struct MemoryQueueProducer {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

#[async_trait]
impl QueueProducer for MemoryQueueProducer {
    async fn push(&self, message: &EngineMessage) -> Result<(), QueueError> {
        self.tx
            .send(message.clone())
            .map_err(|_| QueueError::Closed)
    }
}

pub struct MemoryQueueConsumer {
    rx: Mutex<mpsc::UnboundedReceiver<EngineMessage>>,
}

#[async_trait]
impl QueueConsumer for MemoryQueueConsumer {
    async fn pop(&self) -> Result<Option<Delivery>, QueueError> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(message) => Ok(Some(Delivery {
                message,
                token: None,
            })),
            None => Err(QueueError::Closed),
        }
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Cache-backed durable queue.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    queue_key: String,
    processing_key: String,
}

impl RedisQueue {
    pub fn new(conn: ConnectionManager, queue_key: impl Into<String>) -> Self {
        let queue_key = queue_key.into();
        let processing_key = format!("{}:processing", queue_key);
        Self {
            conn,
            queue_key,
            processing_key,
        }
    }

    pub async fn connect(url: &str, queue_key: impl Into<String>) -> Result<Self, QueueError> {
        let client = redis::Client::open(url).map_err(QueueError::Broker)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(QueueError::Broker)?;
        Ok(Self::new(conn, queue_key))
    }

    /// Requeue entries a crashed worker left in the processing list.
    ///
    /// Called once at startup, before the pool begins consuming.
    pub async fn recover_pending(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let mut recovered = 0;
        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing_key)
                .arg(&self.queue_key)
                .arg("RIGHT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        if recovered > 0 {
            info!(count = recovered, "requeued unacked engine messages");
        }
        Ok(recovered)
    }
}

#[async_trait]
impl QueueProducer for RedisQueue {
    async fn push(&self, message: &EngineMessage) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(message)?;
        conn.lpush::<_, _, ()>(&self.queue_key, body).await?;
        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for RedisQueue {
    async fn pop(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.queue_key)
            .arg(&self.processing_key)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(1.0f64)
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(message) => Ok(Some(Delivery {
                message,
                token: Some(raw),
            })),
            Err(e) => {
                // A poison message would redeliver forever; drop it loudly
                error!(error = %e, "dropping undecodable queue message");
                let mut conn = self.conn.clone();
                conn.lrem::<_, _, ()>(&self.processing_key, 1, &raw).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        if let Some(token) = &delivery.token {
            let mut conn = self.conn.clone();
            conn.lrem::<_, _, ()>(&self.processing_key, 1, token).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::TokenAmount;
    use types::order::{Order, Side};
    use types::pair::{Token, TokenPair};
    use types::primitives::Address;

    fn sample_message() -> EngineMessage {
        let pair = TokenPair::new(
            Token::new(Address::zero(), "WETH", 18),
            Token::new(Address::zero(), "DAI", 18),
        );
        let order = Order::limit(
            &pair,
            Address::zero(),
            Address::zero(),
            Side::Buy,
            TokenAmount::from_u64(10),
            TokenAmount::from_u64(1000),
            1,
            4_102_444_800,
        )
        .unwrap();
        EngineMessage::NewOrder(order)
    }

    #[tokio::test]
    async fn test_memory_queue_roundtrip() {
        let (producer, consumer) = MemoryQueue::channel();
        producer.push(&sample_message()).await.unwrap();

        let delivery = consumer.pop().await.unwrap().unwrap();
        assert_eq!(delivery.message, sample_message());
        consumer.ack(&delivery).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_queue_closed() {
        let (producer, consumer) = MemoryQueue::channel();
        drop(producer);
        assert!(matches!(consumer.pop().await, Err(QueueError::Closed)));
    }

    #[tokio::test]
    async fn test_memory_queue_preserves_order() {
        let (producer, consumer) = MemoryQueue::channel();
        let first = sample_message();
        producer.push(&first).await.unwrap();

        let EngineMessage::NewOrder(mut order) = sample_message() else {
            unreachable!()
        };
        order.nonce = 2;
        order.hash = order.compute_hash();
        let second = EngineMessage::NewOrder(order);
        producer.push(&second).await.unwrap();

        assert_eq!(consumer.pop().await.unwrap().unwrap().message, first);
        assert_eq!(consumer.pop().await.unwrap().unwrap().message, second);
    }
}
