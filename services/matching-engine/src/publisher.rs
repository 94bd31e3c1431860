//! Engine response publishing
//!
//! Every processed message produces one response. Standalone workers
//! publish JSON onto the cache's pub/sub channel for the gateway to pick
//! up; the in-process publisher feeds a broadcast channel directly and is
//! what single-process deployments and tests use.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::broadcast;
use tracing::{error, warn};

use types::events::EngineResponse;

use crate::error::EngineError;

/// Default pub/sub channel for engine responses.
pub const RESPONSE_CHANNEL: &str = "engine.responses";

#[async_trait]
pub trait ResponsePublisher: Send + Sync {
    async fn publish(&self, response: &EngineResponse) -> Result<(), EngineError>;
}

/// Publishes responses to a cache pub/sub channel.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: ConnectionManager,
    channel: String,
}

impl RedisPublisher {
    pub fn new(conn: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
        }
    }

    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Self, EngineError> {
        let client = redis::Client::open(url).map_err(|e| EngineError::Publish(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| EngineError::Publish(e.to_string()))?;
        Ok(Self::new(conn, channel))
    }
}

#[async_trait]
impl ResponsePublisher for RedisPublisher {
    async fn publish(&self, response: &EngineResponse) -> Result<(), EngineError> {
        let body =
            serde_json::to_string(response).map_err(|e| EngineError::Publish(e.to_string()))?;

        let mut conn = self.conn.clone();
        let first = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(&body)
            .query_async::<_, ()>(&mut conn)
            .await;

        if let Err(e) = first {
            // One retry over a fresh connection before giving up
            warn!(error = %e, "publish failed, retrying");
            let mut retry_conn = self.conn.clone();
            redis::cmd("PUBLISH")
                .arg(&self.channel)
                .arg(&body)
                .query_async::<_, ()>(&mut retry_conn)
                .await
                .map_err(|e2| {
                    error!(error = %e2, "publish retry failed");
                    EngineError::Publish(e2.to_string())
                })?;
        }
        Ok(())
    }
}

/// Publishes responses onto an in-process broadcast channel.
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<EngineResponse>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineResponse> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl ResponsePublisher for BroadcastPublisher {
    async fn publish(&self, response: &EngineResponse) -> Result<(), EngineError> {
        // No receivers is fine; responses are simply dropped
        let _ = self.tx.send(response.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_publisher_fans_out() {
        let publisher = BroadcastPublisher::new(16);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        let response = EngineResponse::Error {
            message: "boom".into(),
            hash: None,
        };
        publisher.publish(&response).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), response);
        assert_eq!(second.recv().await.unwrap(), response);
    }

    #[tokio::test]
    async fn test_broadcast_publisher_without_receivers() {
        let publisher = BroadcastPublisher::new(16);
        let response = EngineResponse::Error {
            message: "dropped".into(),
            hash: None,
        };
        assert!(publisher.publish(&response).await.is_ok());
    }
}
