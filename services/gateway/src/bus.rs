//! Engine response bus
//!
//! Process-local fan-out of engine responses. The order service is the
//! primary consumer; the market-data broadcasters are secondary.
//! Delivery is at-least-once within the process, so consumers key on
//! order and trade hashes to tolerate duplicates. When the engine runs
//! out of process, a feed task subscribes to the cache's pub/sub channel
//! and republishes onto the bus.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use matching_engine::{BroadcastPublisher, ResponsePublisher};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info, warn};

use types::events::EngineResponse;

/// In-process fan-out with a bounded replay buffer per consumer.
#[derive(Clone)]
pub struct EngineResponseBus {
    inner: BroadcastPublisher,
}

impl EngineResponseBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: BroadcastPublisher::new(capacity),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineResponse> {
        self.inner.subscribe()
    }

    /// The publisher half, handed to an embedded engine worker pool.
    pub fn publisher(&self) -> BroadcastPublisher {
        self.inner.clone()
    }

    pub async fn publish(&self, response: &EngineResponse) {
        // Broadcast publish only fails with zero receivers, which is fine
        let _ = self.inner.publish(response).await;
    }

    /// Subscribe to the engine's pub/sub channel and republish every
    /// response onto the bus. Reconnects with a short backoff when the
    /// subscription drops.
    pub async fn run_redis_feed(self: Arc<Self>, redis_url: String, channel: String) {
        loop {
            let client = match redis::Client::open(redis_url.as_str()) {
                Ok(client) => client,
                Err(e) => {
                    error!(error = %e, "invalid redis url for response feed");
                    return;
                }
            };

            let pubsub = match client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(e) => {
                    error!(error = %e, "response feed connection failed, retrying");
                    sleep(Duration::from_millis(500)).await;
                    continue;
                }
            };

            let mut pubsub = pubsub;
            if let Err(e) = pubsub.subscribe(&channel).await {
                error!(error = %e, channel = %channel, "response feed subscribe failed, retrying");
                sleep(Duration::from_millis(500)).await;
                continue;
            }

            info!(channel = %channel, "engine response feed connected");
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "undecodable response payload");
                        continue;
                    }
                };
                match serde_json::from_str::<EngineResponse>(&payload) {
                    Ok(response) => self.publish(&response).await,
                    Err(e) => warn!(error = %e, "dropping malformed engine response"),
                }
            }

            warn!("response feed stream ended, reconnecting");
            sleep(Duration::from_millis(500)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_fans_out_to_multiple_consumers() {
        let bus = EngineResponseBus::new(16);
        let mut order_service = bus.subscribe();
        let mut market_feed = bus.subscribe();

        let response = EngineResponse::Error {
            message: "test".into(),
            hash: None,
        };
        bus.publish(&response).await;

        assert_eq!(order_service.recv().await.unwrap(), response);
        assert_eq!(market_feed.recv().await.unwrap(), response);
    }
}
