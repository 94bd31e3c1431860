//! Engine worker pool
//!
//! A dispatcher task pops queue messages and routes each to a shard task
//! by hashing the pair name, so all messages for one pair are applied by
//! a single writer in arrival order while distinct pairs proceed in
//! parallel. A shard acks a message only after the book mutation
//! committed and the response was published; a shard that hits an
//! infrastructure error exits without acking, leaving the message for
//! redelivery.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash as _, Hasher};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Buffered deliveries per shard before the dispatcher backpressures.
const SHARD_QUEUE_DEPTH: usize = 256;

use crate::error::{EngineError, QueueError};
use crate::matcher::Matcher;
use crate::publisher::ResponsePublisher;
use crate::queue::{Delivery, QueueConsumer};
use crate::store::BookStore;

/// Shard index for a pair, stable for the lifetime of the pool.
pub fn shard_for(pair_name: &str, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    pair_name.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

/// Pool of shard workers over one shared matcher.
pub struct WorkerPool<S, P> {
    matcher: Arc<Matcher<S>>,
    publisher: Arc<P>,
    shards: usize,
}

impl<S, P> WorkerPool<S, P>
where
    S: BookStore + Send + Sync + 'static,
    P: ResponsePublisher + 'static,
{
    pub fn new(matcher: Arc<Matcher<S>>, publisher: Arc<P>, shards: usize) -> Self {
        Self {
            matcher,
            publisher,
            shards: shards.max(1),
        }
    }

    /// Run until the queue closes. Consumes the pool.
    pub async fn run<C>(self, consumer: C) -> Result<(), EngineError>
    where
        C: QueueConsumer + 'static,
    {
        let consumer = Arc::new(consumer);
        let mut senders: Vec<mpsc::Sender<Delivery>> = Vec::with_capacity(self.shards);
        let mut handles = Vec::with_capacity(self.shards);

        for shard_id in 0..self.shards {
            let (tx, handle) = self.spawn_shard(shard_id, &consumer);
            senders.push(tx);
            handles.push(handle);
        }

        info!(shards = self.shards, "engine worker pool started");

        loop {
            match consumer.pop().await {
                Ok(Some(delivery)) => {
                    let shard = shard_for(delivery.message.pair_name(), self.shards);
                    if let Err(mpsc::error::SendError(delivery)) =
                        senders[shard].send(delivery).await
                    {
                        // The shard worker died on an infrastructure
                        // error without acking its message; that message
                        // redelivers. Other pairs keep matching on their
                        // own shards while this one restarts.
                        warn!(shard, "shard worker exited, respawning");
                        let (tx, handle) = self.spawn_shard(shard, &consumer);
                        senders[shard] = tx;
                        handles[shard] = handle;
                        if senders[shard].send(delivery).await.is_err() {
                            error!(shard, "respawned shard rejected delivery, leaving for redelivery");
                        }
                    }
                }
                Ok(None) => continue,
                Err(QueueError::Closed) => {
                    info!("engine queue closed, draining shards");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "queue receive failed");
                    return Err(e.into());
                }
            }
        }

        drop(senders);
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    fn spawn_shard<C>(
        &self,
        shard_id: usize,
        consumer: &Arc<C>,
    ) -> (mpsc::Sender<Delivery>, tokio::task::JoinHandle<()>)
    where
        C: QueueConsumer + 'static,
    {
        let (tx, rx) = mpsc::channel::<Delivery>(SHARD_QUEUE_DEPTH);
        let handle = tokio::spawn(Self::run_shard(
            shard_id,
            rx,
            self.matcher.clone(),
            self.publisher.clone(),
            consumer.clone(),
        ));
        (tx, handle)
    }

    async fn run_shard<C>(
        shard_id: usize,
        mut rx: mpsc::Receiver<Delivery>,
        matcher: Arc<Matcher<S>>,
        publisher: Arc<P>,
        consumer: Arc<C>,
    ) where
        C: QueueConsumer,
    {
        while let Some(delivery) = rx.recv().await {
            match matcher.process(delivery.message.clone()).await {
                Ok(response) => {
                    if let Err(e) = publisher.publish(&response).await {
                        // Unacked: the message redelivers after restart
                        error!(shard = shard_id, error = %e, "publish failed, worker exiting");
                        return;
                    }
                    if let Err(e) = consumer.ack(&delivery).await {
                        error!(shard = shard_id, error = %e, "ack failed, worker exiting");
                        return;
                    }
                }
                Err(e) => {
                    error!(shard = shard_id, error = %e, "book mutation failed, worker exiting");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_routing_is_stable() {
        let a = shard_for("WETH/DAI", 4);
        assert_eq!(a, shard_for("WETH/DAI", 4));
        assert!(a < 4);
    }

    #[test]
    fn test_single_shard_degenerates_to_global_writer() {
        assert_eq!(shard_for("WETH/DAI", 1), 0);
        assert_eq!(shard_for("WBTC/DAI", 1), 0);
    }
}
