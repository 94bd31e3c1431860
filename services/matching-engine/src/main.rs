use std::sync::Arc;

use matching_engine::{
    EngineSettings, Matcher, RedisBookStore, RedisPublisher, RedisQueue, WorkerPool,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();

    let settings = EngineSettings::load()?;
    tracing::info!(redis = %settings.redis_url, "starting matching engine");

    let store = Arc::new(RedisBookStore::connect(&settings.redis_url).await?);
    let queue = RedisQueue::connect(&settings.redis_url, settings.engine.queue_key.clone()).await?;
    queue.recover_pending().await?;

    let publisher = Arc::new(
        RedisPublisher::connect(&settings.redis_url, settings.engine.response_channel.clone())
            .await?,
    );

    let matcher = Arc::new(Matcher::new(store));
    let pool = WorkerPool::new(matcher, publisher, settings.engine.workers);

    tokio::select! {
        result = pool.run(queue) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
