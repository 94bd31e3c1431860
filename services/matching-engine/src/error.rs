//! Engine error types
//!
//! Store and queue failures are infrastructure errors: the message in
//! flight is not acked and redelivery applies. Logical problems (cancel
//! of a missing order, invalid state) never surface here; they become
//! `ERROR` engine responses with state unchanged.

use thiserror::Error;

/// Order book store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt book entry: {0}")]
    Corrupt(String),
}

/// Work queue failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("queue closed")]
    Closed,
}

/// Top-level engine failure; fatal to the worker that hits it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("publish error: {0}")]
    Publish(String),
}
