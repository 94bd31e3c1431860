//! Matching engine service
//!
//! Consumes order messages from the durable work queue, mutates the
//! shared order book store, and publishes one engine response per input.
//! The engine runs as a pool of shard workers; messages are routed to a
//! shard by hashing the pair name, which keeps a single writer per pair
//! while distinct pairs proceed in parallel.

pub mod config;
pub mod error;
pub mod matcher;
pub mod publisher;
pub mod queue;
pub mod store;
pub mod worker;

pub use config::EngineSettings;
pub use error::{EngineError, QueueError, StoreError};
pub use matcher::Matcher;
pub use publisher::{BroadcastPublisher, RedisPublisher, ResponsePublisher};
pub use queue::{Delivery, MemoryQueue, QueueConsumer, QueueProducer, RedisQueue};
pub use store::{BookStore, DepthSnapshot, MemoryBookStore, RedisBookStore};
pub use worker::WorkerPool;
