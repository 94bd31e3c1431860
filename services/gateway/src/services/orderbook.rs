//! Order book snapshots for the public order_book channel

use std::sync::Arc;

use matching_engine::{BookStore, DepthSnapshot, StoreError};

/// Levels per side returned in INIT snapshots.
const SNAPSHOT_DEPTH: usize = 50;

/// Read-side view over the shared book store.
pub struct OrderBookService {
    book: Arc<dyn BookStore>,
}

impl OrderBookService {
    pub fn new(book: Arc<dyn BookStore>) -> Self {
        Self { book }
    }

    /// Full snapshot sent when a client subscribes.
    pub async fn snapshot(&self, pair_name: &str) -> Result<DepthSnapshot, StoreError> {
        self.book.depth(pair_name, SNAPSHOT_DEPTH).await
    }
}
