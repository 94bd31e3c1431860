//! Document store interfaces
//!
//! The persistent document store is an external collaborator; the core
//! only depends on these operation sets. Orders persist on every
//! transition, trades on creation and settlement callbacks. The
//! in-memory implementations back single-process deployments and tests.

mod memory;

pub use memory::{MemoryAccountDao, MemoryOrderDao, MemoryPairDao, MemoryTradeDao};

use async_trait::async_trait;
use thiserror::Error;

use types::account::Account;
use types::order::Order;
use types::pair::{Token, TokenPair};
use types::primitives::{Address, Hash};
use types::trade::Trade;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DaoError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Duplicate,
}

#[async_trait]
pub trait OrderDao: Send + Sync {
    /// Insert a new order; assigns the internal id and timestamps.
    async fn create(&self, order: &mut Order) -> Result<(), DaoError>;

    /// Write-through by hash; inserts when missing (engine responses may
    /// arrive before the create is visible).
    async fn upsert(&self, order: &Order) -> Result<(), DaoError>;

    async fn get_by_hash(&self, hash: &Hash) -> Result<Option<Order>, DaoError>;

    async fn get_by_address(&self, address: &Address) -> Result<Vec<Order>, DaoError>;
}

#[async_trait]
pub trait TradeDao: Send + Sync {
    /// Insert a new trade. `Duplicate` when the hash is already stored,
    /// which is how redelivered engine responses are deduplicated.
    async fn create(&self, trade: &mut Trade) -> Result<(), DaoError>;

    async fn upsert(&self, trade: &Trade) -> Result<(), DaoError>;

    async fn get_by_hash(&self, hash: &Hash) -> Result<Option<Trade>, DaoError>;

    /// Most recent trades for a pair, newest first.
    async fn get_by_pair(&self, pair_name: &str, limit: usize) -> Result<Vec<Trade>, DaoError>;
}

#[async_trait]
pub trait AccountDao: Send + Sync {
    async fn create(&self, account: &Account) -> Result<(), DaoError>;

    async fn get_by_address(&self, address: &Address) -> Result<Option<Account>, DaoError>;

    async fn update(&self, account: &Account) -> Result<(), DaoError>;
}

#[async_trait]
pub trait PairDao: Send + Sync {
    async fn all(&self) -> Result<Vec<TokenPair>, DaoError>;

    async fn get_by_name(&self, name: &str) -> Result<Option<TokenPair>, DaoError>;

    /// Resolve a pair from the two token addresses, in either
    /// orientation.
    async fn get_by_tokens(
        &self,
        first: &Address,
        second: &Address,
    ) -> Result<Option<TokenPair>, DaoError>;

    /// All tokens participating in any registered pair.
    async fn tokens(&self) -> Result<Vec<Token>, DaoError>;
}
