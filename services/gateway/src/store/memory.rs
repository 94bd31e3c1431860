//! In-memory document store implementations

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use types::account::Account;
use types::order::Order;
use types::pair::{Token, TokenPair};
use types::primitives::{Address, Hash};
use types::trade::Trade;

use super::{AccountDao, DaoError, OrderDao, PairDao, TradeDao};

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Default)]
pub struct MemoryOrderDao {
    orders: RwLock<HashMap<Hash, Order>>,
}

impl MemoryOrderDao {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderDao for MemoryOrderDao {
    async fn create(&self, order: &mut Order) -> Result<(), DaoError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.hash) {
            return Err(DaoError::Duplicate);
        }
        order.id = Uuid::new_v4();
        order.created_at = unix_now();
        order.updated_at = order.created_at;
        orders.insert(order.hash, order.clone());
        Ok(())
    }

    async fn upsert(&self, order: &Order) -> Result<(), DaoError> {
        let mut orders = self.orders.write().await;
        let mut stored = order.clone();
        if let Some(existing) = orders.get(&order.hash) {
            stored.id = existing.id;
            stored.created_at = existing.created_at;
        } else if stored.id.is_nil() {
            stored.id = Uuid::new_v4();
        }
        stored.updated_at = unix_now();
        orders.insert(stored.hash, stored);
        Ok(())
    }

    async fn get_by_hash(&self, hash: &Hash) -> Result<Option<Order>, DaoError> {
        Ok(self.orders.read().await.get(hash).cloned())
    }

    async fn get_by_address(&self, address: &Address) -> Result<Vec<Order>, DaoError> {
        let orders = self.orders.read().await;
        let mut result: Vec<Order> = orders
            .values()
            .filter(|o| o.maker == *address)
            .cloned()
            .collect();
        result.sort_by_key(|o| o.created_at);
        Ok(result)
    }
}

#[derive(Default)]
pub struct MemoryTradeDao {
    trades: RwLock<HashMap<Hash, Trade>>,
}

impl MemoryTradeDao {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeDao for MemoryTradeDao {
    async fn create(&self, trade: &mut Trade) -> Result<(), DaoError> {
        let mut trades = self.trades.write().await;
        if trades.contains_key(&trade.hash) {
            return Err(DaoError::Duplicate);
        }
        trade.id = Uuid::new_v4();
        trades.insert(trade.hash, trade.clone());
        Ok(())
    }

    async fn upsert(&self, trade: &Trade) -> Result<(), DaoError> {
        let mut trades = self.trades.write().await;
        let mut stored = trade.clone();
        if let Some(existing) = trades.get(&trade.hash) {
            stored.id = existing.id;
        } else if stored.id.is_nil() {
            stored.id = Uuid::new_v4();
        }
        stored.updated_at = unix_now();
        trades.insert(stored.hash, stored);
        Ok(())
    }

    async fn get_by_hash(&self, hash: &Hash) -> Result<Option<Trade>, DaoError> {
        Ok(self.trades.read().await.get(hash).cloned())
    }

    async fn get_by_pair(&self, pair_name: &str, limit: usize) -> Result<Vec<Trade>, DaoError> {
        let trades = self.trades.read().await;
        let mut result: Vec<Trade> = trades
            .values()
            .filter(|t| t.pair_name == pair_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        Ok(result)
    }
}

#[derive(Default)]
pub struct MemoryAccountDao {
    accounts: RwLock<HashMap<Address, Account>>,
}

impl MemoryAccountDao {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountDao for MemoryAccountDao {
    async fn create(&self, account: &Account) -> Result<(), DaoError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.address) {
            return Err(DaoError::Duplicate);
        }
        accounts.insert(account.address, account.clone());
        Ok(())
    }

    async fn get_by_address(&self, address: &Address) -> Result<Option<Account>, DaoError> {
        Ok(self.accounts.read().await.get(address).cloned())
    }

    async fn update(&self, account: &Account) -> Result<(), DaoError> {
        let mut accounts = self.accounts.write().await;
        if !accounts.contains_key(&account.address) {
            return Err(DaoError::NotFound);
        }
        accounts.insert(account.address, account.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPairDao {
    pairs: RwLock<Vec<TokenPair>>,
}

impl MemoryPairDao {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with the configured markets at startup.
    pub async fn register(&self, pair: TokenPair) {
        let mut pairs = self.pairs.write().await;
        if !pairs.iter().any(|p| p.name == pair.name) {
            pairs.push(pair);
        }
    }
}

#[async_trait]
impl PairDao for MemoryPairDao {
    async fn all(&self) -> Result<Vec<TokenPair>, DaoError> {
        Ok(self.pairs.read().await.clone())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<TokenPair>, DaoError> {
        Ok(self
            .pairs
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn get_by_tokens(
        &self,
        first: &Address,
        second: &Address,
    ) -> Result<Option<TokenPair>, DaoError> {
        Ok(self
            .pairs
            .read()
            .await
            .iter()
            .find(|p| {
                (p.base_token.address == *first && p.quote_token.address == *second)
                    || (p.base_token.address == *second && p.quote_token.address == *first)
            })
            .cloned())
    }

    async fn tokens(&self) -> Result<Vec<Token>, DaoError> {
        let pairs = self.pairs.read().await;
        let mut tokens: Vec<Token> = Vec::new();
        for pair in pairs.iter() {
            for token in [&pair.base_token, &pair.quote_token] {
                if !tokens.iter().any(|t| t.address == token.address) {
                    tokens.push(token.clone());
                }
            }
        }
        Ok(tokens)
    }
}
