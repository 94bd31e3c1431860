//! Accounts and token balances
//!
//! One account per address; each account carries a balance, an exchange
//! allowance, and a locked balance per token. Opening an order moves the
//! sell-side amount from available to locked; fills spend it; cancels and
//! settlement reversals release it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::AccountError;
use crate::numeric::TokenAmount;
use crate::pair::Token;
use crate::primitives::Address;

/// Balance state for a single token under one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub address: Address,
    pub symbol: String,
    pub balance: TokenAmount,
    pub allowance: TokenAmount,
    pub locked_balance: TokenAmount,
}

impl TokenBalance {
    pub fn new(token: &Token, balance: TokenAmount, allowance: TokenAmount) -> Self {
        Self {
            address: token.address,
            symbol: token.symbol.clone(),
            balance,
            allowance,
            locked_balance: TokenAmount::zero(),
        }
    }

    /// Balance not currently locked under open orders.
    pub fn available(&self) -> TokenAmount {
        self.balance.saturating_sub(&self.locked_balance)
    }
}

/// A single address with its per-token balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    pub token_balances: HashMap<Address, TokenBalance>,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            token_balances: HashMap::new(),
            is_blocked: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn balance(&self, token: &Address) -> Option<&TokenBalance> {
        self.token_balances.get(token)
    }

    /// Check that `amount` is available and covered by the allowance.
    pub fn check_funds(&self, token: &Address, amount: &TokenAmount) -> Result<(), AccountError> {
        let balance = self
            .token_balances
            .get(token)
            .ok_or(AccountError::TokenNotFound { token: *token })?;

        if balance.allowance < *amount {
            return Err(AccountError::InsufficientAllowance {
                token: *token,
                required: *amount,
                allowance: balance.allowance,
            });
        }
        if balance.available() < *amount {
            return Err(AccountError::InsufficientBalance {
                token: *token,
                required: *amount,
                available: balance.available(),
            });
        }
        Ok(())
    }

    /// Move `amount` from available into the locked balance.
    pub fn lock(&mut self, token: &Address, amount: &TokenAmount) -> Result<(), AccountError> {
        self.check_funds(token, amount)?;
        let balance = self
            .token_balances
            .get_mut(token)
            .ok_or(AccountError::TokenNotFound { token: *token })?;
        balance.locked_balance = balance.locked_balance + *amount;
        Ok(())
    }

    /// Release a previously locked amount (cancel, settlement reversal).
    pub fn unlock(&mut self, token: &Address, amount: &TokenAmount) -> Result<(), AccountError> {
        let balance = self
            .token_balances
            .get_mut(token)
            .ok_or(AccountError::TokenNotFound { token: *token })?;
        balance.locked_balance = balance.locked_balance.saturating_sub(amount);
        Ok(())
    }

    /// Spend a locked amount once a trade settles.
    pub fn spend(&mut self, token: &Address, amount: &TokenAmount) -> Result<(), AccountError> {
        let balance = self
            .token_balances
            .get_mut(token)
            .ok_or(AccountError::TokenNotFound { token: *token })?;
        if balance.locked_balance < *amount || balance.balance < *amount {
            return Err(AccountError::InsufficientBalance {
                token: *token,
                required: *amount,
                available: balance.available(),
            });
        }
        balance.locked_balance = balance.locked_balance - *amount;
        balance.balance = balance.balance - *amount;
        Ok(())
    }

    /// Credit a settled amount on the receiving side of a trade.
    pub fn credit(&mut self, token: &Address, amount: &TokenAmount) -> Result<(), AccountError> {
        let balance = self
            .token_balances
            .get_mut(token)
            .ok_or(AccountError::TokenNotFound { token: *token })?;
        balance.balance = balance.balance + *amount;
        Ok(())
    }
}
