//! Trading pairs and tokens
//!
//! A pair is an ordered (base, quote) token couple; its name is the
//! `BASE/QUOTE` symbol string used as the market identifier throughout the
//! book store, channels, and persisted records.

use serde::{Deserialize, Serialize};

use crate::primitives::Address;

/// An ERC20-style token participating in a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// A market: ordered (base, quote) token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Market identifier in `BASE/QUOTE` form.
    pub name: String,
    pub base_token: Token,
    pub quote_token: Token,
}

impl TokenPair {
    pub fn new(base_token: Token, quote_token: Token) -> Self {
        let name = format!("{}/{}", base_token.symbol, quote_token.symbol);
        Self {
            name,
            base_token,
            quote_token,
        }
    }
}

/// Pair reference carried in subscription messages: token addresses only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PairQuery {
    pub base_token: Address,
    pub quote_token: Address,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_name_from_symbols() {
        let base = Token::new(Address::zero(), "WETH", 18);
        let quote = Token::new(Address::zero(), "DAI", 18);
        let pair = TokenPair::new(base, quote);
        assert_eq!(pair.name, "WETH/DAI");
    }

    #[test]
    fn test_pair_query_serialization() {
        let query = PairQuery::default();
        let json = serde_json::to_string(&query).unwrap();
        assert!(json.contains("baseToken"));
        assert!(json.contains("quoteToken"));
    }
}
