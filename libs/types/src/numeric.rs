//! Numeric wrappers for token amounts and prices
//!
//! Token amounts are 256-bit non-negative integers in the smallest token
//! unit. They serialize as decimal strings so JSON consumers never lose
//! precision. Prices are derived quote/base ratios kept as fixed-point
//! decimals for deterministic book ordering.

use primitive_types::U256;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use thiserror::Error;

/// Errors produced while parsing numeric wire values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid price: {0}")]
    InvalidPrice(String),
}

/// A 256-bit token amount.
///
/// Serialized as a decimal string in JSON and in persisted records; the
/// in-memory representation is a native 256-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(U256);

impl TokenAmount {
    pub const fn zero() -> Self {
        Self(U256::zero())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(U256::from(value))
    }

    pub fn from_u256(value: U256) -> Self {
        Self(value)
    }

    /// Parse from a base-10 string.
    pub fn from_dec_str(s: &str) -> Result<Self, NumericError> {
        U256::from_dec_str(s)
            .map(Self)
            .map_err(|e| NumericError::InvalidAmount(format!("{:?}", e)))
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked subtraction; `None` when `rhs` exceeds `self`.
    pub fn checked_sub(&self, rhs: &TokenAmount) -> Option<TokenAmount> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Checked addition; `None` on 256-bit overflow.
    pub fn checked_add(&self, rhs: &TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(&self, rhs: &TokenAmount) -> TokenAmount {
        Self(self.0.saturating_sub(rhs.0))
    }

    pub fn min(&self, other: &TokenAmount) -> TokenAmount {
        if self.0 <= other.0 {
            *self
        } else {
            *other
        }
    }

    /// Canonical 32-byte big-endian encoding, used in hash preimages.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        self.0.to_big_endian(&mut bytes);
        bytes
    }

    /// `self * numerator / denominator` with a 512-bit intermediate, so
    /// proportional amounts never overflow. `None` on a zero denominator
    /// or a quotient beyond 256 bits.
    pub fn mul_div(
        &self,
        numerator: &TokenAmount,
        denominator: &TokenAmount,
    ) -> Option<TokenAmount> {
        if denominator.is_zero() {
            return None;
        }
        let product = self.0.full_mul(numerator.0);
        let quotient = product / primitive_types::U512::from(denominator.0);
        U256::try_from(quotient).ok().map(Self)
    }
}

impl Add for TokenAmount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(
            self.0
                .checked_add(rhs.0)
                .expect("token amount addition overflowed"),
        )
    }
}

impl Sub for TokenAmount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        assert!(self.0 >= rhs.0, "token amount subtraction would go negative");
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TokenAmount::from_dec_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Largest magnitude kept exact when projecting a 256-bit amount into a
/// `Decimal` mantissa for ratio computation.
const DECIMAL_SAFE_LIMIT: u128 = 10u128.pow(27);

/// A derived price (quote units per base unit).
///
/// Always strictly positive. Serialized as a string to avoid JSON number
/// precision loss; the normalized string doubles as the price-level key in
/// the book store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
    /// Try to create a price, returning `None` unless strictly positive.
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value.normalize()))
        } else {
            None
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn from_str(s: &str) -> Result<Self, NumericError> {
        let decimal =
            Decimal::from_str(s).map_err(|e| NumericError::InvalidPrice(e.to_string()))?;
        Self::try_new(decimal).ok_or_else(|| NumericError::InvalidPrice(s.to_string()))
    }

    /// Derive a price from quote and base token amounts.
    ///
    /// Both operands are scaled down by equal powers of ten until they fit
    /// a decimal mantissa, so the ratio is preserved for realistic amounts.
    pub fn from_ratio(quote: &TokenAmount, base: &TokenAmount) -> Option<Self> {
        if base.is_zero() {
            return None;
        }

        let limit = U256::from(DECIMAL_SAFE_LIMIT);
        let mut q = quote.as_u256();
        let mut b = base.as_u256();
        while q > limit || b > limit {
            q /= U256::from(10u8);
            b /= U256::from(10u8);
        }
        if b.is_zero() {
            return None;
        }

        let qd = Decimal::from_str(&q.to_string()).ok()?;
        let bd = Decimal::from_str(&b.to_string()).ok()?;
        Self::try_new(qd / bd)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let decimal = Decimal::from_str(&s).map_err(serde::de::Error::custom)?;
        Price::try_new(decimal).ok_or_else(|| serde::de::Error::custom("price must be positive"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_decimal_string_roundtrip() {
        let amount = TokenAmount::from_dec_str("1000000000000000000").unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"1000000000000000000\"");

        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(amount, back);
    }

    #[test]
    fn test_amount_rejects_negative() {
        assert!(TokenAmount::from_dec_str("-5").is_err());
    }

    #[test]
    fn test_amount_checked_sub() {
        let a = TokenAmount::from_u64(10);
        let b = TokenAmount::from_u64(15);
        assert!(a.checked_sub(&b).is_none());
        assert_eq!(b.checked_sub(&a), Some(TokenAmount::from_u64(5)));
    }

    #[test]
    #[should_panic(expected = "would go negative")]
    fn test_amount_sub_panics_on_underflow() {
        let _ = TokenAmount::from_u64(1) - TokenAmount::from_u64(2);
    }

    #[test]
    fn test_amount_big_endian_width() {
        let amount = TokenAmount::from_u64(256);
        let bytes = amount.to_be_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[30], 1);
        assert_eq!(bytes[31], 0);
    }

    #[test]
    fn test_mul_div_proportional() {
        let sell = TokenAmount::from_u64(1500);
        let part = TokenAmount::from_u64(5);
        let total = TokenAmount::from_u64(15);
        assert_eq!(
            sell.mul_div(&part, &total),
            Some(TokenAmount::from_u64(500))
        );
        assert!(sell.mul_div(&part, &TokenAmount::zero()).is_none());
    }

    #[test]
    fn test_mul_div_large_values() {
        let huge = TokenAmount::from_dec_str("100000000000000000000000000000000").unwrap();
        let result = huge.mul_div(&huge, &huge).unwrap();
        assert_eq!(result, huge);
    }

    #[test]
    fn test_price_from_ratio() {
        let quote = TokenAmount::from_u64(1000);
        let base = TokenAmount::from_u64(10);
        let price = Price::from_ratio(&quote, &base).unwrap();
        assert_eq!(price, Price::from_u64(100));
    }

    #[test]
    fn test_price_from_ratio_large_amounts() {
        // 2000 quote units per base unit, in 18-decimal fixed point
        let quote = TokenAmount::from_dec_str("2000000000000000000000").unwrap();
        let base = TokenAmount::from_dec_str("1000000000000000000").unwrap();
        let price = Price::from_ratio(&quote, &base).unwrap();
        assert_eq!(price, Price::from_u64(2000));
    }

    #[test]
    fn test_price_from_ratio_zero_base() {
        let quote = TokenAmount::from_u64(1000);
        assert!(Price::from_ratio(&quote, &TokenAmount::zero()).is_none());
    }

    #[test]
    fn test_price_serialization() {
        let price = Price::from_str("99.5").unwrap();
        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, "\"99.5\"");

        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(price, back);
    }

    #[test]
    fn test_price_rejects_zero() {
        assert!(Price::from_str("0").is_err());
        assert!(serde_json::from_str::<Price>("\"0\"").is_err());
    }

    #[test]
    fn test_price_normalized_key() {
        // Trailing zeros are stripped so equal prices share one book key
        let a = Price::from_str("100.00").unwrap();
        let b = Price::from_u64(100);
        assert_eq!(a.to_string(), b.to_string());
    }
}
