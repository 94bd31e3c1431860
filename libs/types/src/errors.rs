//! Error taxonomy shared across services
//!
//! Validation errors are produced at the service boundary before anything
//! reaches the engine; order and account errors are the domain-level
//! failures they wrap.

use thiserror::Error;

use crate::numeric::{NumericError, TokenAmount};
use crate::order::OrderStatus;
use crate::primitives::{Address, Hash};
use crate::signature::SignatureError;

/// Order state machine violations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrderError {
    #[error("order amounts must be non-zero")]
    ZeroAmount,

    #[error("order tokens do not form pair {pair}")]
    TokenMismatch { pair: String },

    #[error("fill would exceed order {hash} amount {amount}")]
    Overfill { hash: Hash, amount: TokenAmount },

    #[error("order {hash} is not cancellable in status {status:?}")]
    NotCancellable { hash: Hash, status: OrderStatus },
}

/// Balance bookkeeping failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AccountError {
    #[error("no balance entry for token {token}")]
    TokenNotFound { token: Address },

    #[error("insufficient balance for token {token}: required {required}, available {available}")]
    InsufficientBalance {
        token: Address,
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("insufficient allowance for token {token}: required {required}, allowance {allowance}")]
    InsufficientAllowance {
        token: Address,
        required: TokenAmount,
        allowance: TokenAmount,
    },
}

/// Rejections raised at the service boundary, before the engine is
/// involved. Reported to the client as an ERROR payload on the private
/// order channel.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("signature missing")]
    MissingSignature,

    #[error(transparent)]
    BadSignature(#[from] SignatureError),

    #[error("hash mismatch: payload claims {claimed}, computed {computed}")]
    HashMismatch { claimed: Hash, computed: Hash },

    #[error("no pair registered for tokens {token_buy}/{token_sell}")]
    UnknownPair {
        token_buy: Address,
        token_sell: Address,
    },

    #[error("order expired at {expires}")]
    Expired { expires: i64 },

    #[error("account {address} is blocked")]
    AccountBlocked { address: Address },

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Numeric(#[from] NumericError),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Websocket envelope decode failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WsError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("unknown message type {message_type} on channel {channel}")]
    UnknownMessageType {
        channel: String,
        message_type: String,
    },

    #[error("bad payload: {0}")]
    BadPayload(String),
}
