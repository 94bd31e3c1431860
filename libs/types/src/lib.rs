//! Shared type definitions for the exchange backend
//!
//! Everything the services exchange over the wire or keep in stores is
//! defined here: orders and trades with their content-addressed hashes,
//! token pairs and account balances, the websocket envelope, and the
//! messages flowing between the gateway and the matching engine.
//!
//! # Modules
//! - `primitives`: `Address` and `Hash` newtypes plus keccak-256 hashing
//! - `numeric`: `TokenAmount` (256-bit) and `Price` (decimal) wrappers
//! - `order`: order lifecycle types
//! - `trade`: trade records and settlement states
//! - `pair`: trading pairs and tokens
//! - `account`: per-address token balances
//! - `signature`: `{r, s, v}` signatures and the `Wallet` helper
//! - `ws`: websocket protocol envelope
//! - `events`: engine queue messages and engine responses
//! - `errors`: validation error taxonomy

pub mod account;
pub mod errors;
pub mod events;
pub mod numeric;
pub mod order;
pub mod pair;
pub mod primitives;
pub mod signature;
pub mod trade;
pub mod ws;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::pair::*;
    pub use crate::primitives::*;
    pub use crate::signature::*;
    pub use crate::trade::*;
    pub use crate::ws::*;
}
