//! SolRoute
//!
//! Client-side swap routing across Solana AMM protocols. The crate provides,
//! per protocol family (Raydium AMM-v4 / CLMM / CPMM, Meteora DLMM,
//! PumpAMM):
//! - an account codec for the on-chain pool state,
//! - a pricing simulator reproducing the on-chain program's output exactly,
//! - a swap instruction builder emitting the program's account list and
//!   instruction bytes.
//!
//! A [`SimpleRouter`] discovers pools for a token pair across all protocols
//! and fans quotes out in parallel; the caller signs and submits the
//! resulting instructions with the wallet stack of their choice.

pub mod api;
pub mod constants;
pub mod decode;
pub mod error;
pub mod math;
pub mod pool;
pub mod protocol;
pub mod router;
pub mod sol;
pub mod utils;

pub use api::{Pool, Protocol, ProtocolKind, SwapParams};
pub use error::RouteError;
pub use router::SimpleRouter;
pub use sol::SolClient;
