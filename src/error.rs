use thiserror::Error;

/// Errors surfaced by the routing core.
///
/// Call sites propagate these through `anyhow::Result`; the router and tests
/// downcast with `err.downcast_ref::<RouteError>()` when the kind matters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("{context}: account data too short, expected {expected} bytes, got {got}")]
    Decode {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    #[error("index {0} out of range")]
    OutOfRange(i64),

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("pool is disabled")]
    PoolDisabled,

    #[error("pool is not yet activated")]
    NotYetActivated,

    #[error("{0} exceeded its iteration bound")]
    Timeout(&'static str),

    #[error("no route found")]
    NoRouteFound,
}
