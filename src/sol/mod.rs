//! Rate-limited RPC plumbing shared by discovery and quoting.

pub mod clock;
pub mod client;
pub mod rate_limiter;

pub use clock::Clock;
pub use client::{pool_scan_filters, SolClient};
pub use rate_limiter::RateLimiter;
