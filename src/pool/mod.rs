//! Protocol adapters: account codecs, pricing simulators, and instruction
//! builders, one module per protocol family.

pub mod meteora;
pub mod pump;
pub mod raydium;
