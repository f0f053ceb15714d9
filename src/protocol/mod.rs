//! Per-protocol pool discovery: filtered program-account scans plus the
//! joins each adapter needs before it can quote and build instructions.

pub mod meteora_dlmm;
pub mod pump_amm;
pub mod raydium_amm;
pub mod raydium_clmm;
pub mod raydium_cpmm;

pub use meteora_dlmm::MeteoraDlmmProtocol;
pub use pump_amm::PumpAmmProtocol;
pub use raydium_amm::RaydiumAmmProtocol;
pub use raydium_clmm::RaydiumClmmProtocol;
pub use raydium_cpmm::RaydiumCpmmProtocol;
