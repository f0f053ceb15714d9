use anyhow::Result;
use solana_sdk::{pubkey, pubkey::Pubkey};

pub mod amm;
pub mod clmm;
pub mod cpmm;
pub mod tick_array;

pub const RAYDIUM_AMM_PROGRAM_ID: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
pub const RAYDIUM_CLMM_PROGRAM_ID: Pubkey = pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK");
pub const RAYDIUM_CPMM_PROGRAM_ID: Pubkey = pubkey!("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C");

pub const AMM_AUTHORITY_SEED: &[u8] = b"amm authority";
pub const CPMM_AUTH_SEED: &[u8] = b"vault_and_lp_mint_auth_seed";

/// 25 bps, shared by AMM-v4 and CPMM.
pub const LIQUIDITY_FEES_NUMERATOR: u64 = 25;
pub const LIQUIDITY_FEES_DENOMINATOR: u64 = 10_000;

/// Constant-product output with the 25 bps fee taken from the input:
/// `floor(reserve_out * (in - fee) / (reserve_in + (in - fee)))`.
pub fn constant_product_out(reserve_in: u128, reserve_out: u128, amount_in: u64) -> Result<u64> {
    if amount_in == 0 {
        return Ok(0);
    }
    let amount_in = amount_in as u128;
    let fee = amount_in * LIQUIDITY_FEES_NUMERATOR as u128 / LIQUIDITY_FEES_DENOMINATOR as u128;
    let amount_in_with_fee = amount_in - fee;
    let denominator = reserve_in + amount_in_with_fee;
    let amount_out = reserve_out * amount_in_with_fee / denominator;
    Ok(u64::try_from(amount_out)
        .map_err(|_| crate::error::RouteError::Overflow("constant_product_out"))?)
}
