use solana_sdk::{pubkey, pubkey::Pubkey};

pub mod bin_array;
pub mod dlmm;

pub const METEORA_DLMM_PROGRAM_ID: Pubkey = pubkey!("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo");

pub const BIN_ARRAY_SEED: &[u8] = b"bin_array";
pub const BITMAP_EXTENSION_SEED: &[u8] = b"bitmap";
pub const EVENT_AUTHORITY_SEED: &[u8] = b"__event_authority";

pub const BASIS_POINT_MAX: u32 = 10_000;
/// Fee rates are scaled by 1e9.
pub const FEE_PRECISION: u128 = 1_000_000_000;
/// Total fee cap: 10%.
pub const MAX_FEE_RATE: u128 = 100_000_000;

pub const MIN_BIN_ID: i32 = -443636;
pub const MAX_BIN_ID: i32 = 443636;

pub const MAX_BIN_PER_ARRAY: i32 = 70;
/// Array indices covered by the in-pool bitmap: [-512, 512).
pub const BIN_ARRAY_BITMAP_SIZE: i32 = 512;
pub const EXTENSION_BINARRAY_BITMAP_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairStatus {
    Enabled = 0,
    Disabled = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairType {
    Permissionless = 0,
    Permission = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationType {
    Slot = 0,
    Timestamp = 1,
}
