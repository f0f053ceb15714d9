//! DLMM bin arrays: codec, bin-level price/amount math, array addressing,
//! and the bitmap extension for arrays beyond the in-pool window.

use anyhow::Result;
use solana_sdk::pubkey::Pubkey;

use super::{
    BASIS_POINT_MAX, BIN_ARRAY_BITMAP_SIZE, BIN_ARRAY_SEED, EXTENSION_BINARRAY_BITMAP_SIZE,
    MAX_BIN_PER_ARRAY, METEORA_DLMM_PROGRAM_ID,
};
use crate::decode::AccountCursor;
use crate::error::RouteError;
use crate::math::bitmap::{leading_zeros, merge_bitmap, trailing_zeros};
use crate::math::u64x64::{
    mul_shr, mul_shr_round_up, pow, shl_div, shl_div_round_up, ONE_X64,
};

/// One discrete liquidity bin; a tiny constant-sum pool at a single price.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bin {
    pub amount_x: u64,
    pub amount_y: u64,
    pub price: u128,
    pub liquidity_supply: u128,
    pub reward_per_token_stored: [u128; 2],
    pub fee_amount_x_per_token_stored: u128,
    pub fee_amount_y_per_token_stored: u128,
    pub amount_x_in: u128,
    pub amount_y_in: u128,
}

impl Bin {
    pub fn is_empty(&self, is_x: bool) -> bool {
        if is_x {
            self.amount_x == 0
        } else {
            self.amount_y == 0
        }
    }

    /// The bin's Q64.64 price, computing and caching it when the on-chain
    /// snapshot left the field zeroed.
    pub fn get_or_store_price(&mut self, active_id: i32, bin_step: u16) -> Result<u128> {
        if self.price == 0 {
            self.price = price_from_id(active_id, bin_step)?;
        }
        Ok(self.price)
    }

    /// Whole out-side inventory available from this bin.
    pub fn max_amount_out(&self, swap_for_y: bool) -> u64 {
        if swap_for_y {
            self.amount_y
        } else {
            self.amount_x
        }
    }

    /// Input needed to drain the out side completely, before fees.
    pub fn max_amount_in(&self, price: u128, swap_for_y: bool) -> Result<u128> {
        let max_in = if swap_for_y {
            shl_div_round_up(self.amount_y as u128, price)
        } else {
            mul_shr_round_up(self.amount_x as u128, price)
        };
        max_in.ok_or_else(|| RouteError::Overflow("bin max amount in").into())
    }

    /// Constant-sum allocation: out = in * price (or in / price) in Q64.64.
    pub fn amount_out(&self, amount_in: u64, price: u128, swap_for_y: bool) -> Result<u128> {
        let out = if swap_for_y {
            mul_shr(amount_in as u128, price)
        } else {
            shl_div(amount_in as u128, price)
        };
        out.ok_or_else(|| RouteError::Overflow("bin amount out").into())
    }
}

/// Price per lamport for a bin id: `(1 + bin_step/10000)^id` in Q64.64.
pub fn price_from_id(active_id: i32, bin_step: u16) -> Result<u128> {
    let bps = ((bin_step as u128) << 64) / BASIS_POINT_MAX as u128;
    pow(ONE_X64 + bps, active_id).ok_or_else(|| RouteError::Overflow("bin price").into())
}

#[derive(Debug, Clone)]
pub struct BinArray {
    pub index: i64,
    pub version: u8,
    pub lb_pair: Pubkey,
    pub bins: [Bin; MAX_BIN_PER_ARRAY as usize],
}

impl BinArray {
    /// 8 discriminator + 8 index + 1 version + 7 pad + 32 pair + 70 bins.
    pub const SPAN: usize = 56 + MAX_BIN_PER_ARRAY as usize * 144;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("bin array", data, Self::SPAN)?;
        cur.skip(8);
        let index = cur.read_i64();
        let version = cur.read_u8();
        cur.skip(7);
        let lb_pair = cur.read_pubkey();
        let bins = std::array::from_fn(|_| Bin {
            amount_x: cur.read_u64(),
            amount_y: cur.read_u64(),
            price: cur.read_u128(),
            liquidity_supply: cur.read_u128(),
            reward_per_token_stored: [cur.read_u128(), cur.read_u128()],
            fee_amount_x_per_token_stored: cur.read_u128(),
            fee_amount_y_per_token_stored: cur.read_u128(),
            amount_x_in: cur.read_u128(),
            amount_y_in: cur.read_u128(),
        });
        Ok(Self {
            index,
            version,
            lb_pair,
            bins,
        })
    }

    pub fn lower_upper_bin_id(index: i32) -> (i32, i32) {
        let lower = index * MAX_BIN_PER_ARRAY;
        (lower, lower + MAX_BIN_PER_ARRAY - 1)
    }

    pub fn is_bin_id_within_range(&self, active_id: i32) -> bool {
        let (lower, upper) = Self::lower_upper_bin_id(self.index as i32);
        active_id >= lower && active_id <= upper
    }

    pub fn get_bin_mut(&mut self, active_id: i32) -> Result<&mut Bin> {
        if !self.is_bin_id_within_range(active_id) {
            return Err(RouteError::OutOfRange(active_id as i64).into());
        }
        let (lower, _) = Self::lower_upper_bin_id(self.index as i32);
        let offset = (active_id - lower) as usize;
        Ok(&mut self.bins[offset])
    }
}

/// Array index holding a bin id (floor division by 70).
pub fn bin_id_to_bin_array_index(bin_id: i32) -> i32 {
    bin_id.div_euclid(MAX_BIN_PER_ARRAY)
}

/// True when the array index falls outside the in-pool bitmap window
/// `[-512, 512)`.
pub fn is_overflow_default_bin_array_bitmap(bin_array_index: i32) -> bool {
    bin_array_index >= BIN_ARRAY_BITMAP_SIZE || bin_array_index < -BIN_ARRAY_BITMAP_SIZE
}

/// Bit position of an in-window array index.
pub fn bin_array_offset(bin_array_index: i32) -> usize {
    (bin_array_index + BIN_ARRAY_BITMAP_SIZE) as usize
}

pub fn derive_bin_array_pda(lb_pair: &Pubkey, index: i64) -> Pubkey {
    Pubkey::find_program_address(
        &[BIN_ARRAY_SEED, lb_pair.as_ref(), &index.to_le_bytes()],
        &METEORA_DLMM_PROGRAM_ID,
    )
    .0
}

pub fn derive_bin_array_bitmap_extension(lb_pair: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[super::BITMAP_EXTENSION_SEED, lb_pair.as_ref()],
        &METEORA_DLMM_PROGRAM_ID,
    )
    .0
}

pub fn derive_event_authority_pda() -> Pubkey {
    Pubkey::find_program_address(&[super::EVENT_AUTHORITY_SEED], &METEORA_DLMM_PROGRAM_ID).0
}

/// Extension bitmap: 12 blocks of 512 array slots on each side of the
/// in-pool window.
#[derive(Debug, Clone)]
pub struct BinArrayBitmapExtension {
    pub lb_pair: Pubkey,
    pub positive_bin_array_bitmap: [[u64; 8]; EXTENSION_BINARRAY_BITMAP_SIZE],
    pub negative_bin_array_bitmap: [[u64; 8]; EXTENSION_BINARRAY_BITMAP_SIZE],
}

impl Default for BinArrayBitmapExtension {
    fn default() -> Self {
        Self {
            lb_pair: Pubkey::default(),
            positive_bin_array_bitmap: [[0; 8]; EXTENSION_BINARRAY_BITMAP_SIZE],
            negative_bin_array_bitmap: [[0; 8]; EXTENSION_BINARRAY_BITMAP_SIZE],
        }
    }
}

impl BinArrayBitmapExtension {
    pub const SPAN: usize = 8 + 32 + EXTENSION_BINARRAY_BITMAP_SIZE * 64 * 2;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("bin array bitmap extension", data, Self::SPAN)?;
        cur.skip(8);
        let lb_pair = cur.read_pubkey();
        let mut positive = [[0u64; 8]; EXTENSION_BINARRAY_BITMAP_SIZE];
        for block in positive.iter_mut() {
            for limb in block.iter_mut() {
                *limb = cur.read_u64();
            }
        }
        let mut negative = [[0u64; 8]; EXTENSION_BINARRAY_BITMAP_SIZE];
        for block in negative.iter_mut() {
            for limb in block.iter_mut() {
                *limb = cur.read_u64();
            }
        }
        Ok(Self {
            lb_pair,
            positive_bin_array_bitmap: positive,
            negative_bin_array_bitmap: negative,
        })
    }

    /// (block, bit) coordinates of an out-of-window array index.
    /// Positive side: index = (block + 1) * 512 + bit.
    /// Negative side: index = -((block + 1) * 512 + bit) - 1.
    fn coordinates(index: i32) -> Result<(usize, usize)> {
        if !is_overflow_default_bin_array_bitmap(index) {
            return Err(RouteError::OutOfRange(index as i64).into());
        }
        let magnitude = if index > 0 { index } else { -(index + 1) };
        let block = (magnitude / BIN_ARRAY_BITMAP_SIZE - 1) as usize;
        if block >= EXTENSION_BINARRAY_BITMAP_SIZE {
            return Err(RouteError::OutOfRange(index as i64).into());
        }
        Ok((block, (magnitude % BIN_ARRAY_BITMAP_SIZE) as usize))
    }

    /// Next array with liquidity in the extension, walking from
    /// `start_index` in swap direction. `(index, true)` when found;
    /// `(edge, false)` hands the search back to the in-pool bitmap.
    pub fn next_bin_array_index_with_liquidity(
        &self,
        swap_for_y: bool,
        start_index: i32,
    ) -> Result<(i32, bool)> {
        let (start_block, start_bit) = Self::coordinates(start_index)?;

        if start_index > 0 {
            if swap_for_y {
                // toward the in-pool window: scan this block downward, then
                // nearer blocks
                for block in (0..=start_block).rev() {
                    let bits = merge_bitmap(&self.positive_bin_array_bitmap[block]);
                    let from = if block == start_block { start_bit } else { 511 };
                    let shifted = bits << (511 - from);
                    if let Some(lz) = leading_zeros(512, &shifted) {
                        let bit = from - lz as usize;
                        return Ok((((block as i32 + 1) * BIN_ARRAY_BITMAP_SIZE) + bit as i32, true));
                    }
                }
                Ok((BIN_ARRAY_BITMAP_SIZE - 1, false))
            } else {
                for block in start_block..EXTENSION_BINARRAY_BITMAP_SIZE {
                    let bits = merge_bitmap(&self.positive_bin_array_bitmap[block]);
                    let from = if block == start_block { start_bit } else { 0 };
                    let shifted = bits >> from;
                    if let Some(tz) = trailing_zeros(512, &shifted) {
                        let bit = from + tz as usize;
                        return Ok((((block as i32 + 1) * BIN_ARRAY_BITMAP_SIZE) + bit as i32, true));
                    }
                }
                Err(RouteError::InsufficientLiquidity.into())
            }
        } else if swap_for_y {
            // deeper into the negative side
            for block in start_block..EXTENSION_BINARRAY_BITMAP_SIZE {
                let bits = merge_bitmap(&self.negative_bin_array_bitmap[block]);
                let from = if block == start_block { start_bit } else { 0 };
                let shifted = bits >> from;
                if let Some(tz) = trailing_zeros(512, &shifted) {
                    let bit = from + tz as usize;
                    let index = -(((block as i32 + 1) * BIN_ARRAY_BITMAP_SIZE) + bit as i32) - 1;
                    return Ok((index, true));
                }
            }
            Err(RouteError::InsufficientLiquidity.into())
        } else {
            // toward the in-pool window
            for block in (0..=start_block).rev() {
                let bits = merge_bitmap(&self.negative_bin_array_bitmap[block]);
                let from = if block == start_block { start_bit } else { 511 };
                let shifted = bits << (511 - from);
                if let Some(lz) = leading_zeros(512, &shifted) {
                    let bit = from - lz as usize;
                    let index = -(((block as i32 + 1) * BIN_ARRAY_BITMAP_SIZE) + bit as i32) - 1;
                    return Ok((index, true));
                }
            }
            Ok((-BIN_ARRAY_BITMAP_SIZE, false))
        }
    }

    /// Marks an array index, used to build synthetic fixtures.
    #[cfg(test)]
    pub fn set(&mut self, index: i32) {
        let (block, bit) = Self::coordinates(index).unwrap();
        let target = if index > 0 {
            &mut self.positive_bin_array_bitmap[block]
        } else {
            &mut self.negative_bin_array_bitmap[block]
        };
        target[bit / 64] |= 1u64 << (bit % 64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_array_index_uses_floor_division() {
        assert_eq!(bin_id_to_bin_array_index(0), 0);
        assert_eq!(bin_id_to_bin_array_index(69), 0);
        assert_eq!(bin_id_to_bin_array_index(70), 1);
        assert_eq!(bin_id_to_bin_array_index(-1), -1);
        assert_eq!(bin_id_to_bin_array_index(-70), -1);
        assert_eq!(bin_id_to_bin_array_index(-71), -2);
    }

    #[test]
    fn lower_upper_bounds_cover_seventy_bins() {
        assert_eq!(BinArray::lower_upper_bin_id(0), (0, 69));
        assert_eq!(BinArray::lower_upper_bin_id(-1), (-70, -1));
        assert_eq!(BinArray::lower_upper_bin_id(3), (210, 279));
    }

    #[test]
    fn price_at_id_zero_is_unity() {
        assert_eq!(price_from_id(0, 10).unwrap(), ONE_X64);
        let up = price_from_id(1, 10).unwrap();
        let down = price_from_id(-1, 10).unwrap();
        assert!(up > ONE_X64);
        assert!(down < ONE_X64);
    }

    #[test]
    fn max_amount_in_round_trips_through_amount_out() {
        let bin = Bin {
            amount_x: 500_000,
            amount_y: 10_000,
            price: ONE_X64 * 2,
            ..Bin::default()
        };
        // swap X -> Y at price 2: draining 10_000 Y needs 5_000 X.
        let max_in = bin.max_amount_in(bin.price, true).unwrap();
        assert_eq!(max_in, 5_000);
        let out = bin.amount_out(5_000, bin.price, true).unwrap();
        assert_eq!(out, 10_000);
    }

    #[test]
    fn decode_reads_bin_inventories() {
        let mut data = vec![0u8; BinArray::SPAN];
        data[8..16].copy_from_slice(&(-3i64).to_le_bytes());
        let pair = Pubkey::new_unique();
        data[24..56].copy_from_slice(pair.as_ref());
        // first bin
        data[56..64].copy_from_slice(&11u64.to_le_bytes());
        data[64..72].copy_from_slice(&22u64.to_le_bytes());
        data[72..88].copy_from_slice(&ONE_X64.to_le_bytes());
        let array = BinArray::decode(&data).unwrap();
        assert_eq!(array.index, -3);
        assert_eq!(array.lb_pair, pair);
        assert_eq!(array.bins[0].amount_x, 11);
        assert_eq!(array.bins[0].amount_y, 22);
        assert_eq!(array.bins[0].price, ONE_X64);
        assert!(BinArray::decode(&data[..500]).is_err());
    }

    #[test]
    fn extension_walks_toward_and_away_from_the_window() {
        let mut ext = BinArrayBitmapExtension::default();
        ext.set(600);
        ext.set(1500);
        // ascending from 520: first hit is 600
        assert_eq!(
            ext.next_bin_array_index_with_liquidity(false, 520).unwrap(),
            (600, true)
        );
        // descending from 520: nothing below in the extension, hand off
        assert_eq!(
            ext.next_bin_array_index_with_liquidity(true, 520).unwrap(),
            (BIN_ARRAY_BITMAP_SIZE - 1, false)
        );
        // descending from 2000: finds 1500
        assert_eq!(
            ext.next_bin_array_index_with_liquidity(true, 2000).unwrap(),
            (1500, true)
        );

        let mut ext = BinArrayBitmapExtension::default();
        ext.set(-700);
        assert_eq!(
            ext.next_bin_array_index_with_liquidity(true, -520).unwrap(),
            (-700, true)
        );
        assert_eq!(
            ext.next_bin_array_index_with_liquidity(false, -600).unwrap(),
            (-BIN_ARRAY_BITMAP_SIZE, false)
        );
    }
}
