//! CLMM tick arrays: account codecs, PDA addressing, bitmap traversal, and
//! the liquidity <-> token-amount step math used by the swap simulator.

use anyhow::Result;
use solana_sdk::pubkey::Pubkey;

use super::RAYDIUM_CLMM_PROGRAM_ID;
use crate::decode::AccountCursor;
use crate::error::RouteError;
use crate::math::bitmap::{
    least_significant_bit, leading_zeros, merge_bitmap, most_significant_bit, trailing_zeros,
};
use crate::math::tick_math::{MAX_TICK, MIN_TICK};
use crate::math::{
    mul_div_ceil, mul_div_floor, narrow_512, u256_to_u128, widen_256, U1024, U256, U512,
};

pub const TICK_ARRAY_SIZE: i32 = 60;
pub const TICK_ARRAY_BITMAP_SIZE: i32 = 512;
pub const EXTENSION_TICKARRAY_BITMAP_SIZE: usize = 14;

pub const TICK_ARRAY_SEED: &[u8] = b"tick_array";
pub const TICK_ARRAY_BITMAP_EXTENSION_SEED: &[u8] = b"pool_tick_array_bitmap_extension";

pub const FEE_RATE_DENOMINATOR: u32 = 1_000_000;

const TICK_STATE_SIZE: usize = 168;
/// 8 pad + pool id + start index + 60 ticks + initialized count + tail pad.
pub const TICK_ARRAY_SPAN: usize = 8 + 32 + 4 + TICK_ARRAY_SIZE as usize * TICK_STATE_SIZE + 1 + 115;

#[derive(Debug, Clone, Copy, Default)]
pub struct TickState {
    pub tick: i32,
    pub liquidity_net: i64,
    pub liquidity_gross: u128,
    pub fee_growth_outside_0_x64: u128,
    pub fee_growth_outside_1_x64: u128,
    pub reward_growths_outside_x64: [u128; 3],
}

#[derive(Debug, Clone)]
pub struct TickArray {
    pub pool_id: Pubkey,
    pub start_tick_index: i32,
    pub ticks: [TickState; TICK_ARRAY_SIZE as usize],
    pub initialized_tick_count: u8,
}

impl TickArray {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("tick array", data, TICK_ARRAY_SPAN)?;
        cur.skip(8);
        let pool_id = cur.read_pubkey();
        let start_tick_index = cur.read_i32();
        let ticks = std::array::from_fn(|_| {
            let tick = cur.read_i32();
            let liquidity_net = cur.read_i64();
            cur.skip(8); // high half of the on-chain i128; kept i64 throughout
            let liquidity_gross = cur.read_u128();
            let fee_growth_outside_0_x64 = cur.read_u128();
            let fee_growth_outside_1_x64 = cur.read_u128();
            let reward_growths_outside_x64 = [cur.read_u128(), cur.read_u128(), cur.read_u128()];
            cur.skip(52);
            TickState {
                tick,
                liquidity_net,
                liquidity_gross,
                fee_growth_outside_0_x64,
                fee_growth_outside_1_x64,
                reward_growths_outside_x64,
            }
        });
        let initialized_tick_count = cur.read_u8();
        Ok(Self {
            pool_id,
            start_tick_index,
            ticks,
            initialized_tick_count,
        })
    }
}

/// Extension bitmap for tick arrays beyond the in-pool 1024-bit window.
#[derive(Debug, Clone)]
pub struct TickArrayBitmapExtension {
    pub pool_id: Pubkey,
    pub positive_tick_array_bitmap: [[u64; 8]; EXTENSION_TICKARRAY_BITMAP_SIZE],
    pub negative_tick_array_bitmap: [[u64; 8]; EXTENSION_TICKARRAY_BITMAP_SIZE],
}

impl Default for TickArrayBitmapExtension {
    fn default() -> Self {
        Self {
            pool_id: Pubkey::default(),
            positive_tick_array_bitmap: [[0; 8]; EXTENSION_TICKARRAY_BITMAP_SIZE],
            negative_tick_array_bitmap: [[0; 8]; EXTENSION_TICKARRAY_BITMAP_SIZE],
        }
    }
}

impl TickArrayBitmapExtension {
    pub const SPAN: usize = 8 + 32 + EXTENSION_TICKARRAY_BITMAP_SIZE * 64 * 2;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("tick array bitmap extension", data, Self::SPAN)?;
        cur.skip(8);
        let pool_id = cur.read_pubkey();
        let mut positive = [[0u64; 8]; EXTENSION_TICKARRAY_BITMAP_SIZE];
        for block in positive.iter_mut() {
            for limb in block.iter_mut() {
                *limb = cur.read_u64();
            }
        }
        let mut negative = [[0u64; 8]; EXTENSION_TICKARRAY_BITMAP_SIZE];
        for block in negative.iter_mut() {
            for limb in block.iter_mut() {
                *limb = cur.read_u64();
            }
        }
        Ok(Self {
            pool_id,
            positive_tick_array_bitmap: positive,
            negative_tick_array_bitmap: negative,
        })
    }
}

pub fn get_pda_tick_array_address(program_id: &Pubkey, pool_id: &Pubkey, start_index: i32) -> Pubkey {
    Pubkey::find_program_address(
        &[TICK_ARRAY_SEED, pool_id.as_ref(), &start_index.to_be_bytes()],
        program_id,
    )
    .0
}

pub fn get_pda_ex_bitmap_address(program_id: &Pubkey, pool_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[TICK_ARRAY_BITMAP_EXTENSION_SEED, pool_id.as_ref()],
        program_id,
    )
    .0
}

/// Ticks covered by one tick array.
pub fn tick_count(tick_spacing: i32) -> i32 {
    tick_spacing * TICK_ARRAY_SIZE
}

/// Start index of the array containing `tick_index` (floor alignment).
pub fn get_array_start_index(tick_index: i32, tick_spacing: i32) -> i32 {
    let ticks_in_array = tick_count(tick_spacing);
    tick_index.div_euclid(ticks_in_array) * ticks_in_array
}

fn get_tick_array_bit_index(tick_index: i32, tick_spacing: i32) -> i32 {
    tick_index.div_euclid(tick_count(tick_spacing))
}

pub fn check_is_valid_start_index(start_index: i32, tick_spacing: i32) -> bool {
    start_index % tick_count(tick_spacing) == 0
}

/// Ticks covered by one whole 512-slot bitmap.
pub fn max_tick_in_tickarray_bitmap(tick_spacing: i32) -> i32 {
    TICK_ARRAY_BITMAP_SIZE * tick_count(tick_spacing)
}

/// Membership test against the in-pool bitmap (array indices -512..512).
pub fn check_tick_array_is_initialized(bitmap: &[u64; 16], tick: i32, tick_spacing: i32) -> bool {
    let multiplier = tick_count(tick_spacing);
    let compressed = tick / multiplier + 512;
    let bit_pos = compressed.unsigned_abs();
    let word = (bit_pos / 64) as usize;
    if word >= bitmap.len() {
        return false;
    }
    bitmap[word] & (1u64 << (bit_pos % 64)) != 0
}

pub fn tick_array_offset_in_bitmap(tick_array_start_index: i32, tick_spacing: i32) -> i32 {
    let max_tick = max_tick_in_tickarray_bitmap(tick_spacing);
    let m = tick_array_start_index.abs() % max_tick;
    let mut offset = m / tick_count(tick_spacing);
    if tick_array_start_index < 0 && m != 0 {
        offset = TICK_ARRAY_BITMAP_SIZE - offset;
    }
    offset
}

pub fn get_bitmap_tick_boundary(tick_array_start_index: i32, tick_spacing: i32) -> (i32, i32) {
    let ticks_in_one_bitmap = max_tick_in_tickarray_bitmap(tick_spacing);
    let mut m = tick_array_start_index.abs() / ticks_in_one_bitmap;
    if tick_array_start_index < 0 && tick_array_start_index.abs() % ticks_in_one_bitmap != 0 {
        m += 1;
    }
    let min_value = ticks_in_one_bitmap * m;
    if tick_array_start_index < 0 {
        (-min_value, -min_value + ticks_in_one_bitmap)
    } else {
        (min_value, min_value + ticks_in_one_bitmap)
    }
}

/// Tick span of the extension region for this spacing; fails when the default
/// bitmap already covers the whole tick domain.
fn extension_tick_boundary(tick_spacing: i32) -> Result<(i32, i32)> {
    let positive_tick_boundary = max_tick_in_tickarray_bitmap(tick_spacing);
    let negative_tick_boundary = -positive_tick_boundary;
    if MAX_TICK <= positive_tick_boundary {
        return Err(RouteError::OutOfRange(positive_tick_boundary as i64).into());
    }
    Ok((negative_tick_boundary, positive_tick_boundary))
}

fn check_extension_boundary(tick_index: i32, tick_spacing: i32) -> Result<()> {
    let (negative_boundary, positive_boundary) = extension_tick_boundary(tick_spacing)?;
    if tick_index >= negative_boundary && tick_index < positive_boundary {
        return Err(RouteError::OutOfRange(tick_index as i64).into());
    }
    Ok(())
}

fn get_bitmap_offset(tick_index: i32, tick_spacing: i32) -> Result<usize> {
    if !check_is_valid_start_index(tick_index, tick_spacing) {
        return Err(RouteError::InvalidInput("tick index is not an array start").into());
    }
    check_extension_boundary(tick_index, tick_spacing)?;
    let ticks_in_one_bitmap = max_tick_in_tickarray_bitmap(tick_spacing);
    let mut offset = tick_index.abs() / ticks_in_one_bitmap - 1;
    if tick_index < 0 && tick_index.abs() % ticks_in_one_bitmap == 0 {
        offset -= 1;
    }
    if offset < 0 || offset as usize >= EXTENSION_TICKARRAY_BITMAP_SIZE {
        return Err(RouteError::OutOfRange(tick_index as i64).into());
    }
    Ok(offset as usize)
}

fn get_bitmap<'a>(
    tick_index: i32,
    tick_spacing: i32,
    extension: &'a TickArrayBitmapExtension,
) -> Result<(usize, &'a [u64; 8])> {
    let offset = get_bitmap_offset(tick_index, tick_spacing)?;
    if tick_index < 0 {
        Ok((offset, &extension.negative_tick_array_bitmap[offset]))
    } else {
        Ok((offset, &extension.positive_tick_array_bitmap[offset]))
    }
}

/// Membership test against the extension bitmap, block-then-bit.
pub fn check_tick_array_is_init(
    tick_array_start_index: i32,
    tick_spacing: i32,
    extension: &TickArrayBitmapExtension,
) -> bool {
    let Ok((_, block)) = get_bitmap(tick_array_start_index, tick_spacing, extension) else {
        return false;
    };
    let bit = tick_array_offset_in_bitmap(tick_array_start_index, tick_spacing);
    let merged = merge_bitmap(block);
    merged.bit(bit as usize)
}

/// Whether any of the array start indices fall outside the default bitmap.
pub fn is_overflow_default_tickarray_bitmap(tick_spacing: i32, tick_indices: &[i32]) -> bool {
    let (min_boundary, max_boundary) = default_tick_range(tick_spacing);
    tick_indices.iter().any(|tick| {
        let start = get_array_start_index(*tick, tick_spacing);
        start >= max_boundary || start < min_boundary
    })
}

fn default_tick_range(tick_spacing: i32) -> (i32, i32) {
    let mut max_boundary = max_tick_in_tickarray_bitmap(tick_spacing);
    let mut min_boundary = -max_boundary;
    if max_boundary > MAX_TICK {
        max_boundary = get_array_start_index(MAX_TICK, tick_spacing) + tick_count(tick_spacing);
    }
    if min_boundary < MIN_TICK {
        min_boundary = get_array_start_index(MIN_TICK, tick_spacing);
    }
    (min_boundary, max_boundary)
}

/// Next initialized array in the in-pool bitmap; `(false, edge)` hands the
/// search off past the default window.
fn next_initialized_tick_array_start_index(
    merged: &U1024,
    last_tick_array_start_index: i32,
    tick_spacing: i32,
    zero_for_one: bool,
) -> (bool, i32) {
    let tick_boundary = max_tick_in_tickarray_bitmap(tick_spacing);
    let next_start = if zero_for_one {
        last_tick_array_start_index - tick_count(tick_spacing)
    } else {
        last_tick_array_start_index + tick_count(tick_spacing)
    };
    if next_start < -tick_boundary || next_start >= tick_boundary {
        return (false, last_tick_array_start_index);
    }

    let multiplier = tick_count(tick_spacing);
    let bit_pos = (next_start / multiplier + 512).unsigned_abs();

    if zero_for_one {
        let shifted = *merged << (1024 - bit_pos as usize - 1);
        match most_significant_bit(1024, &shifted) {
            Some(next_bit) => {
                let next_array_start = (bit_pos as i32 - next_bit as i32 - 512) * multiplier;
                (true, next_array_start)
            }
            None => (false, -tick_boundary),
        }
    } else {
        let shifted = *merged >> (bit_pos as usize);
        match least_significant_bit(1024, &shifted) {
            Some(next_bit) => {
                let next_array_start = (bit_pos as i32 + next_bit as i32 - 512) * multiplier;
                (true, next_array_start)
            }
            None => (false, tick_boundary - tick_count(tick_spacing)),
        }
    }
}

/// Next initialized array within a single 512-bit extension block.
fn next_initialized_tick_array_from_one_bitmap(
    last_tick_array_start_index: i32,
    tick_spacing: i32,
    zero_for_one: bool,
    extension: &TickArrayBitmapExtension,
) -> Result<(bool, i32)> {
    let multiplier = tick_count(tick_spacing);
    let next_start = if zero_for_one {
        last_tick_array_start_index - multiplier
    } else {
        last_tick_array_start_index + multiplier
    };

    let (_, block) = get_bitmap(next_start, tick_spacing, extension)?;
    let (bitmap_min_boundary, bitmap_max_boundary) =
        get_bitmap_tick_boundary(next_start, tick_spacing);
    let offset_in_bitmap = tick_array_offset_in_bitmap(next_start, tick_spacing);
    let merged = merge_bitmap(block);

    if zero_for_one {
        let shifted = merged << (TICK_ARRAY_BITMAP_SIZE - 1 - offset_in_bitmap) as usize;
        match leading_zeros(512, &shifted) {
            Some(next_bit) => {
                let next_array_start = next_start - next_bit as i32 * multiplier;
                Ok((true, next_array_start))
            }
            None => Ok((false, bitmap_min_boundary)),
        }
    } else {
        let shifted = merged >> offset_in_bitmap as usize;
        match trailing_zeros(512, &shifted) {
            Some(next_bit) => {
                let next_array_start = next_start + next_bit as i32 * multiplier;
                Ok((true, next_array_start))
            }
            None => Ok((false, bitmap_max_boundary - tick_count(tick_spacing))),
        }
    }
}

/// Walks default and extension bitmaps in direction until an initialized
/// array turns up; `None` when the whole tick domain is exhausted.
pub fn next_initialized_tick_array_start_index_utils(
    extension: &TickArrayBitmapExtension,
    tick_current: i32,
    tick_spacing: i32,
    tick_array_bitmap: &[u64; 16],
    zero_for_one: bool,
) -> Result<Option<i32>> {
    let merged = merge_bitmap(tick_array_bitmap);
    let mut last_start = get_array_start_index(tick_current, tick_spacing);
    loop {
        let (found, start) = next_initialized_tick_array_start_index(
            &merged,
            last_start,
            tick_spacing,
            zero_for_one,
        );
        if found {
            return Ok(Some(start));
        }
        last_start = start;

        match next_initialized_tick_array_from_one_bitmap(
            last_start,
            tick_spacing,
            zero_for_one,
            extension,
        ) {
            Ok((true, start)) => return Ok(Some(start)),
            Ok((false, start)) => last_start = start,
            Err(_) => return Ok(None),
        }

        if last_start < MIN_TICK || last_start > MAX_TICK {
            return Ok(None);
        }
    }
}

/// Initialized array start indices around the current tick, `count` per
/// direction, used to prefetch the tick-array cache.
pub fn initialized_tick_array_range(
    tick_array_bitmap: &[u64; 16],
    extension: &TickArrayBitmapExtension,
    tick_current: i32,
    tick_spacing: i32,
    count: usize,
) -> Vec<i32> {
    let start_index = get_array_start_index(tick_current, tick_spacing);
    let offset = (start_index as i64 / tick_count(tick_spacing) as i64) as i32;

    let mut result =
        search_low_bit_from_start(tick_array_bitmap, extension, offset - 1, count, tick_spacing);
    result.extend(search_high_bit_from_start(
        tick_array_bitmap,
        extension,
        offset - 1,
        count,
        tick_spacing,
    ));
    result
}

/// Thirty 512-bit blocks: negative extension (far to near), the two default
/// halves, then the positive extension.
fn all_bitmap_blocks(
    tick_array_bitmap: &[u64; 16],
    extension: &TickArrayBitmapExtension,
) -> Vec<U1024> {
    let mut blocks = Vec::with_capacity(2 * EXTENSION_TICKARRAY_BITMAP_SIZE + 2);
    for block in extension.negative_tick_array_bitmap.iter().rev() {
        blocks.push(merge_bitmap(block));
    }
    blocks.push(merge_bitmap(&tick_array_bitmap[0..8]));
    blocks.push(merge_bitmap(&tick_array_bitmap[8..16]));
    for block in extension.positive_tick_array_bitmap.iter() {
        blocks.push(merge_bitmap(block));
    }
    blocks
}

const BITMAP_BIT_RANGE: i32 = (EXTENSION_TICKARRAY_BITMAP_SIZE as i32 + 1) * TICK_ARRAY_BITMAP_SIZE;

pub fn search_low_bit_from_start(
    tick_array_bitmap: &[u64; 16],
    extension: &TickArrayBitmapExtension,
    mut current_bit_index: i32,
    expected_count: usize,
    tick_spacing: i32,
) -> Vec<i32> {
    let blocks = all_bitmap_blocks(tick_array_bitmap, extension);
    let mut result = Vec::new();
    while current_bit_index >= -BITMAP_BIT_RANGE && result.len() < expected_count {
        let flat = current_bit_index + BITMAP_BIT_RANGE;
        let block = &blocks[(flat / 512) as usize];
        if block.bit((flat % 512) as usize) {
            result.push(current_bit_index);
        }
        current_bit_index -= 1;
    }
    result
        .into_iter()
        .map(|bit| bit * tick_count(tick_spacing))
        .collect()
}

pub fn search_high_bit_from_start(
    tick_array_bitmap: &[u64; 16],
    extension: &TickArrayBitmapExtension,
    mut current_bit_index: i32,
    expected_count: usize,
    tick_spacing: i32,
) -> Vec<i32> {
    let blocks = all_bitmap_blocks(tick_array_bitmap, extension);
    let mut result = Vec::new();
    while current_bit_index < BITMAP_BIT_RANGE && result.len() < expected_count {
        let flat = current_bit_index + BITMAP_BIT_RANGE;
        let block = &blocks[(flat / 512) as usize];
        if block.bit((flat % 512) as usize) {
            result.push(current_bit_index);
        }
        current_bit_index += 1;
    }
    result
        .into_iter()
        .map(|bit| bit * tick_count(tick_spacing))
        .collect()
}

/// First tick with gross liquidity when entering an array from the swap
/// direction's edge.
pub fn first_initialized_tick(array: &TickArray, zero_for_one: bool) -> Result<&TickState> {
    if zero_for_one {
        for tick in array.ticks.iter().rev() {
            if tick.liquidity_gross > 0 {
                return Ok(tick);
            }
        }
    } else {
        for tick in array.ticks.iter() {
            if tick.liquidity_gross > 0 {
                return Ok(tick);
            }
        }
    }
    Err(RouteError::InsufficientLiquidity.into())
}

/// Next tick with gross liquidity inside the array holding `current_tick`.
/// `already_on_start` suppresses the off-by-one step when the walk has just
/// crossed onto the array's own start tick going one-for-zero.
pub fn next_init_tick<'a>(
    array: &'a TickArray,
    current_tick: i32,
    tick_spacing: i32,
    zero_for_one: bool,
    already_on_start: bool,
) -> Option<&'a TickState> {
    let current_array_start = get_array_start_index(current_tick, tick_spacing);
    if current_array_start != array.start_tick_index {
        return None;
    }
    let mut offset = (current_tick - array.start_tick_index) / tick_spacing;
    if zero_for_one {
        while offset >= 0 {
            let tick = &array.ticks[offset as usize];
            if tick.liquidity_gross > 0 {
                return Some(tick);
            }
            offset -= 1;
        }
    } else {
        if !already_on_start {
            offset += 1;
        }
        while offset < TICK_ARRAY_SIZE {
            let tick = &array.ticks[offset as usize];
            if tick.liquidity_gross > 0 {
                return Some(tick);
            }
            offset += 1;
        }
    }
    None
}

// --- liquidity <-> token amount step math ---

/// Token-A amount moved between two sqrt prices at a given liquidity.
pub fn get_token_amount_a_from_liquidity(
    sqrt_price_a_x64: u128,
    sqrt_price_b_x64: u128,
    liquidity: u128,
    round_up: bool,
) -> Result<U256> {
    let (price_a, price_b) = if sqrt_price_a_x64 > sqrt_price_b_x64 {
        (sqrt_price_b_x64, sqrt_price_a_x64)
    } else {
        (sqrt_price_a_x64, sqrt_price_b_x64)
    };
    if price_a == 0 {
        return Err(RouteError::InvalidInput("sqrt price must be positive").into());
    }

    let numerator_1 = U256::from(liquidity) << 64;
    let numerator_2 = U256::from(price_b - price_a);

    if round_up {
        let temp = mul_div_ceil(numerator_1, numerator_2, U256::from(price_b))?;
        mul_div_ceil(temp, U256::one(), U256::from(price_a))
    } else {
        let temp = mul_div_floor(numerator_1, numerator_2, U256::from(price_b))?;
        Ok(temp / U256::from(price_a))
    }
}

/// Token-B amount moved between two sqrt prices at a given liquidity.
pub fn get_token_amount_b_from_liquidity(
    sqrt_price_a_x64: u128,
    sqrt_price_b_x64: u128,
    liquidity: u128,
    round_up: bool,
) -> Result<U256> {
    let (price_a, price_b) = if sqrt_price_a_x64 > sqrt_price_b_x64 {
        (sqrt_price_b_x64, sqrt_price_a_x64)
    } else {
        (sqrt_price_a_x64, sqrt_price_b_x64)
    };
    if price_a == 0 {
        return Err(RouteError::InvalidInput("sqrt price must be positive").into());
    }

    let price_diff = U256::from(price_b - price_a);
    let q64 = U256::one() << 64;
    if round_up {
        mul_div_ceil(U256::from(liquidity), price_diff, q64)
    } else {
        mul_div_floor(U256::from(liquidity), price_diff, q64)
    }
}

fn next_sqrt_price_from_token_amount_a_rounding_up(
    sqrt_price_x64: u128,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> Result<u128> {
    if amount == 0 {
        return Ok(sqrt_price_x64);
    }
    let liquidity_shl = widen_256(U256::from(liquidity) << 64);
    let price = U512::from(sqrt_price_x64);

    if add {
        let denominator = liquidity_shl + U512::from(amount) * price;
        if denominator >= liquidity_shl {
            let numerator = liquidity_shl * price;
            let result = (numerator + (denominator - U512::one())) / denominator;
            return u256_to_u128(
                narrow_512(result, "next sqrt price from amount a")?,
                "next sqrt price from amount a",
            );
        }
        let temp = liquidity_shl / price + U512::from(amount);
        let result = (liquidity_shl + (temp - U512::one())) / temp;
        u256_to_u128(
            narrow_512(result, "next sqrt price from amount a")?,
            "next sqrt price from amount a",
        )
    } else {
        let amount_mul_price = U512::from(amount) * price;
        if liquidity_shl <= amount_mul_price {
            return Err(RouteError::InsufficientLiquidity.into());
        }
        let denominator = liquidity_shl - amount_mul_price;
        let numerator = liquidity_shl * price;
        let result = (numerator + (denominator - U512::one())) / denominator;
        u256_to_u128(
            narrow_512(result, "next sqrt price from amount a")?,
            "next sqrt price from amount a",
        )
    }
}

fn next_sqrt_price_from_token_amount_b_rounding_down(
    sqrt_price_x64: u128,
    liquidity: u128,
    amount: u128,
    add: bool,
) -> Result<u128> {
    let delta_y = U256::from(amount) << 64;
    let liquidity = U256::from(liquidity);
    if liquidity.is_zero() {
        return Err(RouteError::InsufficientLiquidity.into());
    }
    if add {
        let delta = delta_y / liquidity;
        u256_to_u128(
            U256::from(sqrt_price_x64) + delta,
            "next sqrt price from amount b",
        )
    } else {
        let delta = (delta_y + (liquidity - U256::one())) / liquidity;
        let price = U256::from(sqrt_price_x64);
        if price <= delta {
            return Err(RouteError::InsufficientLiquidity.into());
        }
        u256_to_u128(price - delta, "next sqrt price from amount b")
    }
}

fn next_sqrt_price_from_input(
    sqrt_price_x64: u128,
    liquidity: u128,
    amount_in: u128,
    zero_for_one: bool,
) -> Result<u128> {
    if sqrt_price_x64 == 0 {
        return Err(RouteError::InvalidInput("sqrt price must be positive").into());
    }
    if liquidity == 0 {
        return Err(RouteError::InsufficientLiquidity.into());
    }
    if amount_in == 0 {
        return Ok(sqrt_price_x64);
    }
    if zero_for_one {
        next_sqrt_price_from_token_amount_a_rounding_up(sqrt_price_x64, liquidity, amount_in, true)
    } else {
        next_sqrt_price_from_token_amount_b_rounding_down(sqrt_price_x64, liquidity, amount_in, true)
    }
}

fn next_sqrt_price_from_output(
    sqrt_price_x64: u128,
    liquidity: u128,
    amount_out: u128,
    zero_for_one: bool,
) -> Result<u128> {
    if sqrt_price_x64 == 0 {
        return Err(RouteError::InvalidInput("sqrt price must be positive").into());
    }
    if liquidity == 0 {
        return Err(RouteError::InsufficientLiquidity.into());
    }
    if zero_for_one {
        next_sqrt_price_from_token_amount_b_rounding_down(sqrt_price_x64, liquidity, amount_out, false)
    } else {
        next_sqrt_price_from_token_amount_a_rounding_up(sqrt_price_x64, liquidity, amount_out, false)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SwapStep {
    pub sqrt_price_next_x64: u128,
    pub amount_in: u128,
    pub amount_out: u128,
    pub fee_amount: u128,
}

/// One step of the concentrated-liquidity swap between the current price and
/// `sqrt_price_target_x64`, bounded by `amount_remaining` (positive when the
/// input side is fixed).
pub fn swap_step_compute(
    sqrt_price_current_x64: u128,
    sqrt_price_target_x64: u128,
    liquidity: u128,
    amount_remaining: i128,
    fee_rate: u32,
    zero_for_one: bool,
) -> Result<SwapStep> {
    if fee_rate >= FEE_RATE_DENOMINATOR {
        return Err(RouteError::InvalidInput("fee rate at or above the denominator").into());
    }
    let base_input = amount_remaining >= 0;
    let fee_denominator = U256::from(FEE_RATE_DENOMINATOR - fee_rate);

    let mut amount_in = U256::zero();
    let mut amount_out = U256::zero();
    let sqrt_price_next;

    if base_input {
        let remaining = U256::from(amount_remaining as u128);
        let amount_remaining_subtract_fee = mul_div_floor(
            remaining,
            fee_denominator,
            U256::from(FEE_RATE_DENOMINATOR),
        )?;
        amount_in = if zero_for_one {
            get_token_amount_a_from_liquidity(
                sqrt_price_target_x64,
                sqrt_price_current_x64,
                liquidity,
                true,
            )?
        } else {
            get_token_amount_b_from_liquidity(
                sqrt_price_current_x64,
                sqrt_price_target_x64,
                liquidity,
                true,
            )?
        };
        sqrt_price_next = if amount_remaining_subtract_fee >= amount_in {
            sqrt_price_target_x64
        } else {
            next_sqrt_price_from_input(
                sqrt_price_current_x64,
                liquidity,
                u256_to_u128(amount_remaining_subtract_fee, "swap step input")?,
                zero_for_one,
            )?
        };
    } else {
        amount_out = if zero_for_one {
            get_token_amount_b_from_liquidity(
                sqrt_price_target_x64,
                sqrt_price_current_x64,
                liquidity,
                false,
            )?
        } else {
            get_token_amount_a_from_liquidity(
                sqrt_price_current_x64,
                sqrt_price_target_x64,
                liquidity,
                false,
            )?
        };
        let remaining_negated = U256::from(amount_remaining.unsigned_abs());
        sqrt_price_next = if remaining_negated >= amount_out {
            sqrt_price_target_x64
        } else {
            next_sqrt_price_from_output(
                sqrt_price_current_x64,
                liquidity,
                u256_to_u128(remaining_negated, "swap step output")?,
                zero_for_one,
            )?
        };
    }

    let reached_target = sqrt_price_next == sqrt_price_target_x64;

    if zero_for_one {
        if !(reached_target && base_input) {
            amount_in = get_token_amount_a_from_liquidity(
                sqrt_price_next,
                sqrt_price_current_x64,
                liquidity,
                true,
            )?;
        }
        if !(reached_target && !base_input) {
            amount_out = get_token_amount_b_from_liquidity(
                sqrt_price_next,
                sqrt_price_current_x64,
                liquidity,
                false,
            )?;
        }
    } else {
        if !(reached_target && base_input) {
            amount_in = get_token_amount_b_from_liquidity(
                sqrt_price_current_x64,
                sqrt_price_next,
                liquidity,
                true,
            )?;
        }
        if !(reached_target && !base_input) {
            amount_out = get_token_amount_a_from_liquidity(
                sqrt_price_current_x64,
                sqrt_price_next,
                liquidity,
                false,
            )?;
        }
    }

    if !base_input {
        let remaining_negated = U256::from(amount_remaining.unsigned_abs());
        if amount_out > remaining_negated {
            amount_out = remaining_negated;
        }
    }

    let fee_amount = if base_input && sqrt_price_next != sqrt_price_target_x64 {
        U256::from(amount_remaining as u128) - amount_in
    } else {
        mul_div_ceil(amount_in, U256::from(fee_rate), fee_denominator)?
    };

    Ok(SwapStep {
        sqrt_price_next_x64: sqrt_price_next,
        amount_in: u256_to_u128(amount_in, "swap step amount_in")?,
        amount_out: u256_to_u128(amount_out, "swap step amount_out")?,
        fee_amount: u256_to_u128(fee_amount, "swap step fee")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tick_math::sqrt_price_x64_from_tick;

    fn empty_tick_array(start: i32) -> TickArray {
        TickArray {
            pool_id: Pubkey::default(),
            start_tick_index: start,
            ticks: std::array::from_fn(|_| TickState::default()),
            initialized_tick_count: 0,
        }
    }

    #[test]
    fn array_start_index_uses_floor_division() {
        assert_eq!(get_array_start_index(0, 60), 0);
        assert_eq!(get_array_start_index(3599, 60), 0);
        assert_eq!(get_array_start_index(3600, 60), 3600);
        assert_eq!(get_array_start_index(-1, 60), -3600);
        assert_eq!(get_array_start_index(-3600, 60), -3600);
        assert_eq!(get_array_start_index(-3601, 60), -7200);
    }

    #[test]
    fn tick_array_pda_seeds_are_big_endian() {
        assert_eq!((-60i32).to_be_bytes(), [255, 255, 255, 196]);
        let pool = Pubkey::new_unique();
        // Deterministic and distinct per start index.
        let a = get_pda_tick_array_address(&RAYDIUM_CLMM_PROGRAM_ID, &pool, -3600);
        let b = get_pda_tick_array_address(&RAYDIUM_CLMM_PROGRAM_ID, &pool, -3600);
        let c = get_pda_tick_array_address(&RAYDIUM_CLMM_PROGRAM_ID, &pool, 3600);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn pda_matches_manual_derivation_across_a_spacing_window() {
        let pool = Pubkey::new_unique();
        let spacing = 60;
        let mut start = -5 * tick_count(spacing);
        while start <= 5 * tick_count(spacing) {
            let derived = get_pda_tick_array_address(&RAYDIUM_CLMM_PROGRAM_ID, &pool, start);
            let manual = Pubkey::find_program_address(
                &[b"tick_array", pool.as_ref(), &start.to_be_bytes()],
                &RAYDIUM_CLMM_PROGRAM_ID,
            )
            .0;
            assert_eq!(derived, manual, "start {start}");
            start += tick_count(spacing);
        }
    }

    #[test]
    fn default_bitmap_membership() {
        let mut bitmap = [0u64; 16];
        // Array starting at -3600 for spacing 60: compressed = -1 + 512 = 511.
        bitmap[511 / 64] |= 1 << (511 % 64);
        assert!(check_tick_array_is_initialized(&bitmap, -3600, 60));
        assert!(!check_tick_array_is_initialized(&bitmap, 0, 60));
    }

    #[test]
    fn next_initialized_array_is_found_in_both_directions() {
        let mut bitmap = [0u64; 16];
        bitmap[511 / 64] |= 1 << (511 % 64); // start -3600
        bitmap[513 / 64] |= 1 << (513 % 64); // start 3600
        let ext = TickArrayBitmapExtension::default();

        let down = next_initialized_tick_array_start_index_utils(&ext, 100, 60, &bitmap, true)
            .unwrap()
            .unwrap();
        assert_eq!(down, -3600);

        let up = next_initialized_tick_array_start_index_utils(&ext, 100, 60, &bitmap, false)
            .unwrap()
            .unwrap();
        assert_eq!(up, 3600);
    }

    #[test]
    fn empty_bitmaps_yield_no_array() {
        let bitmap = [0u64; 16];
        let ext = TickArrayBitmapExtension::default();
        assert!(
            next_initialized_tick_array_start_index_utils(&ext, 0, 60, &bitmap, true)
                .unwrap()
                .is_none()
        );
        assert!(
            next_initialized_tick_array_start_index_utils(&ext, 0, 60, &bitmap, false)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn first_initialized_tick_scans_from_the_directional_edge() {
        let mut array = empty_tick_array(-3600);
        array.ticks[10].liquidity_gross = 5;
        array.ticks[10].tick = -3600 + 10 * 60;
        array.ticks[40].liquidity_gross = 7;
        array.ticks[40].tick = -3600 + 40 * 60;

        assert_eq!(first_initialized_tick(&array, true).unwrap().tick, -3600 + 40 * 60);
        assert_eq!(first_initialized_tick(&array, false).unwrap().tick, -3600 + 10 * 60);
        assert!(first_initialized_tick(&empty_tick_array(0), true).is_err());
    }

    #[test]
    fn token_amounts_round_in_the_callers_favor() {
        let lower = sqrt_price_x64_from_tick(-60).unwrap();
        let upper = sqrt_price_x64_from_tick(0).unwrap();
        let liquidity = 1_000_000_000_000_000_000u128;
        let a_up = get_token_amount_a_from_liquidity(lower, upper, liquidity, true).unwrap();
        let a_down = get_token_amount_a_from_liquidity(lower, upper, liquidity, false).unwrap();
        assert!(a_up >= a_down);
        let b_up = get_token_amount_b_from_liquidity(lower, upper, liquidity, true).unwrap();
        let b_down = get_token_amount_b_from_liquidity(lower, upper, liquidity, false).unwrap();
        assert!(b_up >= b_down);
        assert!(!a_down.is_zero() && !b_down.is_zero());
    }

    #[test]
    fn swap_step_never_crosses_the_target() {
        let current = sqrt_price_x64_from_tick(0).unwrap();
        let target = sqrt_price_x64_from_tick(-60).unwrap();
        let step = swap_step_compute(current, target, 1_000_000_000_000_000_000, 1_000_000_000, 500, true)
            .unwrap();
        assert!(step.sqrt_price_next_x64 >= target);
        assert!(step.sqrt_price_next_x64 <= current);
        assert!(step.amount_in + step.fee_amount <= 1_000_000_000);
    }

    #[test]
    fn decode_round_trips_known_fields() {
        let mut data = vec![0u8; TICK_ARRAY_SPAN];
        let pool = Pubkey::new_unique();
        data[8..40].copy_from_slice(pool.as_ref());
        data[40..44].copy_from_slice(&(-3600i32).to_le_bytes());
        // first tick record
        let tick_base = 44;
        data[tick_base..tick_base + 4].copy_from_slice(&(-3600i32).to_le_bytes());
        data[tick_base + 4..tick_base + 12].copy_from_slice(&(-42i64).to_le_bytes());
        data[tick_base + 20..tick_base + 36].copy_from_slice(&9u128.to_le_bytes());
        let array = TickArray::decode(&data).unwrap();
        assert_eq!(array.pool_id, pool);
        assert_eq!(array.start_tick_index, -3600);
        assert_eq!(array.ticks[0].tick, -3600);
        assert_eq!(array.ticks[0].liquidity_net, -42);
        assert_eq!(array.ticks[0].liquidity_gross, 9);
        assert!(TickArray::decode(&data[..100]).is_err());
    }
}
