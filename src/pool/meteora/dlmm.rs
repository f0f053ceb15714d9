//! Meteora DLMM: discrete-bin liquidity with dynamic fees driven by a
//! volatility accumulator. A swap walks adjacent bins in direction until the
//! input is consumed.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use super::bin_array::{
    bin_array_offset, bin_id_to_bin_array_index, derive_bin_array_pda,
    derive_event_authority_pda, is_overflow_default_bin_array_bitmap, BinArray,
    BinArrayBitmapExtension,
};
use super::{
    ActivationType, PairStatus, PairType, BASIS_POINT_MAX, BIN_ARRAY_BITMAP_SIZE, FEE_PRECISION,
    MAX_BIN_ID, MAX_FEE_RATE, METEORA_DLMM_PROGRAM_ID, MIN_BIN_ID,
};
use crate::api::{Pool, ProtocolKind, SwapParams};
use crate::constants::{MEMO_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::decode::AccountCursor;
use crate::error::RouteError;
use crate::math::bitmap::{leading_zeros, merge_bitmap, trailing_zeros};
use crate::sol::{Clock, SolClient};
use crate::utils::anchor_discriminator;

/// Immutable fee parameters set at pair creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticParameters {
    pub base_factor: u16,
    pub filter_period: u16,
    pub decay_period: u16,
    pub reduction_factor: u16,
    pub variable_fee_control: u32,
    pub max_volatility_accumulator: u32,
    pub min_bin_id: i32,
    pub max_bin_id: i32,
    pub protocol_share: u16,
    pub base_fee_power_factor: u8,
}

/// Volatility registers updated as the price crosses bins.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableParameters {
    pub volatility_accumulator: u32,
    pub volatility_reference: u32,
    pub index_reference: i32,
    pub last_update_timestamp: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DlmmRewardInfo {
    pub mint: Pubkey,
    pub vault: Pubkey,
    pub funder: Pubkey,
    pub reward_duration: u64,
    pub reward_duration_end: u64,
    pub reward_rate: u128,
    pub last_update_time: u64,
    pub cumulative_seconds_with_empty_liquidity_reward: u64,
}

/// Decoded 904-byte lb-pair account plus runtime attachments.
#[derive(Debug, Clone, Default)]
pub struct DlmmPool {
    pub parameters: StaticParameters,
    pub v_parameters: VariableParameters,
    pub bump_seed: u8,
    pub bin_step_seed: [u8; 2],
    pub pair_type: u8,
    pub active_id: i32,
    pub bin_step: u16,
    pub status: u8,
    pub require_base_factor_seed: u8,
    pub base_factor_seed: [u8; 2],
    pub activation_type: u8,
    pub creator_pool_on_off_control: u8,
    pub token_x_mint: Pubkey,
    pub token_y_mint: Pubkey,
    pub reserve_x: Pubkey,
    pub reserve_y: Pubkey,
    pub protocol_fee_x: u64,
    pub protocol_fee_y: u64,
    pub reward_infos: [DlmmRewardInfo; 2],
    pub oracle: Pubkey,
    pub bin_array_bitmap: [u64; 16],
    pub last_updated_at: i64,
    pub pre_activation_swap_address: Pubkey,
    pub base_key: Pubkey,
    pub activation_point: u64,
    pub pre_activation_duration: u64,
    pub creator: Pubkey,
    pub token_mint_x_program_flag: u8,
    pub token_mint_y_program_flag: u8,

    // runtime attachments
    pub pool_id: Pubkey,
    pub bin_arrays: BTreeMap<i64, BinArray>,
    pub bitmap_extension_key: Pubkey,
    pub bitmap_extension: Option<BinArrayBitmapExtension>,
}

impl DlmmPool {
    pub const SPAN: u64 = 904;
    pub const TOKEN_X_MINT_OFFSET: usize = 88;
    pub const TOKEN_Y_MINT_OFFSET: usize = 120;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("dlmm pool", data, Self::SPAN as usize)?;
        cur.skip(8);

        let mut pool = Self::default();
        pool.parameters = StaticParameters {
            base_factor: cur.read_u16(),
            filter_period: cur.read_u16(),
            decay_period: cur.read_u16(),
            reduction_factor: cur.read_u16(),
            variable_fee_control: cur.read_u32(),
            max_volatility_accumulator: cur.read_u32(),
            min_bin_id: cur.read_i32(),
            max_bin_id: cur.read_i32(),
            protocol_share: cur.read_u16(),
            base_fee_power_factor: cur.read_u8(),
        };
        cur.skip(5);
        pool.v_parameters = VariableParameters {
            volatility_accumulator: cur.read_u32(),
            volatility_reference: cur.read_u32(),
            index_reference: cur.read_i32(),
            last_update_timestamp: {
                cur.skip(4);
                cur.read_i64()
            },
        };
        cur.skip(8);
        pool.bump_seed = cur.read_u8();
        pool.bin_step_seed = [cur.read_u8(), cur.read_u8()];
        pool.pair_type = cur.read_u8();
        pool.active_id = cur.read_i32();
        pool.bin_step = cur.read_u16();
        pool.status = cur.read_u8();
        pool.require_base_factor_seed = cur.read_u8();
        pool.base_factor_seed = [cur.read_u8(), cur.read_u8()];
        pool.activation_type = cur.read_u8();
        pool.creator_pool_on_off_control = cur.read_u8();
        pool.token_x_mint = cur.read_pubkey();
        pool.token_y_mint = cur.read_pubkey();
        pool.reserve_x = cur.read_pubkey();
        pool.reserve_y = cur.read_pubkey();
        pool.protocol_fee_x = cur.read_u64();
        pool.protocol_fee_y = cur.read_u64();
        cur.skip(32);
        for info in pool.reward_infos.iter_mut() {
            info.mint = cur.read_pubkey();
            info.vault = cur.read_pubkey();
            info.funder = cur.read_pubkey();
            info.reward_duration = cur.read_u64();
            info.reward_duration_end = cur.read_u64();
            info.reward_rate = cur.read_u128();
            info.last_update_time = cur.read_u64();
            info.cumulative_seconds_with_empty_liquidity_reward = cur.read_u64();
        }
        pool.oracle = cur.read_pubkey();
        for limb in pool.bin_array_bitmap.iter_mut() {
            *limb = cur.read_u64();
        }
        pool.last_updated_at = cur.read_i64();
        cur.skip(32);
        pool.pre_activation_swap_address = cur.read_pubkey();
        pool.base_key = cur.read_pubkey();
        pool.activation_point = cur.read_u64();
        pool.pre_activation_duration = cur.read_u64();
        cur.skip(16);
        pool.creator = cur.read_pubkey();
        pool.token_mint_x_program_flag = cur.read_u8();
        pool.token_mint_y_program_flag = cur.read_u8();
        Ok(pool)
    }

    /// Rejects disabled pairs and permissioned pairs whose activation point
    /// has not been reached on the configured axis (slot or timestamp).
    pub fn validate_swap_activation(&self, clock: &Clock) -> Result<()> {
        if self.status != PairStatus::Enabled as u8 {
            return Err(RouteError::PoolDisabled.into());
        }
        if self.pair_type == PairType::Permission as u8 {
            let current_point = if self.activation_type == ActivationType::Slot as u8 {
                clock.slot
            } else if self.activation_type == ActivationType::Timestamp as u8 {
                clock.unix_timestamp as u64
            } else {
                return Err(RouteError::InvalidInput("unknown activation type").into());
            };
            if current_point < self.activation_point {
                return Err(RouteError::NotYetActivated.into());
            }
        }
        Ok(())
    }

    pub fn base_fee_rate(&self) -> Result<u128> {
        let rate = (self.parameters.base_factor as u128)
            .checked_mul(self.bin_step as u128)
            .and_then(|v| v.checked_mul(10))
            .and_then(|v| v.checked_mul(10u128.pow(self.parameters.base_fee_power_factor as u32)))
            .ok_or(RouteError::Overflow("dlmm base fee"))?;
        Ok(rate)
    }

    pub fn variable_fee_rate(&self, v_parameters: &VariableParameters) -> Result<u128> {
        if self.parameters.variable_fee_control == 0 {
            return Ok(0);
        }
        let square_vfa_bin = (v_parameters.volatility_accumulator as u128)
            .checked_mul(self.bin_step as u128)
            .and_then(|v| v.checked_mul(v))
            .ok_or(RouteError::Overflow("dlmm variable fee"))?;
        let v_fee = (self.parameters.variable_fee_control as u128)
            .checked_mul(square_vfa_bin)
            .ok_or(RouteError::Overflow("dlmm variable fee"))?;
        Ok((v_fee + 99_999_999_999) / 100_000_000_000)
    }

    /// base + variable, capped at 10%.
    pub fn total_fee_rate(&self, v_parameters: &VariableParameters) -> Result<u128> {
        let total = self.base_fee_rate()? + self.variable_fee_rate(v_parameters)?;
        Ok(total.min(MAX_FEE_RATE))
    }

    /// Fee charged on top of a fee-free amount: ceil against the residual
    /// precision.
    pub fn compute_fee(&self, total_fee_rate: u128, amount: u128) -> Result<u64> {
        let denominator = FEE_PRECISION
            .checked_sub(total_fee_rate)
            .filter(|d| *d > 0)
            .ok_or(RouteError::Overflow("dlmm fee denominator"))?;
        let fee = amount
            .checked_mul(total_fee_rate)
            .and_then(|v| v.checked_add(denominator - 1))
            .ok_or(RouteError::Overflow("dlmm fee"))?
            / denominator;
        u64::try_from(fee).map_err(|_| RouteError::Overflow("dlmm fee").into())
    }

    /// Fee carved out of an amount that already includes it.
    pub fn compute_fee_from_amount(&self, total_fee_rate: u128, amount_with_fees: u64) -> Result<u64> {
        let fee = (amount_with_fees as u128)
            .checked_mul(total_fee_rate)
            .and_then(|v| v.checked_add(FEE_PRECISION - 1))
            .ok_or(RouteError::Overflow("dlmm fee"))?
            / FEE_PRECISION;
        u64::try_from(fee).map_err(|_| RouteError::Overflow("dlmm fee").into())
    }

    pub fn compute_protocol_fee(&self, fee_amount: u64) -> Result<u64> {
        let protocol_fee =
            (fee_amount as u128) * self.parameters.protocol_share as u128 / BASIS_POINT_MAX as u128;
        u64::try_from(protocol_fee).map_err(|_| RouteError::Overflow("dlmm protocol fee").into())
    }

    /// Decays the volatility reference when the pair has been quiet for at
    /// least one filter period.
    pub fn update_references(&self, v_parameters: &mut VariableParameters, now: i64) {
        let elapsed = now - v_parameters.last_update_timestamp;
        if elapsed >= self.parameters.filter_period as i64 {
            v_parameters.index_reference = self.active_id;
            if elapsed < self.parameters.decay_period as i64 {
                v_parameters.volatility_reference = (v_parameters.volatility_accumulator as u64
                    * self.parameters.reduction_factor as u64
                    / BASIS_POINT_MAX as u64) as u32;
            } else {
                v_parameters.volatility_reference = 0;
            }
        }
    }

    /// Accumulates crossed-bin distance, clamped to the configured maximum.
    pub fn update_volatility_accumulator(
        &self,
        v_parameters: &mut VariableParameters,
        active_id: i32,
    ) {
        let delta_id = (v_parameters.index_reference as i64 - active_id as i64).unsigned_abs();
        let accumulated =
            v_parameters.volatility_reference as u64 + delta_id * BASIS_POINT_MAX as u64;
        v_parameters.volatility_accumulator =
            accumulated.min(self.parameters.max_volatility_accumulator as u64) as u32;
    }

    /// Next array with liquidity using only the in-pool bitmap;
    /// `(edge, false)` when the window is exhausted in that direction.
    pub fn next_bin_array_index_with_liquidity_internal(
        &self,
        swap_for_y: bool,
        start_index: i32,
    ) -> (i32, bool) {
        let merged = merge_bitmap(&self.bin_array_bitmap);
        let offset = bin_array_offset(start_index);
        if swap_for_y {
            let shifted = merged << (1023 - offset);
            match leading_zeros(1024, &shifted) {
                Some(lz) => (start_index - lz as i32, true),
                None => (-BIN_ARRAY_BITMAP_SIZE - 1, false),
            }
        } else {
            let shifted = merged >> offset;
            match trailing_zeros(1024, &shifted) {
                Some(tz) => (start_index + tz as i32, true),
                None => (BIN_ARRAY_BITMAP_SIZE, false),
            }
        }
    }

    /// Next array with liquidity across the in-pool bitmap and the
    /// extension.
    pub fn next_bin_array_index_with_liquidity(
        &self,
        swap_for_y: bool,
        mut start_index: i32,
    ) -> Result<i32> {
        loop {
            if is_overflow_default_bin_array_bitmap(start_index) {
                let extension = self
                    .bitmap_extension
                    .as_ref()
                    .ok_or(RouteError::InsufficientLiquidity)?;
                let (index, found) =
                    extension.next_bin_array_index_with_liquidity(swap_for_y, start_index)?;
                if found {
                    return Ok(index);
                }
                start_index = index;
            } else {
                let (index, found) =
                    self.next_bin_array_index_with_liquidity_internal(swap_for_y, start_index);
                if found {
                    return Ok(index);
                }
                if self.bitmap_extension.is_none() {
                    return Err(RouteError::InsufficientLiquidity.into());
                }
                start_index = index;
            }
        }
    }

    /// Bin arrays a swap in `swap_for_y` direction would touch, in walk
    /// order, up to `take_count`.
    pub fn bin_array_pubkeys_for_swap(
        &self,
        swap_for_y: bool,
        take_count: usize,
    ) -> Result<Vec<Pubkey>> {
        let mut pubkeys = Vec::with_capacity(take_count);
        let mut start_index = bin_id_to_bin_array_index(self.active_id);
        let increment = if swap_for_y { -1 } else { 1 };
        for _ in 0..take_count {
            match self.next_bin_array_index_with_liquidity(swap_for_y, start_index) {
                Ok(index) => {
                    pubkeys.push(derive_bin_array_pda(&self.pool_id, index as i64));
                    start_index = index + increment;
                }
                Err(_) => break,
            }
        }
        Ok(pubkeys)
    }

    /// The full bin walk over a request-local copy of the volatile state.
    pub fn compute_amount_out(&self, clock: &Clock, input_mint: Pubkey, amount_in: u64) -> Result<u64> {
        self.validate_swap_activation(clock)?;

        let swap_for_y = input_mint == self.token_x_mint;
        let mut arrays = self.bin_arrays.clone();
        let mut v_parameters = self.v_parameters;
        let mut active_id = self.active_id;
        let mut amount_left = amount_in;
        let mut total_amount_out: u64 = 0;

        self.update_references(&mut v_parameters, clock.unix_timestamp);

        while amount_left > 0 {
            let array_index =
                self.next_bin_array_index_with_liquidity(swap_for_y, bin_id_to_bin_array_index(active_id))?;
            let (lower, upper) = BinArray::lower_upper_bin_id(array_index);
            // The bitmap may jump a gap of empty arrays; snap onto the edge.
            if active_id < lower {
                if swap_for_y {
                    return Err(RouteError::InsufficientLiquidity.into());
                }
                active_id = lower;
            } else if active_id > upper {
                if !swap_for_y {
                    return Err(RouteError::InsufficientLiquidity.into());
                }
                active_id = upper;
            }
            let array = arrays
                .get_mut(&(array_index as i64))
                .ok_or(RouteError::InsufficientLiquidity)?;

            while amount_left > 0 && active_id >= lower && active_id <= upper {
                self.update_volatility_accumulator(&mut v_parameters, active_id);

                let total_fee_rate = self.total_fee_rate(&v_parameters)?;
                let bin = array.get_bin_mut(active_id)?;
                if !bin.is_empty(!swap_for_y) {
                    let price = bin.get_or_store_price(active_id, self.bin_step)?;
                    let result = swap_in_bin(
                        self,
                        bin,
                        total_fee_rate,
                        price,
                        amount_left,
                        swap_for_y,
                    )?;
                    amount_left = amount_left
                        .checked_sub(result.amount_in_with_fees)
                        .ok_or(RouteError::Overflow("dlmm amount left"))?;
                    total_amount_out = total_amount_out
                        .checked_add(result.amount_out)
                        .ok_or(RouteError::Overflow("dlmm amount out"))?;
                }
                if amount_left == 0 {
                    break;
                }
                active_id = advance_active_bin(active_id, swap_for_y)?;
            }
        }

        Ok(total_amount_out)
    }
}

fn advance_active_bin(active_id: i32, swap_for_y: bool) -> Result<i32> {
    let next = if swap_for_y {
        active_id.checked_sub(1)
    } else {
        active_id.checked_add(1)
    }
    .ok_or(RouteError::Overflow("bin id step"))?;
    if !(MIN_BIN_ID..=MAX_BIN_ID).contains(&next) {
        return Err(RouteError::InsufficientLiquidity.into());
    }
    Ok(next)
}

#[derive(Debug, Clone, Copy)]
pub struct BinSwapResult {
    /// Input consumed from the user, fee included.
    pub amount_in_with_fees: u64,
    pub amount_out: u64,
    pub fee: u64,
    pub protocol_fee: u64,
}

/// Swap against one bin's inventory and mutate its balances.
fn swap_in_bin(
    pool: &DlmmPool,
    bin: &mut super::bin_array::Bin,
    total_fee_rate: u128,
    price: u128,
    amount_in: u64,
    swap_for_y: bool,
) -> Result<BinSwapResult> {
    let max_amount_out = bin.max_amount_out(swap_for_y);
    let mut max_amount_in = bin.max_amount_in(price, swap_for_y)?;
    let max_fee = pool.compute_fee(total_fee_rate, max_amount_in)?;
    max_amount_in = max_amount_in
        .checked_add(max_fee as u128)
        .ok_or(RouteError::Overflow("bin max amount in"))?;

    let (amount_in_with_fees, amount_out, fee) = if (amount_in as u128) > max_amount_in {
        (
            u64::try_from(max_amount_in).map_err(|_| RouteError::Overflow("bin max amount in"))?,
            max_amount_out,
            max_fee,
        )
    } else {
        let fee = pool.compute_fee_from_amount(total_fee_rate, amount_in)?;
        let amount_in_after_fee = amount_in - fee;
        let amount_out_raw = bin.amount_out(amount_in_after_fee, price, swap_for_y)?;
        let amount_out = u64::try_from(amount_out_raw)
            .unwrap_or(u64::MAX)
            .min(max_amount_out);
        (amount_in, amount_out, fee)
    };
    let protocol_fee = pool.compute_protocol_fee(fee)?;

    let amount_into_bin = amount_in_with_fees - fee;
    if swap_for_y {
        bin.amount_x += amount_into_bin;
        if bin.amount_y < amount_out {
            return Err(RouteError::InsufficientLiquidity.into());
        }
        bin.amount_y -= amount_out;
    } else {
        bin.amount_y += amount_into_bin;
        if bin.amount_x < amount_out {
            return Err(RouteError::InsufficientLiquidity.into());
        }
        bin.amount_x -= amount_out;
    }

    Ok(BinSwapResult {
        amount_in_with_fees,
        amount_out,
        fee,
        protocol_fee,
    })
}

/// Borsh tail of the swap2 instruction: two typed remaining-account slices
/// (transfer hooks), both empty.
fn remaining_accounts_info_bytes() -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 2 * 2);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.push(0); // AccountsType::TransferHookX
    data.push(0); // length
    data.push(1); // AccountsType::TransferHookY
    data.push(0); // length
    data
}

pub fn dlmm_swap_instruction_data(amount_in: u64, min_out: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 8 + 8 + 8);
    data.extend_from_slice(&anchor_discriminator("global", "swap2"));
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_out.to_le_bytes());
    data.extend_from_slice(&remaining_accounts_info_bytes());
    data
}

#[async_trait]
impl Pool for DlmmPool {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::MeteoraDlmm
    }

    fn program_id(&self) -> Pubkey {
        METEORA_DLMM_PROGRAM_ID
    }

    fn id(&self) -> Pubkey {
        self.pool_id
    }

    fn token_pair(&self) -> (Pubkey, Pubkey) {
        (self.token_x_mint, self.token_y_mint)
    }

    async fn quote(&self, client: &SolClient, input_mint: Pubkey, amount_in: u64) -> Result<u64> {
        let clock = client.get_clock().await?;
        debug!(
            "dlmm quote pool={} active_id={} cached_bin_arrays={}",
            self.pool_id,
            self.active_id,
            self.bin_arrays.len()
        );
        self.compute_amount_out(&clock, input_mint, amount_in)
    }

    async fn build_swap_instructions(
        &self,
        _client: &SolClient,
        params: &SwapParams,
    ) -> Result<Vec<Instruction>> {
        let swap_for_y = params.input_mint == self.token_x_mint;
        let (user_in, user_out) = if swap_for_y {
            (params.user_base_account, params.user_quote_account)
        } else {
            (params.user_quote_account, params.user_base_account)
        };

        let bitmap_extension_meta = if self.bitmap_extension.is_some() {
            AccountMeta::new_readonly(self.bitmap_extension_key, false)
        } else {
            AccountMeta::new_readonly(METEORA_DLMM_PROGRAM_ID, false)
        };

        let mut accounts = vec![
            AccountMeta::new(self.pool_id, false),
            bitmap_extension_meta,
            AccountMeta::new(self.reserve_x, false),
            AccountMeta::new(self.reserve_y, false),
            AccountMeta::new(user_in, false),
            AccountMeta::new(user_out, false),
            AccountMeta::new_readonly(self.token_x_mint, false),
            AccountMeta::new_readonly(self.token_y_mint, false),
            AccountMeta::new(self.oracle, false),
            // host fee account unused
            AccountMeta::new_readonly(METEORA_DLMM_PROGRAM_ID, false),
            AccountMeta::new_readonly(params.user, true),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(MEMO_PROGRAM_ID, false),
            AccountMeta::new_readonly(derive_event_authority_pda(), false),
            AccountMeta::new_readonly(METEORA_DLMM_PROGRAM_ID, false),
        ];
        for pubkey in self.bin_array_pubkeys_for_swap(swap_for_y, 4)? {
            accounts.push(AccountMeta::new(pubkey, false));
        }

        Ok(vec![Instruction {
            program_id: METEORA_DLMM_PROGRAM_ID,
            accounts,
            data: dlmm_swap_instruction_data(params.amount_in, params.min_out),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::super::bin_array::Bin;
    use super::*;
    use crate::math::u64x64::ONE_X64;

    fn bin_array_with(index: i32, entries: &[(i32, u64, u64, u128)]) -> BinArray {
        let mut array = BinArray {
            index: index as i64,
            version: 1,
            lb_pair: Pubkey::default(),
            bins: std::array::from_fn(|_| Bin::default()),
        };
        let (lower, _) = BinArray::lower_upper_bin_id(index);
        for (bin_id, x, y, price) in entries {
            array.bins[(*bin_id - lower) as usize] = Bin {
                amount_x: *x,
                amount_y: *y,
                price: *price,
                ..Bin::default()
            };
        }
        array
    }

    fn enabled_pool() -> DlmmPool {
        let mut pool = DlmmPool {
            token_x_mint: Pubkey::new_unique(),
            token_y_mint: Pubkey::new_unique(),
            pool_id: Pubkey::new_unique(),
            active_id: 0,
            bin_step: 10,
            status: PairStatus::Enabled as u8,
            pair_type: PairType::Permissionless as u8,
            ..DlmmPool::default()
        };
        pool.parameters = StaticParameters {
            base_factor: 5_000,
            filter_period: 30,
            decay_period: 600,
            reduction_factor: 5_000,
            variable_fee_control: 0,
            max_volatility_accumulator: 350_000,
            min_bin_id: MIN_BIN_ID,
            max_bin_id: MAX_BIN_ID,
            protocol_share: 1_000,
            base_fee_power_factor: 0,
        };
        // array 0 initialized: offset 512
        pool.bin_array_bitmap[512 / 64] |= 1 << (512 % 64);
        pool
    }

    fn clock_at(timestamp: i64) -> Clock {
        Clock {
            slot: 1,
            unix_timestamp: timestamp,
            ..Clock::default()
        }
    }

    #[test]
    fn decode_reads_the_mint_offsets() {
        let mut data = vec![0u8; DlmmPool::SPAN as usize];
        let x = Pubkey::new_unique();
        let y = Pubkey::new_unique();
        data[DlmmPool::TOKEN_X_MINT_OFFSET..DlmmPool::TOKEN_X_MINT_OFFSET + 32]
            .copy_from_slice(x.as_ref());
        data[DlmmPool::TOKEN_Y_MINT_OFFSET..DlmmPool::TOKEN_Y_MINT_OFFSET + 32]
            .copy_from_slice(y.as_ref());
        // static parameters start at 8
        data[8..10].copy_from_slice(&5000u16.to_le_bytes());
        // active_id at 8 + 32 + 32 + 4 = 76
        data[76..80].copy_from_slice(&(-17i32).to_le_bytes());
        data[80..82].copy_from_slice(&10u16.to_le_bytes());
        // oracle at 552
        let oracle = Pubkey::new_unique();
        data[552..584].copy_from_slice(oracle.as_ref());

        let pool = DlmmPool::decode(&data).unwrap();
        assert_eq!(pool.token_x_mint, x);
        assert_eq!(pool.token_y_mint, y);
        assert_eq!(pool.parameters.base_factor, 5000);
        assert_eq!(pool.active_id, -17);
        assert_eq!(pool.bin_step, 10);
        assert_eq!(pool.oracle, oracle);
        assert!(DlmmPool::decode(&data[..900]).is_err());
    }

    #[test]
    fn activation_gate_rejects_disabled_and_pending_pairs() {
        let mut pool = enabled_pool();
        pool.status = PairStatus::Disabled as u8;
        let err = pool.validate_swap_activation(&clock_at(100)).unwrap_err();
        assert_eq!(err.downcast_ref::<RouteError>(), Some(&RouteError::PoolDisabled));

        let mut pool = enabled_pool();
        pool.pair_type = PairType::Permission as u8;
        pool.activation_type = ActivationType::Timestamp as u8;
        pool.activation_point = 1_000;
        let err = pool.validate_swap_activation(&clock_at(999)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RouteError>(),
            Some(&RouteError::NotYetActivated)
        );
        assert!(pool.validate_swap_activation(&clock_at(1_000)).is_ok());
    }

    #[test]
    fn volatility_accumulator_is_clamped() {
        let pool = enabled_pool();
        let mut v = VariableParameters {
            volatility_reference: 100_000,
            index_reference: 0,
            ..VariableParameters::default()
        };
        pool.update_volatility_accumulator(&mut v, 1_000);
        assert_eq!(
            v.volatility_accumulator,
            pool.parameters.max_volatility_accumulator
        );

        let mut v = VariableParameters {
            index_reference: 5,
            ..VariableParameters::default()
        };
        pool.update_volatility_accumulator(&mut v, 3);
        assert_eq!(v.volatility_accumulator, 2 * BASIS_POINT_MAX as u32);
    }

    #[test]
    fn reference_decay_uses_the_reduction_factor() {
        let pool = enabled_pool();
        let mut v = VariableParameters {
            volatility_accumulator: 10_000,
            last_update_timestamp: 0,
            ..VariableParameters::default()
        };
        // within decay period: halved by the 5000/10000 reduction factor
        pool.update_references(&mut v, 100);
        assert_eq!(v.volatility_reference, 5_000);
        // past the decay period: reset
        let mut v = VariableParameters {
            volatility_accumulator: 10_000,
            last_update_timestamp: 0,
            ..VariableParameters::default()
        };
        pool.update_references(&mut v, 1_000);
        assert_eq!(v.volatility_reference, 0);
        // below the filter period: untouched
        let mut v = VariableParameters {
            volatility_accumulator: 10_000,
            volatility_reference: 7,
            last_update_timestamp: 0,
            ..VariableParameters::default()
        };
        pool.update_references(&mut v, 10);
        assert_eq!(v.volatility_reference, 7);
    }

    #[test]
    fn base_fee_grows_with_bin_step() {
        let mut pool = enabled_pool();
        let mut last = 0;
        for bin_step in [1u16, 5, 10, 50, 100] {
            pool.bin_step = bin_step;
            let fee = pool.base_fee_rate().unwrap();
            assert!(fee > last);
            last = fee;
        }
    }

    #[test]
    fn single_bin_swap_matches_the_constant_sum_expectation() {
        let mut pool = enabled_pool();
        pool.bin_arrays.insert(
            0,
            bin_array_with(0, &[(0, 0, 10_000, ONE_X64)]),
        );

        // base fee = 5000 * 10 * 10 = 500_000; fee = ceil(1000 * 5e5 / 1e9) = 1.
        let out = pool
            .compute_amount_out(&clock_at(100), pool.token_x_mint, 1_000)
            .unwrap();
        assert_eq!(out, 999);
    }

    #[test]
    fn swap_drains_the_bin_and_walks_to_the_next() {
        let mut pool = enabled_pool();
        // active bin holds 100 Y; the next lower bin holds plenty
        pool.bin_arrays.insert(
            0,
            bin_array_with(0, &[(0, 0, 100, ONE_X64), (-1, 0, 0, ONE_X64)]),
        );
        pool.bin_array_bitmap[511 / 64] |= 1 << (511 % 64); // array -1
        pool.bin_arrays.insert(
            -1,
            bin_array_with(-1, &[(-1, 0, 1_000_000, ONE_X64)]),
        );

        let out = pool
            .compute_amount_out(&clock_at(100), pool.token_x_mint, 1_000)
            .unwrap();
        // all 100 from the first bin, remainder from the next
        assert!(out > 100);
        assert!(out < 1_000);
    }

    #[test]
    fn bounded_cache_surfaces_insufficient_liquidity() {
        let mut pool = enabled_pool();
        // bitmap says array 0 has liquidity but the bin inventory is empty,
        // and nothing below it is initialized
        pool.bin_arrays
            .insert(0, bin_array_with(0, &[(0, 0, 10, ONE_X64)]));

        let err = pool
            .compute_amount_out(&clock_at(100), pool.token_x_mint, 1_000_000_000)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<RouteError>(),
            Some(&RouteError::InsufficientLiquidity)
        );
    }

    #[test]
    fn swap2_data_has_discriminator_amounts_and_hook_slices() {
        let data = dlmm_swap_instruction_data(1_000, 900);
        assert_eq!(&data[0..8], &anchor_discriminator("global", "swap2"));
        assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 1_000);
        assert_eq!(u64::from_le_bytes(data[16..24].try_into().unwrap()), 900);
        assert_eq!(u32::from_le_bytes(data[24..28].try_into().unwrap()), 2);
        assert_eq!(data.len(), 28 + 4);
    }
}
