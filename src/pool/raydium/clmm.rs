//! Raydium CLMM: concentrated liquidity with tick arrays and Q64.64 sqrt
//! prices. The quote simulator walks initialized ticks exactly the way the
//! on-chain program does.

use std::collections::BTreeMap;

use anchor_lang::AnchorDeserialize;
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use super::tick_array::{
    check_tick_array_is_init, check_tick_array_is_initialized, first_initialized_tick,
    get_array_start_index, get_pda_ex_bitmap_address, get_pda_tick_array_address,
    initialized_tick_array_range, is_overflow_default_tickarray_bitmap, next_init_tick,
    next_initialized_tick_array_start_index_utils, search_high_bit_from_start,
    search_low_bit_from_start, swap_step_compute, tick_count, TickArray,
    TickArrayBitmapExtension,
};
use super::RAYDIUM_CLMM_PROGRAM_ID;
use crate::api::{Pool, ProtocolKind, SwapParams};
use crate::constants::{MEMO_PROGRAM_ID, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::decode::AccountCursor;
use crate::error::RouteError;
use crate::math::tick_math::{
    sqrt_price_x64_from_tick, tick_from_sqrt_price_x64, MAX_SQRT_PRICE_X64, MAX_TICK,
    MIN_SQRT_PRICE_X64, MIN_TICK,
};
use crate::sol::SolClient;

/// Per-pool fee config referenced by the pool account (anchor layout).
#[derive(AnchorDeserialize, Clone, Debug, Default)]
pub struct ClmmAmmConfig {
    pub bump: u8,
    pub index: u16,
    pub owner: Pubkey,
    pub protocol_fee_rate: u32,
    pub trade_fee_rate: u32,
    pub tick_spacing: u16,
    pub fund_fee_rate: u32,
    pub padding_u32: u32,
    pub fund_owner: Pubkey,
    pub padding: [u64; 3],
}

impl ClmmAmmConfig {
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(RouteError::Decode {
                context: "clmm amm config",
                expected: 8,
                got: data.len(),
            }
            .into());
        }
        Ok(Self::deserialize(&mut &data[8..])?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClmmRewardInfo {
    pub reward_state: u8,
    pub open_time: u64,
    pub end_time: u64,
    pub last_update_time: u64,
    pub emissions_per_second_x64: u128,
    pub reward_total_emissioned: u64,
    pub reward_claimed: u64,
    pub token_mint: Pubkey,
    pub token_vault: Pubkey,
    pub authority: Pubkey,
    pub reward_growth_global_x64: u128,
}

/// Decoded 1544-byte CLMM pool state plus discovery attachments.
#[derive(Debug, Clone, Default)]
pub struct ClmmPool {
    pub bump: u8,
    pub amm_config: Pubkey,
    pub owner: Pubkey,
    pub token_mint_0: Pubkey,
    pub token_mint_1: Pubkey,
    pub token_vault_0: Pubkey,
    pub token_vault_1: Pubkey,
    pub observation_key: Pubkey,
    pub mint_decimals_0: u8,
    pub mint_decimals_1: u8,
    pub tick_spacing: u16,
    pub liquidity: u128,
    pub sqrt_price_x64: u128,
    pub tick_current: i32,
    pub observation_index: u16,
    pub observation_update_duration: u16,
    pub fee_growth_global_0_x64: u128,
    pub fee_growth_global_1_x64: u128,
    pub protocol_fees_token_0: u64,
    pub protocol_fees_token_1: u64,
    pub swap_in_amount_token_0: u128,
    pub swap_out_amount_token_1: u128,
    pub swap_in_amount_token_1: u128,
    pub swap_out_amount_token_0: u128,
    pub status: u8,
    pub reward_infos: [ClmmRewardInfo; 3],
    pub tick_array_bitmap: [u64; 16],
    pub total_fees_token_0: u64,
    pub total_fees_claimed_token_0: u64,
    pub total_fees_token_1: u64,
    pub total_fees_claimed_token_1: u64,
    pub fund_fees_token_0: u64,
    pub fund_fees_token_1: u64,
    pub open_time: u64,
    pub recent_epoch: u64,

    // attached at discovery
    pub pool_id: Pubkey,
    pub fee_rate: u32,
    pub ex_bitmap_address: Pubkey,
}

impl ClmmPool {
    pub const SPAN: u64 = 1544;
    pub const TOKEN_MINT_0_OFFSET: usize = 8 + 1 + 32 + 32;
    pub const TOKEN_MINT_1_OFFSET: usize = Self::TOKEN_MINT_0_OFFSET + 32;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("clmm pool", data, Self::SPAN as usize)?;
        cur.skip(8);
        let mut pool = Self {
            bump: cur.read_u8(),
            amm_config: cur.read_pubkey(),
            owner: cur.read_pubkey(),
            token_mint_0: cur.read_pubkey(),
            token_mint_1: cur.read_pubkey(),
            token_vault_0: cur.read_pubkey(),
            token_vault_1: cur.read_pubkey(),
            observation_key: cur.read_pubkey(),
            mint_decimals_0: cur.read_u8(),
            mint_decimals_1: cur.read_u8(),
            tick_spacing: cur.read_u16(),
            liquidity: cur.read_u128(),
            sqrt_price_x64: cur.read_u128(),
            tick_current: cur.read_i32(),
            observation_index: cur.read_u16(),
            observation_update_duration: cur.read_u16(),
            fee_growth_global_0_x64: cur.read_u128(),
            fee_growth_global_1_x64: cur.read_u128(),
            protocol_fees_token_0: cur.read_u64(),
            protocol_fees_token_1: cur.read_u64(),
            swap_in_amount_token_0: cur.read_u128(),
            swap_out_amount_token_1: cur.read_u128(),
            swap_in_amount_token_1: cur.read_u128(),
            swap_out_amount_token_0: cur.read_u128(),
            status: cur.read_u8(),
            ..Self::default()
        };
        cur.skip(7);
        for info in pool.reward_infos.iter_mut() {
            info.reward_state = cur.read_u8();
            info.open_time = cur.read_u64();
            info.end_time = cur.read_u64();
            info.last_update_time = cur.read_u64();
            info.emissions_per_second_x64 = cur.read_u128();
            info.reward_total_emissioned = cur.read_u64();
            info.reward_claimed = cur.read_u64();
            info.token_mint = cur.read_pubkey();
            info.token_vault = cur.read_pubkey();
            info.authority = cur.read_pubkey();
            info.reward_growth_global_x64 = cur.read_u128();
        }
        for limb in pool.tick_array_bitmap.iter_mut() {
            *limb = cur.read_u64();
        }
        pool.total_fees_token_0 = cur.read_u64();
        pool.total_fees_claimed_token_0 = cur.read_u64();
        pool.total_fees_token_1 = cur.read_u64();
        pool.total_fees_claimed_token_1 = cur.read_u64();
        pool.fund_fees_token_0 = cur.read_u64();
        pool.fund_fees_token_1 = cur.read_u64();
        pool.open_time = cur.read_u64();
        pool.recent_epoch = cur.read_u64();
        Ok(pool)
    }

    /// Start index and address of the first tick array the swap will touch.
    pub fn first_initialized_tick_array(
        &self,
        zero_for_one: bool,
        extension: &TickArrayBitmapExtension,
    ) -> Result<(i32, Pubkey)> {
        let start_index = get_array_start_index(self.tick_current, self.tick_spacing as i32);

        let is_initialized = if is_overflow_default_tickarray_bitmap(
            self.tick_spacing as i32,
            &[self.tick_current],
        ) {
            check_tick_array_is_init(start_index, self.tick_spacing as i32, extension)
        } else {
            check_tick_array_is_initialized(
                &self.tick_array_bitmap,
                self.tick_current,
                self.tick_spacing as i32,
            )
        };
        if is_initialized {
            let address =
                get_pda_tick_array_address(&RAYDIUM_CLMM_PROGRAM_ID, &self.pool_id, start_index);
            return Ok((start_index, address));
        }

        match next_initialized_tick_array_start_index_utils(
            extension,
            self.tick_current,
            self.tick_spacing as i32,
            &self.tick_array_bitmap,
            zero_for_one,
        )? {
            Some(next_start) => {
                let address =
                    get_pda_tick_array_address(&RAYDIUM_CLMM_PROGRAM_ID, &self.pool_id, next_start);
                Ok((next_start, address))
            }
            None => Err(RouteError::InsufficientLiquidity.into()),
        }
    }

    /// Off-chain replay of the on-chain swap, one initialized tick at a time.
    pub fn swap_compute(
        &self,
        extension: &TickArrayBitmapExtension,
        cache: &BTreeMap<i32, TickArray>,
        zero_for_one: bool,
        amount_specified: i128,
        fee_rate: u32,
        first_tick_array_start: i32,
    ) -> Result<u128> {
        if amount_specified == 0 {
            return Err(RouteError::InvalidInput("input amount cannot be zero").into());
        }
        let base_input = amount_specified > 0;
        let tick_spacing = self.tick_spacing as i32;

        let sqrt_price_limit_x64 = if zero_for_one {
            MIN_SQRT_PRICE_X64 + 1
        } else {
            MAX_SQRT_PRICE_X64 - 1
        };

        let mut remaining = amount_specified;
        let mut calculated: i128 = 0;
        let mut sqrt_price_x64 = self.sqrt_price_x64;
        let mut liquidity = self.liquidity;

        // Clamp the starting tick into the first array's span.
        let mut tick = if self.tick_current > first_tick_array_start {
            if first_tick_array_start + tick_count(tick_spacing) - 1 < self.tick_current {
                first_tick_array_start + tick_count(tick_spacing) - 1
            } else {
                self.tick_current
            }
        } else {
            first_tick_array_start
        };

        let mut tick_array_start = first_tick_array_start;
        let mut tick_array_current = cache
            .get(&tick_array_start)
            .ok_or(RouteError::InsufficientLiquidity)?;
        let mut already_on_start =
            !zero_for_one && tick_array_current.start_tick_index == tick;

        let mut loops = 0;
        while remaining != 0 && sqrt_price_x64 != sqrt_price_limit_x64 {
            loops += 1;
            if loops > 100 {
                return Err(RouteError::Timeout("clmm swap loop").into());
            }

            let sqrt_price_start_x64 = sqrt_price_x64;
            let next_tick = match next_init_tick(
                tick_array_current,
                tick,
                tick_spacing,
                zero_for_one,
                already_on_start,
            ) {
                Some(state) if state.liquidity_gross > 0 => state,
                _ => {
                    let next_start = next_initialized_tick_array_start_index_utils(
                        extension,
                        tick,
                        tick_spacing,
                        &self.tick_array_bitmap,
                        zero_for_one,
                    )?
                    .ok_or(RouteError::InsufficientLiquidity)?;
                    tick_array_start = next_start;
                    tick_array_current = cache
                        .get(&tick_array_start)
                        .ok_or(RouteError::InsufficientLiquidity)?;
                    first_initialized_tick(tick_array_current, zero_for_one)?
                }
            };

            let tick_next = next_tick.tick.clamp(MIN_TICK, MAX_TICK);
            let initialized = next_tick.liquidity_gross > 0;
            let liquidity_net = next_tick.liquidity_net;

            let sqrt_price_next_tick_x64 = sqrt_price_x64_from_tick(tick_next)?;
            let target_price = if (zero_for_one && sqrt_price_next_tick_x64 < sqrt_price_limit_x64)
                || (!zero_for_one && sqrt_price_next_tick_x64 > sqrt_price_limit_x64)
            {
                sqrt_price_limit_x64
            } else {
                sqrt_price_next_tick_x64
            };

            let step = swap_step_compute(
                sqrt_price_x64,
                target_price,
                liquidity,
                remaining,
                fee_rate,
                zero_for_one,
            )?;
            sqrt_price_x64 = step.sqrt_price_next_x64;

            let in_with_fee = step
                .amount_in
                .checked_add(step.fee_amount)
                .ok_or(RouteError::Overflow("swap step totals"))? as i128;
            if base_input {
                remaining -= in_with_fee;
                calculated -= step.amount_out as i128;
            } else {
                remaining += step.amount_out as i128;
                calculated += in_with_fee;
            }

            if sqrt_price_x64 == sqrt_price_next_tick_x64 {
                if initialized {
                    let signed_net = if zero_for_one {
                        -(liquidity_net as i128)
                    } else {
                        liquidity_net as i128
                    };
                    liquidity = liquidity
                        .checked_add_signed(signed_net)
                        .ok_or(RouteError::Overflow("liquidity crossing"))?;
                }
                already_on_start = tick_next != tick
                    && !zero_for_one
                    && tick_array_current.start_tick_index == tick_next;
                tick = if zero_for_one { tick_next - 1 } else { tick_next };
            } else if sqrt_price_x64 != sqrt_price_start_x64 {
                let derived = tick_from_sqrt_price_x64(sqrt_price_x64)?;
                already_on_start = derived != tick
                    && !zero_for_one
                    && tick_array_current.start_tick_index == derived;
                tick = derived;
            }
        }

        Ok(calculated.unsigned_abs())
    }

    /// Pure quote against an already-fetched extension bitmap and tick-array
    /// cache.
    pub fn compute_amount_out(
        &self,
        extension: &TickArrayBitmapExtension,
        cache: &BTreeMap<i32, TickArray>,
        input_mint: Pubkey,
        amount_in: u64,
    ) -> Result<u64> {
        let zero_for_one = input_mint == self.token_mint_0;
        let (first_start, _) = self.first_initialized_tick_array(zero_for_one, extension)?;
        let out = self.swap_compute(
            extension,
            cache,
            zero_for_one,
            amount_in as i128,
            self.fee_rate,
            first_start,
        )?;
        Ok(u64::try_from(out).map_err(|_| RouteError::Overflow("clmm quote"))?)
    }

    async fn fetch_extension(&self, client: &SolClient) -> Result<TickArrayBitmapExtension> {
        let accounts = client
            .get_multiple_accounts(&[self.ex_bitmap_address])
            .await?;
        match accounts.into_iter().next().flatten() {
            Some(account) => TickArrayBitmapExtension::decode(&account.data),
            None => Ok(TickArrayBitmapExtension::default()),
        }
    }

    async fn fetch_tick_arrays(
        &self,
        client: &SolClient,
        extension: &TickArrayBitmapExtension,
    ) -> Result<BTreeMap<i32, TickArray>> {
        let start_indices = initialized_tick_array_range(
            &self.tick_array_bitmap,
            extension,
            self.tick_current,
            self.tick_spacing as i32,
            10,
        );
        let addresses: Vec<Pubkey> = start_indices
            .iter()
            .map(|start| {
                get_pda_tick_array_address(&RAYDIUM_CLMM_PROGRAM_ID, &self.pool_id, *start)
            })
            .collect();
        if addresses.is_empty() {
            return Ok(BTreeMap::new());
        }
        let accounts = client.get_multiple_accounts(&addresses).await?;
        let mut cache = BTreeMap::new();
        for account in accounts.into_iter().flatten() {
            let array = TickArray::decode(&account.data)?;
            cache.insert(array.start_tick_index, array);
        }
        Ok(cache)
    }

    /// The current and next-initialized tick arrays appended to the swap
    /// instruction as remaining accounts.
    fn remaining_tick_arrays(
        &self,
        extension: &TickArrayBitmapExtension,
        input_mint: Pubkey,
    ) -> Result<[Pubkey; 2]> {
        let zero_for_one = input_mint == self.token_mint_0;
        let (_, first_array) = self.first_initialized_tick_array(zero_for_one, extension)?;

        let current_offset = self
            .tick_current
            .div_euclid(tick_count(self.tick_spacing as i32));
        let next_starts = if zero_for_one {
            search_low_bit_from_start(
                &self.tick_array_bitmap,
                extension,
                current_offset - 1,
                1,
                self.tick_spacing as i32,
            )
        } else {
            search_high_bit_from_start(
                &self.tick_array_bitmap,
                extension,
                current_offset + 1,
                1,
                self.tick_spacing as i32,
            )
        };
        let next_start = next_starts
            .first()
            .copied()
            .ok_or(RouteError::InsufficientLiquidity)?;
        let next_array =
            get_pda_tick_array_address(&RAYDIUM_CLMM_PROGRAM_ID, &self.pool_id, next_start);
        if next_array == first_array {
            return Err(RouteError::InvalidInput("next tick array equals the current one").into());
        }
        Ok([first_array, next_array])
    }
}

/// Literal swap discriminator used by the CLMM program.
pub const CLMM_SWAP_DISCRIMINATOR: [u8; 8] = [43, 4, 237, 11, 26, 201, 30, 98];

pub fn clmm_swap_instruction_data(
    amount: u64,
    other_amount_threshold: u64,
    sqrt_price_limit_x64: u128,
    is_base_input: bool,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 8 + 8 + 16 + 1);
    data.extend_from_slice(&CLMM_SWAP_DISCRIMINATOR);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&other_amount_threshold.to_le_bytes());
    data.extend_from_slice(&sqrt_price_limit_x64.to_le_bytes());
    data.push(is_base_input as u8);
    data
}

#[async_trait]
impl Pool for ClmmPool {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::RaydiumClmm
    }

    fn program_id(&self) -> Pubkey {
        RAYDIUM_CLMM_PROGRAM_ID
    }

    fn id(&self) -> Pubkey {
        self.pool_id
    }

    fn token_pair(&self) -> (Pubkey, Pubkey) {
        (self.token_mint_0, self.token_mint_1)
    }

    async fn quote(&self, client: &SolClient, input_mint: Pubkey, amount_in: u64) -> Result<u64> {
        let extension = self.fetch_extension(client).await?;
        let cache = self.fetch_tick_arrays(client, &extension).await?;
        debug!(
            "clmm quote pool={} cached_tick_arrays={}",
            self.pool_id,
            cache.len()
        );
        self.compute_amount_out(&extension, &cache, input_mint, amount_in)
    }

    async fn build_swap_instructions(
        &self,
        client: &SolClient,
        params: &SwapParams,
    ) -> Result<Vec<Instruction>> {
        let zero_for_one = params.input_mint == self.token_mint_0;
        let (input_mint, output_mint) = if zero_for_one {
            (self.token_mint_0, self.token_mint_1)
        } else {
            (self.token_mint_1, self.token_mint_0)
        };

        let extension = self.fetch_extension(client).await?;
        let tick_arrays = self.remaining_tick_arrays(&extension, params.input_mint)?;
        let ex_bitmap =
            get_pda_ex_bitmap_address(&RAYDIUM_CLMM_PROGRAM_ID, &self.pool_id);

        let mut accounts = vec![
            AccountMeta::new_readonly(params.user, true),
            AccountMeta::new_readonly(self.amm_config, false),
            AccountMeta::new(self.pool_id, false),
        ];
        if zero_for_one {
            accounts.push(AccountMeta::new(params.user_base_account, false));
            accounts.push(AccountMeta::new(params.user_quote_account, false));
            accounts.push(AccountMeta::new(self.token_vault_0, false));
            accounts.push(AccountMeta::new(self.token_vault_1, false));
        } else {
            accounts.push(AccountMeta::new(params.user_quote_account, false));
            accounts.push(AccountMeta::new(params.user_base_account, false));
            accounts.push(AccountMeta::new(self.token_vault_1, false));
            accounts.push(AccountMeta::new(self.token_vault_0, false));
        }
        accounts.push(AccountMeta::new(self.observation_key, false));
        accounts.push(AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false));
        accounts.push(AccountMeta::new_readonly(TOKEN_2022_PROGRAM_ID, false));
        accounts.push(AccountMeta::new_readonly(MEMO_PROGRAM_ID, false));
        accounts.push(AccountMeta::new_readonly(input_mint, false));
        accounts.push(AccountMeta::new_readonly(output_mint, false));
        accounts.push(AccountMeta::new(ex_bitmap, false));
        accounts.push(AccountMeta::new(tick_arrays[0], false));
        accounts.push(AccountMeta::new(tick_arrays[1], false));

        Ok(vec![Instruction {
            program_id: RAYDIUM_CLMM_PROGRAM_ID,
            accounts,
            // exact-in: the amount field is always input-denominated
            data: clmm_swap_instruction_data(params.amount_in, params.min_out, 0, true),
        }])
    }
}
