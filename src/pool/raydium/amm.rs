//! Raydium AMM-v4: constant-product pool with a serum order-book attachment.

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use super::{constant_product_out, RAYDIUM_AMM_PROGRAM_ID};
use crate::api::{Pool, ProtocolKind, SwapParams};
use crate::constants::TOKEN_PROGRAM_ID;
use crate::decode::{token_account_balance, AccountCursor};
use crate::error::RouteError;
use crate::sol::SolClient;

/// Full 752-byte AMM-v4 pool state, plus the market-side keys attached at
/// discovery time.
#[derive(Debug, Clone, Default)]
pub struct AmmV4Pool {
    // status and configuration
    pub status: u64,
    pub nonce: u64,
    pub max_order: u64,
    pub depth: u64,
    pub base_decimal: u64,
    pub quote_decimal: u64,
    pub state: u64,
    pub reset_flag: u64,
    pub min_size: u64,
    pub vol_max_cut_ratio: u64,
    pub amount_wave_ratio: u64,
    pub base_lot_size: u64,
    pub quote_lot_size: u64,
    pub min_price_multiplier: u64,
    pub max_price_multiplier: u64,
    pub system_decimal_value: u64,
    pub min_separate_numerator: u64,
    pub min_separate_denominator: u64,
    pub trade_fee_numerator: u64,
    pub trade_fee_denominator: u64,
    pub pnl_numerator: u64,
    pub pnl_denominator: u64,
    pub swap_fee_numerator: u64,
    pub swap_fee_denominator: u64,

    // state and PnL tracking
    pub base_need_take_pnl: u64,
    pub quote_need_take_pnl: u64,
    pub quote_total_pnl: u64,
    pub base_total_pnl: u64,
    pub pool_open_time: u64,
    pub punish_pc_amount: u64,
    pub punish_coin_amount: u64,
    pub orderbook_to_init_time: u64,

    // swap counters
    pub swap_base_in_amount: u128,
    pub swap_quote_out_amount: u128,
    pub swap_base2_quote_fee: u64,
    pub swap_quote_in_amount: u128,
    pub swap_base_out_amount: u128,
    pub swap_quote2_base_fee: u64,

    // accounts
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub open_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program_id: Pubkey,
    pub target_orders: Pubkey,
    pub withdraw_queue: Pubkey,
    pub lp_vault: Pubkey,
    pub owner: Pubkey,
    pub lp_reserve: u64,
    pub padding: [u64; 3],

    // attached at discovery
    pub pool_id: Pubkey,
    pub authority: Pubkey,
    pub market_authority: Pubkey,
    pub market_bids: Pubkey,
    pub market_asks: Pubkey,
    pub market_event_queue: Pubkey,
    pub market_base_vault: Pubkey,
    pub market_quote_vault: Pubkey,
}

impl AmmV4Pool {
    pub const SPAN: u64 = 752;
    pub const BASE_MINT_OFFSET: usize = 400;
    pub const QUOTE_MINT_OFFSET: usize = 432;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("amm v4 pool", data, Self::SPAN as usize)?;
        let mut pool = Self {
            status: cur.read_u64(),
            nonce: cur.read_u64(),
            max_order: cur.read_u64(),
            depth: cur.read_u64(),
            base_decimal: cur.read_u64(),
            quote_decimal: cur.read_u64(),
            state: cur.read_u64(),
            reset_flag: cur.read_u64(),
            min_size: cur.read_u64(),
            vol_max_cut_ratio: cur.read_u64(),
            amount_wave_ratio: cur.read_u64(),
            base_lot_size: cur.read_u64(),
            quote_lot_size: cur.read_u64(),
            min_price_multiplier: cur.read_u64(),
            max_price_multiplier: cur.read_u64(),
            system_decimal_value: cur.read_u64(),
            min_separate_numerator: cur.read_u64(),
            min_separate_denominator: cur.read_u64(),
            trade_fee_numerator: cur.read_u64(),
            trade_fee_denominator: cur.read_u64(),
            pnl_numerator: cur.read_u64(),
            pnl_denominator: cur.read_u64(),
            swap_fee_numerator: cur.read_u64(),
            swap_fee_denominator: cur.read_u64(),
            base_need_take_pnl: cur.read_u64(),
            quote_need_take_pnl: cur.read_u64(),
            quote_total_pnl: cur.read_u64(),
            base_total_pnl: cur.read_u64(),
            pool_open_time: cur.read_u64(),
            punish_pc_amount: cur.read_u64(),
            punish_coin_amount: cur.read_u64(),
            orderbook_to_init_time: cur.read_u64(),
            swap_base_in_amount: cur.read_u128(),
            swap_quote_out_amount: cur.read_u128(),
            swap_base2_quote_fee: cur.read_u64(),
            swap_quote_in_amount: cur.read_u128(),
            swap_base_out_amount: cur.read_u128(),
            swap_quote2_base_fee: cur.read_u64(),
            base_vault: cur.read_pubkey(),
            quote_vault: cur.read_pubkey(),
            base_mint: cur.read_pubkey(),
            quote_mint: cur.read_pubkey(),
            lp_mint: cur.read_pubkey(),
            open_orders: cur.read_pubkey(),
            market_id: cur.read_pubkey(),
            market_program_id: cur.read_pubkey(),
            target_orders: cur.read_pubkey(),
            withdraw_queue: cur.read_pubkey(),
            lp_vault: cur.read_pubkey(),
            owner: cur.read_pubkey(),
            lp_reserve: cur.read_u64(),
            ..Self::default()
        };
        for slot in pool.padding.iter_mut() {
            *slot = cur.read_u64();
        }
        Ok(pool)
    }

    /// Effective reserves: vault balances minus the PnL that still has to be
    /// taken out of the pool.
    fn effective_reserves(&self, base_balance: u64, quote_balance: u64) -> (u128, u128) {
        let base = (base_balance as u128).saturating_sub(self.base_need_take_pnl as u128);
        let quote = (quote_balance as u128).saturating_sub(self.quote_need_take_pnl as u128);
        (base, quote)
    }

    pub fn compute_amount_out(
        &self,
        base_balance: u64,
        quote_balance: u64,
        input_mint: Pubkey,
        amount_in: u64,
    ) -> Result<u64> {
        let (base_reserve, quote_reserve) = self.effective_reserves(base_balance, quote_balance);
        let (reserve_in, reserve_out) = if input_mint == self.quote_mint {
            (quote_reserve, base_reserve)
        } else {
            (base_reserve, quote_reserve)
        };
        constant_product_out(reserve_in, reserve_out, amount_in)
    }
}

/// Serum market state v3, 388 bytes.
#[derive(Debug, Clone, Default)]
pub struct MarketStateV3 {
    pub own_address: Pubkey,
    pub vault_signer_nonce: u64,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub base_deposits_total: u64,
    pub base_fees_accrued: u64,
    pub quote_vault: Pubkey,
    pub quote_deposits_total: u64,
    pub quote_fees_accrued: u64,
    pub quote_dust_threshold: u64,
    pub request_queue: Pubkey,
    pub event_queue: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub base_lot_size: u64,
    pub quote_lot_size: u64,
    pub fee_rate_bps: u64,
    pub referrer_rebates_accrued: u64,
}

impl MarketStateV3 {
    pub const SPAN: u64 = 388;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("serum market", data, Self::SPAN as usize)?;
        cur.skip(13); // 5-byte header + 8-byte account flags
        Ok(Self {
            own_address: cur.read_pubkey(),
            vault_signer_nonce: cur.read_u64(),
            base_mint: cur.read_pubkey(),
            quote_mint: cur.read_pubkey(),
            base_vault: cur.read_pubkey(),
            base_deposits_total: cur.read_u64(),
            base_fees_accrued: cur.read_u64(),
            quote_vault: cur.read_pubkey(),
            quote_deposits_total: cur.read_u64(),
            quote_fees_accrued: cur.read_u64(),
            quote_dust_threshold: cur.read_u64(),
            request_queue: cur.read_pubkey(),
            event_queue: cur.read_pubkey(),
            bids: cur.read_pubkey(),
            asks: cur.read_pubkey(),
            base_lot_size: cur.read_u64(),
            quote_lot_size: cur.read_u64(),
            fee_rate_bps: cur.read_u64(),
            referrer_rebates_accrued: cur.read_u64(),
        })
    }
}

/// The serum vault-signer address is not a find_program_address PDA: the
/// nonce counts up from zero until create_program_address yields an
/// off-curve key.
pub fn get_associated_authority(market_program: &Pubkey, market_id: &Pubkey) -> Result<Pubkey> {
    for nonce in 0u8..100 {
        let seeds: &[&[u8]] = &[market_id.as_ref(), &[nonce], &[0u8; 7]];
        if let Ok(address) = Pubkey::create_program_address(seeds, market_program) {
            return Ok(address);
        }
    }
    Err(RouteError::Timeout("market authority nonce search").into())
}

struct AmmV4SwapAccounts {
    pool: Pubkey,
    authority: Pubkey,
    open_orders: Pubkey,
    target_orders: Pubkey,
    base_vault: Pubkey,
    quote_vault: Pubkey,
    market_program: Pubkey,
    market: Pubkey,
    market_bids: Pubkey,
    market_asks: Pubkey,
    market_event_queue: Pubkey,
    market_base_vault: Pubkey,
    market_quote_vault: Pubkey,
    market_authority: Pubkey,
    user_source: Pubkey,
    user_destination: Pubkey,
    user: Pubkey,
}

impl From<AmmV4SwapAccounts> for Vec<AccountMeta> {
    fn from(accounts: AmmV4SwapAccounts) -> Self {
        vec![
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new(accounts.pool, false),
            AccountMeta::new_readonly(accounts.authority, false),
            AccountMeta::new(accounts.open_orders, false),
            AccountMeta::new(accounts.target_orders, false),
            AccountMeta::new(accounts.base_vault, false),
            AccountMeta::new(accounts.quote_vault, false),
            AccountMeta::new_readonly(accounts.market_program, false),
            AccountMeta::new(accounts.market, false),
            AccountMeta::new(accounts.market_bids, false),
            AccountMeta::new(accounts.market_asks, false),
            AccountMeta::new(accounts.market_event_queue, false),
            AccountMeta::new(accounts.market_base_vault, false),
            AccountMeta::new(accounts.market_quote_vault, false),
            AccountMeta::new_readonly(accounts.market_authority, false),
            AccountMeta::new(accounts.user_source, false),
            AccountMeta::new(accounts.user_destination, false),
            AccountMeta::new(accounts.user, true),
        ]
    }
}

/// Opcode 9 followed by amount_in and min_out, both little-endian u64.
pub fn swap_instruction_data(amount_in: u64, min_out: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(17);
    data.push(9u8);
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_out.to_le_bytes());
    data
}

#[async_trait]
impl Pool for AmmV4Pool {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::RaydiumAmm
    }

    fn program_id(&self) -> Pubkey {
        RAYDIUM_AMM_PROGRAM_ID
    }

    fn id(&self) -> Pubkey {
        self.pool_id
    }

    fn token_pair(&self) -> (Pubkey, Pubkey) {
        (self.base_mint, self.quote_mint)
    }

    async fn quote(&self, client: &SolClient, input_mint: Pubkey, amount_in: u64) -> Result<u64> {
        let vaults = [self.base_vault, self.quote_vault];
        let accounts = client.get_multiple_accounts(&vaults).await?;
        let mut base_balance = 0u64;
        let mut quote_balance = 0u64;
        for (vault, account) in vaults.iter().zip(accounts) {
            let account = account
                .ok_or_else(|| anyhow::anyhow!("vault account {vault} not found"))?;
            let balance = token_account_balance("amm v4 vault", &account.data)?;
            if *vault == self.base_vault {
                base_balance = balance;
            } else {
                quote_balance = balance;
            }
        }
        self.compute_amount_out(base_balance, quote_balance, input_mint, amount_in)
    }

    async fn build_swap_instructions(
        &self,
        _client: &SolClient,
        params: &SwapParams,
    ) -> Result<Vec<Instruction>> {
        let (user_source, user_destination) = if params.input_mint == self.base_mint {
            (params.user_base_account, params.user_quote_account)
        } else {
            (params.user_quote_account, params.user_base_account)
        };

        let accounts: Vec<AccountMeta> = AmmV4SwapAccounts {
            pool: self.pool_id,
            authority: self.authority,
            open_orders: self.open_orders,
            target_orders: self.target_orders,
            base_vault: self.base_vault,
            quote_vault: self.quote_vault,
            market_program: self.market_program_id,
            market: self.market_id,
            market_bids: self.market_bids,
            market_asks: self.market_asks,
            market_event_queue: self.market_event_queue,
            market_base_vault: self.market_base_vault,
            market_quote_vault: self.market_quote_vault,
            market_authority: self.market_authority,
            user_source,
            user_destination,
            user: params.user,
        }
        .into();

        Ok(vec![Instruction {
            program_id: RAYDIUM_AMM_PROGRAM_ID,
            accounts,
            data: swap_instruction_data(params.amount_in, params.min_out),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_bytes() -> Vec<u8> {
        let mut data = vec![0u8; AmmV4Pool::SPAN as usize];
        data[0..8].copy_from_slice(&6u64.to_le_bytes()); // status
        data[192..200].copy_from_slice(&111u64.to_le_bytes()); // base_need_take_pnl
        data[200..208].copy_from_slice(&222u64.to_le_bytes()); // quote_need_take_pnl
        data
    }

    #[test]
    fn decode_rejects_short_accounts() {
        assert!(AmmV4Pool::decode(&[0u8; 751]).is_err());
    }

    #[test]
    fn mint_offsets_match_the_decoder() {
        let base_mint = Pubkey::new_unique();
        let quote_mint = Pubkey::new_unique();
        let mut data = pool_bytes();
        data[AmmV4Pool::BASE_MINT_OFFSET..AmmV4Pool::BASE_MINT_OFFSET + 32]
            .copy_from_slice(base_mint.as_ref());
        data[AmmV4Pool::QUOTE_MINT_OFFSET..AmmV4Pool::QUOTE_MINT_OFFSET + 32]
            .copy_from_slice(quote_mint.as_ref());
        let pool = AmmV4Pool::decode(&data).unwrap();
        assert_eq!(pool.base_mint, base_mint);
        assert_eq!(pool.quote_mint, quote_mint);
        assert_eq!(pool.status, 6);
        assert_eq!(pool.base_need_take_pnl, 111);
        assert_eq!(pool.quote_need_take_pnl, 222);
    }

    #[test]
    fn quote_subtracts_pending_pnl_from_reserves() {
        let mut pool = AmmV4Pool::decode(&pool_bytes()).unwrap();
        pool.base_mint = Pubkey::new_unique();
        pool.quote_mint = Pubkey::new_unique();
        // balances chosen so effective reserves land on the reference values
        let out = pool
            .compute_amount_out(1_000_000_111, 2_000_000_222, pool.base_mint, 1_000_000)
            .unwrap();
        assert_eq!(out, 1_992_007);
    }

    #[test]
    fn quote_direction_follows_input_mint() {
        let mut pool = AmmV4Pool::default();
        pool.base_mint = Pubkey::new_unique();
        pool.quote_mint = Pubkey::new_unique();
        let base_in = pool
            .compute_amount_out(1_000_000_000, 2_000_000_000, pool.base_mint, 1_000_000)
            .unwrap();
        let quote_in = pool
            .compute_amount_out(1_000_000_000, 2_000_000_000, pool.quote_mint, 1_000_000)
            .unwrap();
        assert_eq!(base_in, 1_992_007);
        assert!(quote_in < base_in);
    }

    #[test]
    fn swap_instruction_layout_is_opcode_9_plus_two_u64() {
        let data = swap_instruction_data(7, 3);
        assert_eq!(data.len(), 17);
        assert_eq!(data[0], 9);
        assert_eq!(u64::from_le_bytes(data[1..9].try_into().unwrap()), 7);
        assert_eq!(u64::from_le_bytes(data[9..17].try_into().unwrap()), 3);
    }

    #[test]
    fn swap_account_order_matches_the_program() {
        let accounts: Vec<AccountMeta> = AmmV4SwapAccounts {
            pool: Pubkey::new_unique(),
            authority: Pubkey::new_unique(),
            open_orders: Pubkey::new_unique(),
            target_orders: Pubkey::new_unique(),
            base_vault: Pubkey::new_unique(),
            quote_vault: Pubkey::new_unique(),
            market_program: Pubkey::new_unique(),
            market: Pubkey::new_unique(),
            market_bids: Pubkey::new_unique(),
            market_asks: Pubkey::new_unique(),
            market_event_queue: Pubkey::new_unique(),
            market_base_vault: Pubkey::new_unique(),
            market_quote_vault: Pubkey::new_unique(),
            market_authority: Pubkey::new_unique(),
            user_source: Pubkey::new_unique(),
            user_destination: Pubkey::new_unique(),
            user: Pubkey::new_unique(),
        }
        .into();
        assert_eq!(accounts.len(), 18);
        assert_eq!(accounts[0].pubkey, TOKEN_PROGRAM_ID);
        assert!(!accounts[0].is_writable);
        assert!(accounts[17].is_signer);
        assert!(accounts[1].is_writable && accounts[5].is_writable);
        assert!(!accounts[2].is_writable && !accounts[14].is_writable);
    }
}
