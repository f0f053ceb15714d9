//! PumpAMM: constant-product pool with an optional creator-fee vault that
//! changes the swap account shape.

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

use super::{
    CREATOR_VAULT_SEED, PUMP_EVENT_AUTHORITY, PUMP_GLOBAL_CONFIG, PUMP_PROTOCOL_FEE_RECIPIENT,
    PUMP_PROTOCOL_FEE_RECIPIENT_TOKEN_ACCOUNT, PUMP_SWAP_PROGRAM_ID,
};
use crate::api::{Pool, ProtocolKind, SwapParams};
use crate::constants::{ASSOCIATED_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID, WSOL};
use crate::decode::{token_account_balance, AccountCursor};
use crate::error::RouteError;
use crate::sol::SolClient;
use crate::utils::anchor_discriminator;

/// 1 - 0.00250 scaled by 1e5.
const FEE_MULTIPLIER_NUMERATOR: u128 = 99_750;
const FEE_MULTIPLIER_DENOMINATOR: u128 = 100_000;

#[derive(Debug, Clone, Default)]
pub struct PumpAmmPool {
    pub pool_bump: u8,
    pub index: u16,
    pub creator: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub pool_base_token_account: Pubkey,
    pub pool_quote_token_account: Pubkey,
    pub lp_supply: u64,
    /// Zero when the pool predates creator fees.
    pub coin_creator: Pubkey,

    pub pool_id: Pubkey,
}

impl PumpAmmPool {
    /// Account size used by the discovery scan.
    pub const SPAN: u64 = 300;
    /// Decodable prefix without the trailing creator field.
    pub const MIN_LEN: usize = 211;
    pub const BASE_MINT_OFFSET: usize = 43;
    pub const QUOTE_MINT_OFFSET: usize = Self::BASE_MINT_OFFSET + 32;

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cur = AccountCursor::new("pump amm pool", data, Self::MIN_LEN)?;
        cur.skip(8);
        let mut pool = Self {
            pool_bump: cur.read_u8(),
            index: cur.read_u16(),
            creator: cur.read_pubkey(),
            base_mint: cur.read_pubkey(),
            quote_mint: cur.read_pubkey(),
            lp_mint: cur.read_pubkey(),
            pool_base_token_account: cur.read_pubkey(),
            pool_quote_token_account: cur.read_pubkey(),
            lp_supply: cur.read_u64(),
            ..Self::default()
        };
        if data.len() > Self::MIN_LEN + 32 {
            pool.coin_creator = cur.read_pubkey();
        }
        Ok(pool)
    }

    pub fn has_coin_creator(&self) -> bool {
        self.coin_creator != Pubkey::default()
    }

    pub fn compute_amount_out(
        &self,
        base_reserve: u64,
        quote_reserve: u64,
        input_mint: Pubkey,
        amount_in: u64,
    ) -> Result<u64> {
        let base = base_reserve as u128;
        let quote = quote_reserve as u128;
        let k = base
            .checked_mul(quote)
            .ok_or(RouteError::Overflow("pump amm invariant"))?;
        let amount_with_fee =
            amount_in as u128 * FEE_MULTIPLIER_NUMERATOR / FEE_MULTIPLIER_DENOMINATOR;

        let out = if input_mint == self.base_mint {
            let new_base = base + amount_with_fee;
            quote - k / new_base
        } else {
            let new_quote = quote + amount_with_fee;
            base - k / new_quote
        };
        u64::try_from(out).map_err(|_| RouteError::Overflow("pump amm quote").into())
    }
}

pub fn coin_creator_vault_authority(coin_creator: &Pubkey) -> Result<Pubkey> {
    if *coin_creator == Pubkey::default() {
        return Err(RouteError::InvalidInput("coin creator key is unset").into());
    }
    Ok(Pubkey::find_program_address(
        &[CREATOR_VAULT_SEED, coin_creator.as_ref()],
        &PUMP_SWAP_PROGRAM_ID,
    )
    .0)
}

/// The creator's WSOL fee vault: an ATA owned by the vault authority PDA.
pub fn coin_creator_vault_ata(coin_creator: &Pubkey) -> Result<Pubkey> {
    let authority = coin_creator_vault_authority(coin_creator)?;
    Ok(get_associated_token_address(&authority, &WSOL))
}

fn swap_instruction_data(name: &str, first: u64, second: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&anchor_discriminator("global", name));
    data.extend_from_slice(&first.to_le_bytes());
    data.extend_from_slice(&second.to_le_bytes());
    data
}

impl PumpAmmPool {
    /// 17 fixed accounts, or 19 with the creator-vault pair appended.
    fn swap_accounts(
        &self,
        user: Pubkey,
        user_base_account: Pubkey,
        user_quote_account: Pubkey,
        creator_vault_writable: bool,
    ) -> Result<Vec<AccountMeta>> {
        let mut accounts = vec![
            AccountMeta::new_readonly(self.pool_id, false),
            AccountMeta::new(user, true),
            AccountMeta::new_readonly(PUMP_GLOBAL_CONFIG, false),
            AccountMeta::new_readonly(self.base_mint, false),
            AccountMeta::new_readonly(self.quote_mint, false),
            AccountMeta::new(user_base_account, false),
            AccountMeta::new(user_quote_account, false),
            AccountMeta::new(self.pool_base_token_account, false),
            AccountMeta::new(self.pool_quote_token_account, false),
            AccountMeta::new_readonly(PUMP_PROTOCOL_FEE_RECIPIENT, false),
            AccountMeta::new(PUMP_PROTOCOL_FEE_RECIPIENT_TOKEN_ACCOUNT, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(ASSOCIATED_TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(PUMP_EVENT_AUTHORITY, false),
            AccountMeta::new_readonly(PUMP_SWAP_PROGRAM_ID, false),
        ];
        if self.has_coin_creator() {
            accounts.push(AccountMeta {
                pubkey: coin_creator_vault_ata(&self.coin_creator)?,
                is_signer: false,
                is_writable: creator_vault_writable,
            });
            accounts.push(AccountMeta::new_readonly(
                coin_creator_vault_authority(&self.coin_creator)?,
                false,
            ));
        }
        Ok(accounts)
    }
}

#[async_trait]
impl Pool for PumpAmmPool {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::PumpAmm
    }

    fn program_id(&self) -> Pubkey {
        PUMP_SWAP_PROGRAM_ID
    }

    fn id(&self) -> Pubkey {
        self.pool_id
    }

    fn token_pair(&self) -> (Pubkey, Pubkey) {
        (self.base_mint, self.quote_mint)
    }

    async fn quote(&self, client: &SolClient, input_mint: Pubkey, amount_in: u64) -> Result<u64> {
        let vaults = [self.pool_base_token_account, self.pool_quote_token_account];
        let accounts = client.get_multiple_accounts(&vaults).await?;
        let mut balances = [0u64; 2];
        for (i, (vault, account)) in vaults.iter().zip(accounts).enumerate() {
            let account =
                account.ok_or_else(|| anyhow::anyhow!("vault account {vault} not found"))?;
            balances[i] = token_account_balance("pump amm vault", &account.data)?;
        }
        self.compute_amount_out(balances[0], balances[1], input_mint, amount_in)
    }

    async fn build_swap_instructions(
        &self,
        _client: &SolClient,
        params: &SwapParams,
    ) -> Result<Vec<Instruction>> {
        // Base-side input funds a buy; quote-side input a sell. The two
        // instructions flip which amount is exact.
        let (data, creator_vault_writable) = if params.input_mint == self.base_mint {
            (
                swap_instruction_data("buy", params.min_out, params.amount_in),
                true,
            )
        } else {
            (
                swap_instruction_data("sell", params.amount_in, params.min_out),
                false,
            )
        };
        let accounts = self.swap_accounts(
            params.user,
            params.user_base_account,
            params.user_quote_account,
            creator_vault_writable,
        )?;
        Ok(vec![Instruction {
            program_id: PUMP_SWAP_PROGRAM_ID,
            accounts,
            data,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with_creator(coin_creator: Pubkey) -> PumpAmmPool {
        PumpAmmPool {
            base_mint: Pubkey::new_unique(),
            quote_mint: Pubkey::new_unique(),
            pool_base_token_account: Pubkey::new_unique(),
            pool_quote_token_account: Pubkey::new_unique(),
            coin_creator,
            pool_id: Pubkey::new_unique(),
            ..PumpAmmPool::default()
        }
    }

    #[test]
    fn decode_handles_both_account_shapes() {
        let mut data = vec![0u8; 300];
        let base_mint = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        data[PumpAmmPool::BASE_MINT_OFFSET..PumpAmmPool::BASE_MINT_OFFSET + 32]
            .copy_from_slice(base_mint.as_ref());
        data[211..243].copy_from_slice(creator.as_ref());
        let pool = PumpAmmPool::decode(&data).unwrap();
        assert_eq!(pool.base_mint, base_mint);
        assert_eq!(pool.coin_creator, creator);

        // legacy shape: nothing after lp_supply
        let pool = PumpAmmPool::decode(&data[..211]).unwrap();
        assert_eq!(pool.coin_creator, Pubkey::default());
        assert!(!pool.has_coin_creator());

        assert!(PumpAmmPool::decode(&data[..200]).is_err());
    }

    #[test]
    fn quote_applies_the_multiplicative_fee() {
        let pool = pool_with_creator(Pubkey::default());
        // k = 1e9 * 2e9; in 1e6 * 0.9975 = 997_500
        // out = 2e9 - floor(k / (1e9 + 997_500)) = 1_993_012
        let out = pool
            .compute_amount_out(1_000_000_000, 2_000_000_000, pool.base_mint, 1_000_000)
            .unwrap();
        assert_eq!(out, 1_993_012);
        let reverse = pool
            .compute_amount_out(1_000_000_000, 2_000_000_000, pool.quote_mint, 1_000_000)
            .unwrap();
        assert!(reverse < out);
    }

    #[test]
    fn buy_without_creator_has_seventeen_accounts() {
        let pool = pool_with_creator(Pubkey::default());
        let accounts = pool
            .swap_accounts(Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique(), true)
            .unwrap();
        assert_eq!(accounts.len(), 17);
        assert_eq!(accounts[16].pubkey, PUMP_SWAP_PROGRAM_ID);
    }

    #[test]
    fn buy_with_creator_appends_vault_ata_and_authority() {
        let coin_creator = Pubkey::new_unique();
        let pool = pool_with_creator(coin_creator);
        let accounts = pool
            .swap_accounts(Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique(), true)
            .unwrap();
        assert_eq!(accounts.len(), 19);

        let authority = coin_creator_vault_authority(&coin_creator).unwrap();
        let ata = get_associated_token_address(&authority, &WSOL);
        assert_eq!(accounts[17].pubkey, ata);
        assert!(accounts[17].is_writable);
        assert_eq!(accounts[18].pubkey, authority);
        assert!(!accounts[18].is_writable);
    }

    #[test]
    fn buy_and_sell_discriminators_differ() {
        let buy = swap_instruction_data("buy", 1, 2);
        let sell = swap_instruction_data("sell", 1, 2);
        assert_ne!(&buy[0..8], &sell[0..8]);
        assert_eq!(&buy[0..8], &anchor_discriminator("global", "buy"));
        assert_eq!(&sell[0..8], &anchor_discriminator("global", "sell"));
    }
}
