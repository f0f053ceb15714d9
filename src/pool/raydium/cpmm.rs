//! Raydium CPMM: plain constant-product pool, no order book.

use anchor_lang::{AnchorDeserialize, AnchorSerialize};
use anyhow::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use super::{constant_product_out, CPMM_AUTH_SEED, RAYDIUM_CPMM_PROGRAM_ID};
use crate::api::{Pool, ProtocolKind, SwapParams};
use crate::constants::TOKEN_PROGRAM_ID;
use crate::decode::token_account_balance;
use crate::error::RouteError;
use crate::sol::SolClient;
use crate::utils::anchor_discriminator;

lazy_static! {
    /// Shared vault/LP-mint authority PDA.
    pub static ref CPMM_AUTHORITY: Pubkey =
        Pubkey::find_program_address(&[CPMM_AUTH_SEED], &RAYDIUM_CPMM_PROGRAM_ID).0;
}

/// Borsh-shaped CPMM pool state (anchor account, 637 bytes on chain
/// including the discriminator).
#[derive(AnchorDeserialize, AnchorSerialize, Clone, Debug, Default)]
pub struct CpmmPoolState {
    pub amm_config: Pubkey,
    pub pool_creator: Pubkey,
    pub token0_vault: Pubkey,
    pub token1_vault: Pubkey,
    pub lp_mint: Pubkey,
    pub token0_mint: Pubkey,
    pub token1_mint: Pubkey,
    pub token0_program: Pubkey,
    pub token1_program: Pubkey,
    pub observation_key: Pubkey,
    pub auth_bump: u8,
    pub status: u8,
    pub lp_mint_decimals: u8,
    pub mint0_decimals: u8,
    pub mint1_decimals: u8,
    pub lp_supply: u64,
    pub protocol_fees_token0: u64,
    pub protocol_fees_token1: u64,
    pub fund_fees_token0: u64,
    pub fund_fees_token1: u64,
    pub open_time: u64,
    pub recent_epoch: u64,
    pub padding: [u64; 31],
}

#[derive(Debug, Clone, Default)]
pub struct CpmmPool {
    pub state: CpmmPoolState,
    pub pool_id: Pubkey,
}

impl CpmmPool {
    /// On-chain account size used by the discovery scan.
    pub const SPAN: u64 = 637;
    pub const TOKEN0_MINT_OFFSET: usize = 8 + 32 * 5;
    pub const TOKEN1_MINT_OFFSET: usize = 8 + 32 * 6;

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(RouteError::Decode {
                context: "cpmm pool",
                expected: 8,
                got: data.len(),
            }
            .into());
        }
        let state = CpmmPoolState::deserialize(&mut &data[8..])?;
        Ok(Self {
            state,
            pool_id: Pubkey::default(),
        })
    }

    pub fn compute_amount_out(
        &self,
        vault0_balance: u64,
        vault1_balance: u64,
        input_mint: Pubkey,
        amount_in: u64,
    ) -> Result<u64> {
        let (reserve_in, reserve_out) = if input_mint == self.state.token1_mint {
            (vault1_balance as u128, vault0_balance as u128)
        } else {
            (vault0_balance as u128, vault1_balance as u128)
        };
        constant_product_out(reserve_in, reserve_out, amount_in)
    }
}

struct CpmmSwapAccounts {
    payer: Pubkey,
    amm_config: Pubkey,
    pool: Pubkey,
    user_in: Pubkey,
    user_out: Pubkey,
    vault_in: Pubkey,
    vault_out: Pubkey,
    mint_in: Pubkey,
    mint_out: Pubkey,
    observation: Pubkey,
}

impl From<CpmmSwapAccounts> for Vec<AccountMeta> {
    fn from(accounts: CpmmSwapAccounts) -> Self {
        vec![
            AccountMeta::new(accounts.payer, true),
            AccountMeta::new_readonly(*CPMM_AUTHORITY, false),
            AccountMeta::new_readonly(accounts.amm_config, false),
            AccountMeta::new(accounts.pool, false),
            AccountMeta::new(accounts.user_in, false),
            AccountMeta::new(accounts.user_out, false),
            AccountMeta::new(accounts.vault_in, false),
            AccountMeta::new(accounts.vault_out, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(accounts.mint_in, false),
            AccountMeta::new_readonly(accounts.mint_out, false),
            AccountMeta::new(accounts.observation, false),
        ]
    }
}

pub fn swap_base_input_data(amount_in: u64, min_out: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&anchor_discriminator("global", "swap_base_input"));
    data.extend_from_slice(&amount_in.to_le_bytes());
    data.extend_from_slice(&min_out.to_le_bytes());
    data
}

#[async_trait]
impl Pool for CpmmPool {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::RaydiumCpmm
    }

    fn program_id(&self) -> Pubkey {
        RAYDIUM_CPMM_PROGRAM_ID
    }

    fn id(&self) -> Pubkey {
        self.pool_id
    }

    fn token_pair(&self) -> (Pubkey, Pubkey) {
        (self.state.token0_mint, self.state.token1_mint)
    }

    async fn quote(&self, client: &SolClient, input_mint: Pubkey, amount_in: u64) -> Result<u64> {
        let vaults = [self.state.token0_vault, self.state.token1_vault];
        let accounts = client.get_multiple_accounts(&vaults).await?;
        let mut balances = [0u64; 2];
        for (i, (vault, account)) in vaults.iter().zip(accounts).enumerate() {
            let account =
                account.ok_or_else(|| anyhow::anyhow!("vault account {vault} not found"))?;
            balances[i] = token_account_balance("cpmm vault", &account.data)?;
        }
        self.compute_amount_out(balances[0], balances[1], input_mint, amount_in)
    }

    async fn build_swap_instructions(
        &self,
        _client: &SolClient,
        params: &SwapParams,
    ) -> Result<Vec<Instruction>> {
        let zero_in = params.input_mint != self.state.token1_mint;
        let (user_in, user_out) = if zero_in {
            (params.user_base_account, params.user_quote_account)
        } else {
            (params.user_quote_account, params.user_base_account)
        };
        let (vault_in, vault_out, mint_in, mint_out) = if zero_in {
            (
                self.state.token0_vault,
                self.state.token1_vault,
                self.state.token0_mint,
                self.state.token1_mint,
            )
        } else {
            (
                self.state.token1_vault,
                self.state.token0_vault,
                self.state.token1_mint,
                self.state.token0_mint,
            )
        };

        let accounts: Vec<AccountMeta> = CpmmSwapAccounts {
            payer: params.user,
            amm_config: self.state.amm_config,
            pool: self.pool_id,
            user_in,
            user_out,
            vault_in,
            vault_out,
            mint_in,
            mint_out,
            observation: self.state.observation_key,
        }
        .into();

        Ok(vec![Instruction {
            program_id: RAYDIUM_CPMM_PROGRAM_ID,
            accounts,
            data: swap_base_input_data(params.amount_in, params.min_out),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_pool(token0: Pubkey, token1: Pubkey) -> Vec<u8> {
        let state = CpmmPoolState {
            token0_mint: token0,
            token1_mint: token1,
            ..CpmmPoolState::default()
        };
        let mut data = vec![0u8; 8];
        AnchorSerialize::serialize(&state, &mut data).unwrap();
        data
    }

    #[test]
    fn mint_offsets_match_the_borsh_layout() {
        let token0 = Pubkey::new_unique();
        let token1 = Pubkey::new_unique();
        let data = encoded_pool(token0, token1);
        assert_eq!(
            &data[CpmmPool::TOKEN0_MINT_OFFSET..CpmmPool::TOKEN0_MINT_OFFSET + 32],
            token0.as_ref()
        );
        assert_eq!(
            &data[CpmmPool::TOKEN1_MINT_OFFSET..CpmmPool::TOKEN1_MINT_OFFSET + 32],
            token1.as_ref()
        );
        let pool = CpmmPool::decode(&data).unwrap();
        assert_eq!(pool.state.token0_mint, token0);
        assert_eq!(pool.state.token1_mint, token1);
    }

    #[test]
    fn quote_matches_the_shared_constant_product() {
        let pool = CpmmPool {
            state: CpmmPoolState {
                token0_mint: Pubkey::new_unique(),
                token1_mint: Pubkey::new_unique(),
                ..CpmmPoolState::default()
            },
            pool_id: Pubkey::new_unique(),
        };
        let out = pool
            .compute_amount_out(
                1_000_000_000,
                2_000_000_000,
                pool.state.token0_mint,
                1_000_000,
            )
            .unwrap();
        assert_eq!(out, 1_992_007);
    }

    #[test]
    fn swap_data_uses_the_anchor_discriminator() {
        let data = swap_base_input_data(5, 1);
        assert_eq!(&data[0..8], &[143, 190, 90, 218, 196, 30, 51, 222]);
        assert_eq!(u64::from_le_bytes(data[8..16].try_into().unwrap()), 5);
        assert_eq!(u64::from_le_bytes(data[16..24].try_into().unwrap()), 1);
    }

    #[test]
    fn swap_accounts_have_thirteen_slots() {
        let accounts: Vec<AccountMeta> = CpmmSwapAccounts {
            payer: Pubkey::new_unique(),
            amm_config: Pubkey::new_unique(),
            pool: Pubkey::new_unique(),
            user_in: Pubkey::new_unique(),
            user_out: Pubkey::new_unique(),
            vault_in: Pubkey::new_unique(),
            vault_out: Pubkey::new_unique(),
            mint_in: Pubkey::new_unique(),
            mint_out: Pubkey::new_unique(),
            observation: Pubkey::new_unique(),
        }
        .into();
        assert_eq!(accounts.len(), 13);
        assert!(accounts[0].is_signer && accounts[0].is_writable);
        assert_eq!(accounts[1].pubkey, *CPMM_AUTHORITY);
        assert_eq!(accounts[8].pubkey, TOKEN_PROGRAM_ID);
        assert!(accounts[12].is_writable);
    }
}
