use anyhow::{Context, Result};
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_client::rpc_response::RpcSimulateTransactionResult;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use super::rate_limiter::RateLimiter;

/// Rate-limited async RPC wrapper. Every method takes a token from the
/// shared limiter before hitting the wire; all reads use `processed`
/// commitment.
pub struct SolClient {
    rpc: RpcClient,
    rate_limiter: RateLimiter,
}

impl SolClient {
    pub fn new(endpoint: &str, requests_per_second: u32) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(
                endpoint.to_string(),
                CommitmentConfig::processed(),
            ),
            rate_limiter: RateLimiter::new(requests_per_second),
        }
    }

    pub async fn get_account(&self, pubkey: &Pubkey) -> Result<Account> {
        self.rate_limiter.acquire().await;
        self.rpc
            .get_account(pubkey)
            .await
            .with_context(|| format!("get_account {pubkey}"))
    }

    pub async fn get_multiple_accounts(&self, pubkeys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        self.rate_limiter.acquire().await;
        self.rpc
            .get_multiple_accounts(pubkeys)
            .await
            .context("get_multiple_accounts")
    }

    /// Program-account scan with data-size and memcmp filters, base64
    /// account encoding.
    pub async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<(Pubkey, Account)>> {
        self.rate_limiter.acquire().await;
        let config = RpcProgramAccountsConfig {
            filters: Some(filters),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig::processed()),
                ..RpcAccountInfoConfig::default()
            },
            ..RpcProgramAccountsConfig::default()
        };
        self.rpc
            .get_program_accounts_with_config(program_id, config)
            .await
            .with_context(|| format!("get_program_accounts {program_id}"))
    }

    pub async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.rate_limiter.acquire().await;
        self.rpc
            .get_latest_blockhash()
            .await
            .context("get_latest_blockhash")
    }

    pub async fn simulate_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<RpcSimulateTransactionResult> {
        self.rate_limiter.acquire().await;
        let response = self
            .rpc
            .simulate_transaction(transaction)
            .await
            .context("simulate_transaction")?;
        Ok(response.value)
    }

    pub async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        self.rate_limiter.acquire().await;
        self.rpc
            .send_transaction(transaction)
            .await
            .context("send_transaction")
    }
}

/// Builds the canonical (data-size, base-mint, quote-mint) discovery filter
/// set used by every protocol scan.
pub fn pool_scan_filters(
    data_size: u64,
    base_mint_offset: usize,
    base_mint: &Pubkey,
    quote_mint_offset: usize,
    quote_mint: &Pubkey,
) -> Vec<RpcFilterType> {
    vec![
        RpcFilterType::DataSize(data_size),
        RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
            base_mint_offset,
            base_mint.to_bytes().to_vec(),
        )),
        RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
            quote_mint_offset,
            quote_mint.to_bytes().to_vec(),
        )),
    ]
}
