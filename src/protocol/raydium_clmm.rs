use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::api::{Pool, Protocol, ProtocolKind};
use crate::pool::raydium::clmm::{ClmmAmmConfig, ClmmPool};
use crate::pool::raydium::tick_array::get_pda_ex_bitmap_address;
use crate::pool::raydium::RAYDIUM_CLMM_PROGRAM_ID;
use crate::sol::{pool_scan_filters, SolClient};

pub struct RaydiumClmmProtocol {
    client: Arc<SolClient>,
}

impl RaydiumClmmProtocol {
    pub fn new(client: Arc<SolClient>) -> Self {
        Self { client }
    }

    /// Attaches the fee rate from the pool's amm-config account and the
    /// extension-bitmap PDA.
    async fn attach_config(&self, pool: &mut ClmmPool) -> Result<()> {
        let config_account = self
            .client
            .get_account(&pool.amm_config)
            .await
            .context("clmm amm config account")?;
        let config = ClmmAmmConfig::decode(&config_account.data)?;
        pool.fee_rate = config.trade_fee_rate;
        pool.ex_bitmap_address =
            get_pda_ex_bitmap_address(&RAYDIUM_CLMM_PROGRAM_ID, &pool.pool_id);
        Ok(())
    }
}

#[async_trait]
impl Protocol for RaydiumClmmProtocol {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::RaydiumClmm
    }

    async fn fetch_pools_by_pair(
        &self,
        base_mint: Pubkey,
        quote_mint: Pubkey,
    ) -> Result<Vec<Arc<dyn Pool>>> {
        let filters = pool_scan_filters(
            ClmmPool::SPAN,
            ClmmPool::TOKEN_MINT_0_OFFSET,
            &base_mint,
            ClmmPool::TOKEN_MINT_1_OFFSET,
            &quote_mint,
        );
        let accounts = self
            .client
            .get_program_accounts(&RAYDIUM_CLMM_PROGRAM_ID, filters)
            .await?;

        let mut pools: Vec<Arc<dyn Pool>> = Vec::new();
        for (pubkey, account) in accounts {
            let Ok(mut pool) = ClmmPool::decode(&account.data) else {
                continue;
            };
            pool.pool_id = pubkey;
            if self.attach_config(&mut pool).await.is_err() {
                // a pool without a readable fee config cannot be quoted
                continue;
            }
            pools.push(Arc::new(pool));
        }
        Ok(pools)
    }

    async fn fetch_pool_by_id(&self, pool_id: Pubkey) -> Result<Arc<dyn Pool>> {
        let account = self.client.get_account(&pool_id).await?;
        let mut pool =
            ClmmPool::decode(&account.data).with_context(|| format!("clmm pool {pool_id}"))?;
        pool.pool_id = pool_id;
        self.attach_config(&mut pool).await?;
        Ok(Arc::new(pool))
    }
}
