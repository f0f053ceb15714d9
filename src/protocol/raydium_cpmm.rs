use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::api::{Pool, Protocol, ProtocolKind};
use crate::pool::raydium::cpmm::CpmmPool;
use crate::pool::raydium::RAYDIUM_CPMM_PROGRAM_ID;
use crate::sol::{pool_scan_filters, SolClient};

pub struct RaydiumCpmmProtocol {
    client: Arc<SolClient>,
}

impl RaydiumCpmmProtocol {
    pub fn new(client: Arc<SolClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Protocol for RaydiumCpmmProtocol {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::RaydiumCpmm
    }

    async fn fetch_pools_by_pair(
        &self,
        base_mint: Pubkey,
        quote_mint: Pubkey,
    ) -> Result<Vec<Arc<dyn Pool>>> {
        let filters = pool_scan_filters(
            CpmmPool::SPAN,
            CpmmPool::TOKEN0_MINT_OFFSET,
            &base_mint,
            CpmmPool::TOKEN1_MINT_OFFSET,
            &quote_mint,
        );
        let accounts = self
            .client
            .get_program_accounts(&RAYDIUM_CPMM_PROGRAM_ID, filters)
            .await?;

        let mut pools: Vec<Arc<dyn Pool>> = Vec::new();
        for (pubkey, account) in accounts {
            let Ok(mut pool) = CpmmPool::decode(&account.data) else {
                continue;
            };
            pool.pool_id = pubkey;
            pools.push(Arc::new(pool));
        }
        Ok(pools)
    }

    async fn fetch_pool_by_id(&self, pool_id: Pubkey) -> Result<Arc<dyn Pool>> {
        let account = self.client.get_account(&pool_id).await?;
        let mut pool =
            CpmmPool::decode(&account.data).with_context(|| format!("cpmm pool {pool_id}"))?;
        pool.pool_id = pool_id;
        Ok(Arc::new(pool))
    }
}
