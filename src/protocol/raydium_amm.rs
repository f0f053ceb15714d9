use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;

use crate::api::{Pool, Protocol, ProtocolKind};
use crate::pool::raydium::amm::{get_associated_authority, AmmV4Pool, MarketStateV3};
use crate::pool::raydium::{AMM_AUTHORITY_SEED, RAYDIUM_AMM_PROGRAM_ID};
use crate::sol::{pool_scan_filters, SolClient};

pub struct RaydiumAmmProtocol {
    client: Arc<SolClient>,
}

impl RaydiumAmmProtocol {
    pub fn new(client: Arc<SolClient>) -> Self {
        Self { client }
    }

    /// Joins the serum market referenced by the pool: decodes the market
    /// account and attaches its trading accounts plus both authorities.
    async fn attach_market(&self, pool: &mut AmmV4Pool) -> Result<()> {
        let market_account = self
            .client
            .get_account(&pool.market_id)
            .await
            .context("amm v4 market account")?;
        let market = MarketStateV3::decode(&market_account.data)?;

        pool.authority =
            Pubkey::find_program_address(&[AMM_AUTHORITY_SEED], &RAYDIUM_AMM_PROGRAM_ID).0;
        pool.market_authority =
            get_associated_authority(&market_account.owner, &market.own_address)?;
        pool.market_bids = market.bids;
        pool.market_asks = market.asks;
        pool.market_event_queue = market.event_queue;
        pool.market_base_vault = market.base_vault;
        pool.market_quote_vault = market.quote_vault;
        Ok(())
    }
}

#[async_trait]
impl Protocol for RaydiumAmmProtocol {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::RaydiumAmm
    }

    async fn fetch_pools_by_pair(
        &self,
        base_mint: Pubkey,
        quote_mint: Pubkey,
    ) -> Result<Vec<Arc<dyn Pool>>> {
        let filters = pool_scan_filters(
            AmmV4Pool::SPAN,
            AmmV4Pool::BASE_MINT_OFFSET,
            &base_mint,
            AmmV4Pool::QUOTE_MINT_OFFSET,
            &quote_mint,
        );
        let accounts = self
            .client
            .get_program_accounts(&RAYDIUM_AMM_PROGRAM_ID, filters)
            .await?;

        let mut pools: Vec<Arc<dyn Pool>> = Vec::new();
        for (pubkey, account) in accounts {
            let Ok(mut pool) = AmmV4Pool::decode(&account.data) else {
                continue;
            };
            pool.pool_id = pubkey;
            self.attach_market(&mut pool)
                .await
                .with_context(|| format!("amm v4 pool {pubkey}"))?;
            pools.push(Arc::new(pool));
        }
        Ok(pools)
    }

    async fn fetch_pool_by_id(&self, pool_id: Pubkey) -> Result<Arc<dyn Pool>> {
        let account = self.client.get_account(&pool_id).await?;
        let mut pool = AmmV4Pool::decode(&account.data)
            .with_context(|| format!("amm v4 pool {pool_id}"))?;
        pool.pool_id = pool_id;
        self.attach_market(&mut pool).await?;
        Ok(Arc::new(pool))
    }
}
