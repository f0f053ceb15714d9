//! Best-venue selection: sequential discovery across protocols, parallel
//! quote fan-out across pools.

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use solana_sdk::pubkey::Pubkey;
use tokio::task::JoinSet;

use crate::api::{Pool, Protocol};
use crate::error::RouteError;
use crate::sol::SolClient;

pub struct SimpleRouter {
    pub protocols: Vec<Arc<dyn Protocol>>,
    pub pools: Vec<Arc<dyn Pool>>,
}

impl SimpleRouter {
    pub fn new(protocols: Vec<Arc<dyn Protocol>>) -> Self {
        Self {
            protocols,
            pools: Vec::new(),
        }
    }

    /// Discovers pools bridging the pair across every registered protocol.
    /// A failing protocol is logged and skipped; it never aborts the search.
    pub async fn query_all_pools(&mut self, base_mint: Pubkey, quote_mint: Pubkey) -> Result<()> {
        let mut all_pools: Vec<Arc<dyn Pool>> = Vec::new();
        for protocol in &self.protocols {
            info!("fetching pools from protocol {}", protocol.protocol());
            match protocol.fetch_pools_by_pair(base_mint, quote_mint).await {
                Ok(pools) => all_pools.extend(pools),
                Err(err) => {
                    warn!("error fetching pools from {}: {err:#}", protocol.protocol());
                }
            }
        }
        self.pools = all_pools;
        Ok(())
    }

    /// Quotes every discovered pool concurrently and returns the one paying
    /// the most output. Pools that fail to quote are logged and skipped.
    pub async fn get_best_pool(
        &self,
        client: &Arc<SolClient>,
        token_in: Pubkey,
        amount_in: u64,
    ) -> Result<(Arc<dyn Pool>, u64)> {
        let mut quotes: JoinSet<(usize, Result<u64>)> = JoinSet::new();
        for (index, pool) in self.pools.iter().enumerate() {
            let pool = pool.clone();
            let client = client.clone();
            quotes.spawn(async move {
                let out = pool.quote(&client, token_in, amount_in).await;
                (index, out)
            });
        }

        let mut best: Option<(usize, u64)> = None;
        while let Some(joined) = quotes.join_next().await {
            let Ok((index, result)) = joined else {
                continue;
            };
            match result {
                Ok(out_amount) => {
                    if best.map_or(true, |(_, best_out)| out_amount > best_out) {
                        best = Some((index, out_amount));
                    }
                }
                Err(err) => {
                    warn!("error quoting pool {}: {err:#}", self.pools[index].id());
                }
            }
        }

        match best {
            Some((index, out_amount)) => Ok((self.pools[index].clone(), out_amount)),
            None => Err(RouteError::NoRouteFound.into()),
        }
    }
}
