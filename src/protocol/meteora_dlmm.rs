use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use solana_sdk::pubkey::Pubkey;

use crate::api::{Pool, Protocol, ProtocolKind};
use crate::pool::meteora::bin_array::{
    derive_bin_array_bitmap_extension, BinArray, BinArrayBitmapExtension,
};
use crate::pool::meteora::dlmm::DlmmPool;
use crate::pool::meteora::METEORA_DLMM_PROGRAM_ID;
use crate::sol::{pool_scan_filters, SolClient};

pub struct MeteoraDlmmProtocol {
    client: Arc<SolClient>,
}

impl MeteoraDlmmProtocol {
    pub fn new(client: Arc<SolClient>) -> Self {
        Self { client }
    }

    /// Attaches the runtime caches a DLMM quote needs: the bitmap extension
    /// (when the account exists) and up to four bin arrays per direction
    /// around the active bin.
    async fn attach_runtime_state(&self, pool: &mut DlmmPool) -> Result<()> {
        pool.bitmap_extension_key = derive_bin_array_bitmap_extension(&pool.pool_id);
        let extension_accounts = self
            .client
            .get_multiple_accounts(&[pool.bitmap_extension_key])
            .await?;
        pool.bitmap_extension = match extension_accounts.into_iter().next().flatten() {
            Some(account) => Some(BinArrayBitmapExtension::decode(&account.data)?),
            None => None,
        };

        let mut addresses = pool.bin_array_pubkeys_for_swap(true, 4)?;
        for pubkey in pool.bin_array_pubkeys_for_swap(false, 4)? {
            if !addresses.contains(&pubkey) {
                addresses.push(pubkey);
            }
        }
        if !addresses.is_empty() {
            let accounts = self.client.get_multiple_accounts(&addresses).await?;
            for account in accounts.into_iter().flatten() {
                let array = BinArray::decode(&account.data)?;
                pool.bin_arrays.insert(array.index, array);
            }
        }
        debug!(
            "dlmm pool {} attached {} bin arrays",
            pool.pool_id,
            pool.bin_arrays.len()
        );
        Ok(())
    }
}

#[async_trait]
impl Protocol for MeteoraDlmmProtocol {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::MeteoraDlmm
    }

    async fn fetch_pools_by_pair(
        &self,
        base_mint: Pubkey,
        quote_mint: Pubkey,
    ) -> Result<Vec<Arc<dyn Pool>>> {
        let filters = pool_scan_filters(
            DlmmPool::SPAN,
            DlmmPool::TOKEN_X_MINT_OFFSET,
            &base_mint,
            DlmmPool::TOKEN_Y_MINT_OFFSET,
            &quote_mint,
        );
        let accounts = self
            .client
            .get_program_accounts(&METEORA_DLMM_PROGRAM_ID, filters)
            .await?;

        let mut pools: Vec<Arc<dyn Pool>> = Vec::new();
        for (pubkey, account) in accounts {
            let Ok(mut pool) = DlmmPool::decode(&account.data) else {
                continue;
            };
            pool.pool_id = pubkey;
            if self.attach_runtime_state(&mut pool).await.is_err() {
                // a pool whose bin arrays cannot be fetched is unquotable
                continue;
            }
            pools.push(Arc::new(pool));
        }
        Ok(pools)
    }

    async fn fetch_pool_by_id(&self, pool_id: Pubkey) -> Result<Arc<dyn Pool>> {
        let account = self.client.get_account(&pool_id).await?;
        let mut pool =
            DlmmPool::decode(&account.data).with_context(|| format!("dlmm pool {pool_id}"))?;
        pool.pool_id = pool_id;
        self.attach_runtime_state(&mut pool).await?;
        Ok(Arc::new(pool))
    }
}
