use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use crate::sol::SolClient;

/// The AMM protocols this router can quote and trade against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    RaydiumAmm,
    RaydiumClmm,
    RaydiumCpmm,
    MeteoraDlmm,
    PumpAmm,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolKind::RaydiumAmm => "raydium_amm",
            ProtocolKind::RaydiumClmm => "raydium_clmm",
            ProtocolKind::RaydiumCpmm => "raydium_cpmm",
            ProtocolKind::MeteoraDlmm => "meteora_dlmm",
            ProtocolKind::PumpAmm => "pump_amm",
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Swap parameters handed to an instruction builder.
#[derive(Debug, Clone)]
pub struct SwapParams {
    pub user: Pubkey,
    pub input_mint: Pubkey,
    pub amount_in: u64,
    pub min_out: u64,
    pub user_base_account: Pubkey,
    pub user_quote_account: Pubkey,
}

/// One liquidity pool: decoded state plus the operations the router needs.
///
/// `quote` refreshes whatever chain state the simulator depends on (vault
/// balances, tick arrays, bin arrays, the clock) and then simulates off
/// chain; per-quote mutable state is request-local, so pools can be quoted
/// concurrently through a shared reference.
#[async_trait]
pub trait Pool: Send + Sync {
    fn protocol(&self) -> ProtocolKind;

    fn program_id(&self) -> Pubkey;

    /// Address of the pool-state account.
    fn id(&self) -> Pubkey;

    /// (base mint, quote mint) as laid out in the pool account.
    fn token_pair(&self) -> (Pubkey, Pubkey);

    /// Expected output amount for swapping `amount_in` of `input_mint`.
    async fn quote(&self, client: &SolClient, input_mint: Pubkey, amount_in: u64) -> Result<u64>;

    /// Builds the swap instruction(s) for an external signer.
    async fn build_swap_instructions(
        &self,
        client: &SolClient,
        params: &SwapParams,
    ) -> Result<Vec<Instruction>>;
}

/// A protocol adapter's discovery surface.
#[async_trait]
pub trait Protocol: Send + Sync {
    fn protocol(&self) -> ProtocolKind;

    /// All pools bridging the pair, via a filtered program-account scan.
    async fn fetch_pools_by_pair(
        &self,
        base_mint: Pubkey,
        quote_mint: Pubkey,
    ) -> Result<Vec<Arc<dyn Pool>>>;

    /// A single pool by account address.
    async fn fetch_pool_by_id(&self, pool_id: Pubkey) -> Result<Arc<dyn Pool>>;
}
