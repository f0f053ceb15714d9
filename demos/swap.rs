//! Thin demo wiring the router end to end: discover pools for a pair, pick
//! the best quote, build the swap instruction, then simulate or send.
//!
//! Configuration comes from the environment:
//!   RPC_URL        required, RPC endpoint
//!   PRIVATE_KEY    required, base58 secret key
//!   INPUT_MINT     input token mint (defaults to WSOL)
//!   OUTPUT_MINT    required, output token mint
//!   AMOUNT_IN      input amount in native units (default 10_000_000)
//!   SLIPPAGE_BPS   slippage tolerance (default 100 = 1%)
//!
//! Pass `--simulate` to stop after a simulation instead of sending.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use spl_associated_token_account::get_associated_token_address;

use solroute::constants::WSOL;
use solroute::protocol::{
    MeteoraDlmmProtocol, PumpAmmProtocol, RaydiumAmmProtocol, RaydiumClmmProtocol,
    RaydiumCpmmProtocol,
};
use solroute::{Protocol, SimpleRouter, SolClient, SwapParams};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let rpc_url = std::env::var("RPC_URL").context("RPC_URL is required")?;
    let private_key = std::env::var("PRIVATE_KEY").context("PRIVATE_KEY is required")?;
    let input_mint = match std::env::var("INPUT_MINT") {
        Ok(value) => Pubkey::from_str(&value)?,
        Err(_) => WSOL,
    };
    let output_mint = Pubkey::from_str(
        &std::env::var("OUTPUT_MINT").context("OUTPUT_MINT is required")?,
    )?;
    let amount_in: u64 = std::env::var("AMOUNT_IN")
        .unwrap_or_else(|_| "10000000".to_string())
        .parse()?;
    let slippage_bps: u64 = std::env::var("SLIPPAGE_BPS")
        .unwrap_or_else(|_| "100".to_string())
        .parse()?;
    let simulate_only = std::env::args().any(|arg| arg == "--simulate");

    let payer = Keypair::from_base58_string(&private_key);
    info!("signing as {}", payer.pubkey());

    let client = Arc::new(SolClient::new(&rpc_url, 20));
    let protocols: Vec<Arc<dyn Protocol>> = vec![
        Arc::new(PumpAmmProtocol::new(client.clone())),
        Arc::new(RaydiumAmmProtocol::new(client.clone())),
        Arc::new(RaydiumClmmProtocol::new(client.clone())),
        Arc::new(RaydiumCpmmProtocol::new(client.clone())),
        Arc::new(MeteoraDlmmProtocol::new(client.clone())),
    ];
    let mut router = SimpleRouter::new(protocols);

    info!("querying pools for {input_mint} -> {output_mint}");
    router.query_all_pools(input_mint, output_mint).await?;
    info!("found {} pools", router.pools.len());

    let (best_pool, amount_out) = router.get_best_pool(&client, input_mint, amount_in).await?;
    info!(
        "best pool {} ({}) pays {amount_out}",
        best_pool.id(),
        best_pool.protocol()
    );

    let min_out = amount_out * (10_000 - slippage_bps) / 10_000;
    // Builders expect accounts keyed to the pool's own (base, quote) order.
    let (pool_base_mint, pool_quote_mint) = best_pool.token_pair();
    let user_base_account = get_associated_token_address(&payer.pubkey(), &pool_base_mint);
    let user_quote_account = get_associated_token_address(&payer.pubkey(), &pool_quote_mint);

    let instructions = best_pool
        .build_swap_instructions(
            &client,
            &SwapParams {
                user: payer.pubkey(),
                input_mint,
                amount_in,
                min_out,
                user_base_account,
                user_quote_account,
            },
        )
        .await?;

    let blockhash = client.get_latest_blockhash().await?;
    let transaction = Transaction::new_signed_with_payer(
        &instructions,
        Some(&payer.pubkey()),
        &[&payer],
        blockhash,
    );

    if simulate_only {
        let result = client.simulate_transaction(&transaction).await?;
        match result.err {
            Some(err) => info!("simulation failed: {err:?}"),
            None => info!("simulation ok, units: {:?}", result.units_consumed),
        }
        return Ok(());
    }

    let signature = client.send_transaction(&transaction).await?;
    info!("sent: https://solscan.io/tx/{signature}");
    Ok(())
}
