//! Router behavior against mock pools: parallel fan-out, max selection, and
//! error swallowing.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use solroute::{Pool, ProtocolKind, RouteError, SimpleRouter, SolClient, SwapParams};

struct MockPool {
    id: Pubkey,
    out: Option<u64>,
}

impl MockPool {
    fn paying(out: u64) -> Arc<dyn Pool> {
        Arc::new(Self {
            id: Pubkey::new_unique(),
            out: Some(out),
        })
    }

    fn failing() -> Arc<dyn Pool> {
        Arc::new(Self {
            id: Pubkey::new_unique(),
            out: None,
        })
    }
}

#[async_trait]
impl Pool for MockPool {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::RaydiumAmm
    }

    fn program_id(&self) -> Pubkey {
        Pubkey::default()
    }

    fn id(&self) -> Pubkey {
        self.id
    }

    fn token_pair(&self) -> (Pubkey, Pubkey) {
        (Pubkey::default(), Pubkey::default())
    }

    async fn quote(&self, _client: &SolClient, _input_mint: Pubkey, _amount_in: u64) -> Result<u64> {
        self.out.ok_or_else(|| RouteError::InsufficientLiquidity.into())
    }

    async fn build_swap_instructions(
        &self,
        _client: &SolClient,
        _params: &SwapParams,
    ) -> Result<Vec<Instruction>> {
        Ok(vec![])
    }
}

fn local_client() -> Arc<SolClient> {
    // never contacted by the mock pools
    Arc::new(SolClient::new("http://127.0.0.1:8899", 10))
}

#[tokio::test]
async fn best_pool_is_the_maximum_output() {
    let mut router = SimpleRouter::new(vec![]);
    let best = MockPool::paying(3_000);
    router.pools = vec![
        MockPool::paying(1_000),
        best.clone(),
        MockPool::paying(2_000),
    ];

    let (pool, out) = router
        .get_best_pool(&local_client(), Pubkey::new_unique(), 100)
        .await
        .unwrap();
    assert_eq!(out, 3_000);
    assert_eq!(pool.id(), best.id());
}

#[tokio::test]
async fn failing_pools_are_skipped_not_fatal() {
    let mut router = SimpleRouter::new(vec![]);
    router.pools = vec![
        MockPool::failing(),
        MockPool::paying(42),
        MockPool::failing(),
    ];

    let (_, out) = router
        .get_best_pool(&local_client(), Pubkey::new_unique(), 100)
        .await
        .unwrap();
    assert_eq!(out, 42);
}

#[tokio::test]
async fn no_quotable_pool_is_no_route_found() {
    let mut router = SimpleRouter::new(vec![]);
    router.pools = vec![MockPool::failing(), MockPool::failing()];

    let err = router
        .get_best_pool(&local_client(), Pubkey::new_unique(), 100)
        .await
        .err()
        .unwrap();
    assert_eq!(
        err.downcast_ref::<RouteError>(),
        Some(&RouteError::NoRouteFound)
    );
}

#[tokio::test]
async fn empty_pool_set_is_no_route_found() {
    let router = SimpleRouter::new(vec![]);
    let err = router
        .get_best_pool(&local_client(), Pubkey::new_unique(), 100)
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<RouteError>(),
        Some(&RouteError::NoRouteFound)
    ));
}
