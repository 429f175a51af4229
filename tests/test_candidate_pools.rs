//! Integration tests for candidate pool generation
//!
//! Tests cover:
//! - Base × base expansion, canonicalization and dedup
//! - Requested pair expansion and fee tier fan-out
//! - Live V3 confirmation and fallback between pool sources

mod common;

use async_trait::async_trait;
use common::{addr, AllPoolsExist};
use mig_routing_sdk::candidate_pools::{
    expand_pairs, without_self_pairs, CandidatePoolGenerator, CandidatePoolSet, FallbackPoolIndex,
    PoolIndexProvider, SelectionReason,
};
use mig_routing_sdk::chains::{ChainRegistry, ChainRegistryError, MAINNET, ROLLUX};
use mig_routing_sdk::pools::{compute_v2_pair_address, FeeAmount, Protocol};
use mig_routing_sdk::types::conversions::address_to_string;
use mig_routing_sdk::types::Token;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn registry() -> Arc<ChainRegistry> {
    Arc::new(ChainRegistry::builtin())
}

fn mainnet_generator(v3: Arc<AllPoolsExist>) -> CandidatePoolGenerator {
    CandidatePoolGenerator::new(registry()).with_v3_pool_provider(MAINNET, v3)
}

fn v3_fake() -> Arc<AllPoolsExist> {
    let chain = ChainRegistry::builtin().get(MAINNET).unwrap();
    Arc::new(AllPoolsExist::new(chain.v3.unwrap()))
}

fn assert_unique_and_canonical(set: &CandidatePoolSet) {
    let ids: HashSet<&String> = set.pools.iter().map(|p| &p.pool.id).collect();
    assert_eq!(ids.len(), set.len(), "pool ids must be unique");
    for candidate in &set.pools {
        assert_ne!(candidate.pool.token0.id, candidate.pool.token1.id);
        assert!(candidate.pool.token0.id < candidate.pool.token1.id);
    }
}

/// 4 bases: 16 ordered pairs, 12 without self-pairs, 6 unique pools
#[test]
fn test_base_pair_counts() {
    let chain = ChainRegistry::builtin().get(MAINNET).unwrap();
    assert_eq!(chain.base_tokens.len(), 4);
    let raw = expand_pairs(&chain.base_tokens, None, None);
    assert_eq!(raw.len(), 16);
    let pairs = without_self_pairs(raw);
    assert_eq!(pairs.len(), 12);
    assert!(pairs.iter().all(|(a, b, _)| a.address != b.address));

    let v2 = chain.v2.unwrap();
    let unique: HashSet<_> = pairs
        .iter()
        .map(|(a, b, _)| compute_v2_pair_address(&v2, a, b))
        .collect();
    assert_eq!(unique.len(), 6);
}

#[tokio::test]
async fn test_base_only_generation() {
    let v3 = v3_fake();
    let set = mainnet_generator(v3.clone()).generate(MAINNET, None, None).await.unwrap();

    assert_eq!(set.by_protocol(Protocol::V2).len(), 6);
    assert_eq!(set.by_protocol(Protocol::V3).len(), 6 * FeeAmount::ALL.len());
    assert_eq!(set.by_reason(SelectionReason::BaseBase).len(), set.len());
    assert_unique_and_canonical(&set);
    assert_eq!(v3.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_requested_pair_expansion() {
    let token_in = Token::new(MAINNET, addr(0x1111), 18, "IN");
    let token_out = Token::new(MAINNET, addr(0x2222), 18, "OUT");
    let set = mainnet_generator(v3_fake())
        .generate(MAINNET, Some(&token_in), Some(&token_out))
        .await
        .unwrap();

    // 6 base pairs + direct + 4 in×base + 4 out×base
    assert_eq!(set.by_protocol(Protocol::V2).len(), 15);
    assert_eq!(set.by_protocol(Protocol::V3).len(), 15 * 4);
    assert_eq!(set.by_reason(SelectionReason::Direct).len(), 1 + 4);
    assert_eq!(set.by_reason(SelectionReason::TokenInBase).len(), 4 * 5);
    assert_eq!(set.by_reason(SelectionReason::TokenOutBase).len(), 4 * 5);

    let chain = ChainRegistry::builtin().get(MAINNET).unwrap();
    let direct = compute_v2_pair_address(&chain.v2.unwrap(), &token_out, &token_in);
    assert!(set.contains(&direct));
    assert_unique_and_canonical(&set);
}

/// A request between two bases adds no new pools
#[tokio::test]
async fn test_request_between_bases_collapses_into_base_pairs() {
    let chain = ChainRegistry::builtin().get(MAINNET).unwrap();
    let weth = chain.wrapped_native.clone();
    let usdc = chain.base_tokens[1].clone();
    let set = mainnet_generator(v3_fake())
        .with_protocols(&[Protocol::V2])
        .generate(MAINNET, Some(&weth), Some(&usdc))
        .await
        .unwrap();
    assert_eq!(set.len(), 6);
}

#[tokio::test]
async fn test_missing_v3_pools_are_excluded() {
    let chain = ChainRegistry::builtin().get(MAINNET).unwrap();
    let mut fake = AllPoolsExist::new(chain.v3.unwrap());
    fake.missing_fees = vec![FeeAmount::Lowest, FeeAmount::High];
    let set = mainnet_generator(Arc::new(fake))
        .with_protocols(&[Protocol::V3])
        .generate(MAINNET, None, None)
        .await
        .unwrap();

    assert_eq!(set.len(), 12);
    assert!(set.pools.iter().all(|p| matches!(p.pool.fee_tier, Some(500) | Some(3000))));
    assert!(set.pools.iter().all(|p| p.pool.liquidity == "1000"));
}

#[tokio::test]
async fn test_v2_candidates_carry_placeholder_liquidity() {
    let set = CandidatePoolGenerator::new(registry())
        .with_protocols(&[Protocol::V2, Protocol::Mixed])
        .generate(MAINNET, None, None)
        .await
        .unwrap();
    assert_eq!(set.len(), 6);
    assert!(set.pools.iter().all(|p| p.pool.fee_tier.is_none() && p.pool.liquidity == "100"));
}

#[tokio::test]
async fn test_chain_without_deployments_yields_empty_set() {
    let set = CandidatePoolGenerator::new(registry())
        .generate(ROLLUX, None, None)
        .await
        .unwrap();
    assert!(set.is_empty());
    assert_eq!(set.chain_id, ROLLUX);
}

#[tokio::test]
async fn test_unsupported_chain_is_rejected() {
    let err = CandidatePoolGenerator::new(registry())
        .generate(999_999, None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ChainRegistryError>(),
        Some(ChainRegistryError::UnsupportedChain(999_999))
    ));
}

#[tokio::test]
async fn test_transport_failure_propagates() {
    let chain = ChainRegistry::builtin().get(MAINNET).unwrap();
    let mut fake = AllPoolsExist::new(chain.v3.unwrap());
    fake.fail = true;
    let result = mainnet_generator(Arc::new(fake)).generate(MAINNET, None, None).await;
    assert!(result.is_err());
}

struct BrokenIndex;

#[async_trait]
impl PoolIndexProvider for BrokenIndex {
    async fn get_pools(
        &self,
        _chain_id: u64,
        _token_in: Option<&Token>,
        _token_out: Option<&Token>,
    ) -> anyhow::Result<CandidatePoolSet> {
        Err(anyhow::anyhow!("index offline"))
    }
}

#[tokio::test]
async fn test_fallback_index_uses_generator_when_live_index_fails() {
    let generator = Arc::new(CandidatePoolGenerator::new(registry()).with_protocols(&[Protocol::V2]));
    let index = FallbackPoolIndex::new(Arc::new(BrokenIndex), generator);
    let set = index.get_pools(MAINNET, None, None).await.unwrap();
    assert_eq!(set.len(), 6);
    let chain = ChainRegistry::builtin().get(MAINNET).unwrap();
    let weth_id = address_to_string(chain.wrapped_native.address);
    assert!(set
        .pools
        .iter()
        .any(|p| p.pool.token0.id == weth_id || p.pool.token1.id == weth_id));
}
