//! Integration tests for token resolution
//!
//! Tests cover:
//! - Partial-failure isolation in the on-chain metadata batch
//! - Cache idempotence and case-insensitive lookups
//! - Primary/fallback tier composition

mod common;

use common::{addr, FakeCaller, FakeMetadata, FixedTokenProvider};
use ethers::types::{Address, U256};
use mig_routing_sdk::cache::{Cache, InMemoryCache};
use mig_routing_sdk::chains::{ChainConfig, ChainRegistry, MAINNET};
use mig_routing_sdk::token_provider::{token_cache_key, CachingTokenProvider, OnChainTokenProvider, TokenProvider};
use mig_routing_sdk::types::Token;
use std::str::FromStr;
use std::sync::Arc;

const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

fn mainnet() -> Arc<ChainConfig> {
    ChainRegistry::builtin().get(MAINNET).unwrap()
}

/// Mainnet configuration without seed tokens, so every lookup reaches the providers.
fn unseeded_mainnet() -> Arc<ChainConfig> {
    let mut chain = (*mainnet()).clone();
    chain.seed_tokens.clear();
    Arc::new(chain)
}

fn token(n: u64, symbol: &str) -> Token {
    Token::new(MAINNET, addr(n), 18, symbol)
}

fn token_cache() -> Arc<InMemoryCache<Token>> {
    Arc::new(InMemoryCache::new("token", 1_000))
}

/// Five addresses, one of which reverts on both calls
#[tokio::test]
async fn test_one_failing_token_does_not_abort_batch() {
    let mut caller = FakeCaller::default();
    for n in 1..=4 {
        caller = caller.with(addr(n), FakeMetadata::token(&format!("TK{}", n), 18));
    }
    let caller = Arc::new(caller);
    let provider = OnChainTokenProvider::new(MAINNET, caller.clone());

    let requested: Vec<Address> = (1..=5).map(addr).collect();
    let tokens = provider.get_tokens(&requested, None).await.unwrap();

    assert_eq!(tokens.len(), 4);
    assert!(tokens.get_token(&addr(5)).is_none());
    assert_eq!(tokens.get_token_by_symbol("tk3").unwrap().address, addr(3));
    // symbol and decimals batches
    assert_eq!(caller.batch_count(), 2);
}

/// A token whose symbol call succeeds but decimals call reverts is dropped
#[tokio::test]
async fn test_symbol_decimals_mismatch_drops_token() {
    let caller = FakeCaller::default()
        .with(addr(1), FakeMetadata::token("GOOD", 6))
        .with(
            addr(2),
            FakeMetadata {
                symbol: Some("HALF".to_string()),
                decimals: None,
            },
        )
        .with(
            addr(3),
            FakeMetadata {
                symbol: Some("HUGE".to_string()),
                decimals: Some(U256::from(300u64)),
            },
        );
    let provider = OnChainTokenProvider::new(MAINNET, Arc::new(caller));

    let tokens = provider.get_tokens(&[addr(1), addr(2), addr(3)], None).await.unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens.get_token(&addr(1)).unwrap().decimals, 6);
}

/// [usdc, bogus] where only usdc resolves on chain
#[tokio::test]
async fn test_usdc_and_bogus_address() {
    let usdc = Address::from_str(USDC).unwrap();
    let bogus = "0x000000000000000000000000000000000000dEaD";
    let caller = Arc::new(FakeCaller::default().with(usdc, FakeMetadata::token("USDC", 6)));
    let resolver = CachingTokenProvider::new(
        unseeded_mainnet(),
        token_cache(),
        Arc::new(OnChainTokenProvider::new(MAINNET, caller)),
        Vec::new(),
    );

    let tokens = resolver.get_tokens_by_str(&[USDC, bogus], None).await.unwrap();
    let resolved = tokens.get_token_by_address(USDC).unwrap();
    assert_eq!(resolved.decimals, 6);
    assert_eq!(resolved.symbol, "USDC");
    assert!(tokens.get_token_by_address(bogus).is_none());
}

/// Resolving twice issues no second external batch
#[tokio::test]
async fn test_resolution_is_idempotent() {
    let primary = Arc::new(FixedTokenProvider::new(vec![token(1, "AAA"), token(2, "BBB")]));
    let cache = token_cache();
    let resolver = CachingTokenProvider::new(unseeded_mainnet(), cache.clone(), primary.clone(), Vec::new());

    let first = resolver.get_tokens(&[addr(1), addr(2)], None).await.unwrap();
    let second = resolver.get_tokens(&[addr(2), addr(1)], None).await.unwrap();

    assert_eq!(primary.call_count(), 1);
    assert_eq!(first.get_token(&addr(1)), second.get_token(&addr(1)));
    assert_eq!(second.len(), 2);
    assert!(cache.has(&token_cache_key(MAINNET, &addr(1))).await.unwrap());
}

/// Addresses differing only in case share one cache entry
#[tokio::test]
async fn test_case_insensitive_resolution() {
    let usdc = Address::from_str(USDC).unwrap();
    let primary = Arc::new(FixedTokenProvider::new(vec![Token::new(MAINNET, usdc, 6, "USDC")]));
    let cache = token_cache();
    let resolver = CachingTokenProvider::new(unseeded_mainnet(), cache.clone(), primary.clone(), Vec::new());

    let lower = USDC.to_lowercase();
    let upper = format!("0x{}", USDC[2..].to_uppercase());
    let tokens = resolver
        .get_tokens_by_str(&[lower.as_str(), upper.as_str(), USDC], None)
        .await
        .unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(primary.requested.lock().unwrap()[0].len(), 1);

    let again = resolver.get_tokens_by_str(&[upper.as_str()], None).await.unwrap();
    assert_eq!(again.get_token_by_address(&lower).unwrap().symbol, "USDC");
    assert_eq!(primary.call_count(), 1);
    assert_eq!(cache.len(), 1);
}

/// Primary resolves {A,B}, fallback resolves {C}; requesting {A,B,C,D} yields {A,B,C}
#[tokio::test]
async fn test_fallback_composition() {
    let primary = Arc::new(FixedTokenProvider::new(vec![token(1, "A"), token(2, "B")]));
    let fallback = Arc::new(FixedTokenProvider::new(vec![token(3, "C")]));
    let resolver = CachingTokenProvider::new(unseeded_mainnet(), token_cache(), primary.clone(), vec![fallback.clone() as Arc<dyn TokenProvider>]);

    let tokens = resolver
        .get_tokens(&[addr(1), addr(2), addr(3), addr(4)], None)
        .await
        .unwrap();

    assert_eq!(tokens.len(), 3);
    for n in 1..=3 {
        assert!(tokens.get_token(&addr(n)).is_some());
    }
    assert!(tokens.get_token(&addr(4)).is_none());
    // the fallback only sees what the primary could not resolve
    assert_eq!(fallback.requested.lock().unwrap()[0], vec![addr(3), addr(4)]);
}

#[tokio::test]
async fn test_failing_fallback_is_skipped_but_failing_primary_propagates() {
    let primary = Arc::new(FixedTokenProvider::new(vec![token(1, "A")]));
    let resolver = CachingTokenProvider::new(
        unseeded_mainnet(),
        token_cache(),
        primary,
        vec![Arc::new(FixedTokenProvider::failing()) as Arc<dyn TokenProvider>],
    );
    let tokens = resolver.get_tokens(&[addr(1), addr(2)], None).await.unwrap();
    assert_eq!(tokens.len(), 1);

    let broken = CachingTokenProvider::new(
        unseeded_mainnet(),
        token_cache(),
        Arc::new(FixedTokenProvider::failing()),
        Vec::new(),
    );
    assert!(broken.get_tokens(&[addr(1)], None).await.is_err());
}

/// Curated tokens come from the seeded cache without any provider call
#[tokio::test]
async fn test_seed_tokens_skip_providers() {
    let primary = Arc::new(FixedTokenProvider::new(Vec::new()));
    let chain = mainnet();
    let resolver = CachingTokenProvider::new(chain.clone(), token_cache(), primary.clone(), Vec::new());

    let weth = chain.wrapped_native.address;
    let tokens = resolver.get_tokens(&[weth], None).await.unwrap();
    assert_eq!(tokens.get_token(&weth).unwrap().symbol, "WETH");
    assert_eq!(primary.call_count(), 0);
}
