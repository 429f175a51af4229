//! # Token Resolver
//!
//! Maps requested addresses to validated [`Token`] metadata.
//!
//! [`OnChainTokenProvider`] reads `symbol()` and `decimals()` through a [`BatchCaller`].
//! [`CachingTokenProvider`] layers a cache, seeded with the chain's well-known tokens, over
//! an ordered list of providers: the first is the primary tier, the rest are fallbacks
//! tried only for addresses the previous tiers could not resolve.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::abi::Token as AbiToken;
use ethers::types::{Address, BlockId};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::convert::TryInto;
use std::sync::Arc;

use crate::cache::Cache;
use crate::chains::ChainConfig;
use crate::contracts::IERC20METADATA_ABI;
use crate::metrics;
use crate::multicall::{BatchCaller, CallOutcome};
use crate::types::conversions::{address_to_string, normalize_addresses};
use crate::types::{Token, TokenAccessor};

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Resolves whatever it can. Addresses it cannot resolve are simply absent from the
    /// accessor; only infrastructure failures are errors.
    async fn get_tokens(&self, addresses: &[Address], block: Option<BlockId>) -> Result<TokenAccessor>;
}

pub fn token_cache_key(chain_id: u64, address: &Address) -> String {
    format!("token-{}-{}", chain_id, address_to_string(*address))
}

fn dedupe(addresses: &[Address]) -> Vec<Address> {
    let mut seen = HashSet::with_capacity(addresses.len());
    addresses
        .iter()
        .copied()
        .filter(|a| seen.insert(*a))
        .collect()
}

/// Reads ERC-20 metadata on chain with two concurrent batched calls.
pub struct OnChainTokenProvider {
    chain_id: u64,
    caller: Arc<dyn BatchCaller>,
}

impl OnChainTokenProvider {
    pub fn new(chain_id: u64, caller: Arc<dyn BatchCaller>) -> Self {
        Self { chain_id, caller }
    }

    /// Joins the positional symbol/decimals outcomes for one address.
    fn validate(&self, address: Address, symbol: &CallOutcome, decimals: &CallOutcome) -> Option<Token> {
        if symbol.success != decimals.success {
            debug!(
                "Dropping {}: symbol/decimals success mismatch ({} vs {})",
                address_to_string(address),
                symbol.success,
                decimals.success
            );
            metrics::increment_tokens_dropped("call_mismatch");
            return None;
        }
        if !symbol.success {
            metrics::increment_tokens_dropped("call_failed");
            return None;
        }

        let symbol = match symbol.result.as_ref().and_then(|r| r.first()) {
            Some(AbiToken::String(s)) => s.clone(),
            _ => {
                metrics::increment_tokens_dropped("invalid_symbol");
                return None;
            }
        };
        let decimals: u8 = match decimals.result.as_ref().and_then(|r| r.first()) {
            Some(AbiToken::Uint(u)) => match (*u).try_into() {
                Ok(d) => d,
                Err(_) => {
                    debug!(
                        "Dropping {}: decimals {} do not fit u8",
                        address_to_string(address),
                        u
                    );
                    metrics::increment_tokens_dropped("invalid_decimals");
                    return None;
                }
            },
            _ => {
                metrics::increment_tokens_dropped("invalid_decimals");
                return None;
            }
        };

        Some(Token::new(self.chain_id, address, decimals, symbol))
    }
}

#[async_trait]
impl TokenProvider for OnChainTokenProvider {
    async fn get_tokens(&self, addresses: &[Address], block: Option<BlockId>) -> Result<TokenAccessor> {
        let addresses = dedupe(addresses);
        if addresses.is_empty() {
            return Ok(TokenAccessor::new());
        }

        let symbol_fn = IERC20METADATA_ABI.function("symbol")?;
        let decimals_fn = IERC20METADATA_ABI.function("decimals")?;

        let (symbols, decimals) = tokio::try_join!(
            self.caller
                .call_same_function_on_multiple_contracts(&addresses, symbol_fn, block),
            self.caller
                .call_same_function_on_multiple_contracts(&addresses, decimals_fn, block),
        )
        .context("Failed to fetch token metadata")?;

        if symbols.len() != addresses.len() || decimals.len() != addresses.len() {
            warn!(
                "Token metadata batch returned {} symbols and {} decimals for {} addresses",
                symbols.len(),
                decimals.len(),
                addresses.len()
            );
        }

        let mut accessor = TokenAccessor::new();
        for ((address, symbol), decimals) in addresses.iter().zip(symbols.iter()).zip(decimals.iter()) {
            if let Some(token) = self.validate(*address, symbol, decimals) {
                accessor.insert(token);
            }
        }

        info!(
            "Got token symbol and decimals for {} out of {} tokens on-chain",
            accessor.len(),
            addresses.len()
        );
        Ok(accessor)
    }
}

/// Cache-first resolver with ordered fallback tiers.
pub struct CachingTokenProvider {
    chain: Arc<ChainConfig>,
    cache: Arc<dyn Cache<Token>>,
    providers: Vec<Arc<dyn TokenProvider>>,
}

impl CachingTokenProvider {
    pub fn new(
        chain: Arc<ChainConfig>,
        cache: Arc<dyn Cache<Token>>,
        primary: Arc<dyn TokenProvider>,
        fallbacks: Vec<Arc<dyn TokenProvider>>,
    ) -> Self {
        let mut providers = Vec::with_capacity(1 + fallbacks.len());
        providers.push(primary);
        providers.extend(fallbacks);
        Self {
            chain,
            cache,
            providers,
        }
    }

    fn cache_key(&self, address: &Address) -> String {
        token_cache_key(self.chain.chain_id, address)
    }

    async fn seed_cache(&self) -> Result<()> {
        for token in &self.chain.seed_tokens {
            self.cache
                .set(&self.cache_key(&token.address), token.clone())
                .await?;
        }
        Ok(())
    }

    /// Resolves raw string inputs. Unparsable entries are dropped, the rest are lowercased
    /// and deduplicated before resolution.
    pub async fn get_tokens_by_str<S: AsRef<str>>(
        &self,
        inputs: &[S],
        block: Option<BlockId>,
    ) -> Result<TokenAccessor> {
        let addresses = normalize_addresses(inputs);
        self.get_tokens(&addresses, block).await
    }
}

#[async_trait]
impl TokenProvider for CachingTokenProvider {
    async fn get_tokens(&self, addresses: &[Address], block: Option<BlockId>) -> Result<TokenAccessor> {
        self.seed_cache().await?;

        let addresses = dedupe(addresses);
        let mut accessor = TokenAccessor::new();
        let mut pending: Vec<Address> = Vec::new();

        for address in &addresses {
            match self.cache.get(&self.cache_key(address)).await? {
                Some(token) => accessor.insert(token),
                None => pending.push(*address),
            }
        }
        metrics::increment_tokens_resolved("cache", accessor.len());
        info!(
            "Found {} out of {} tokens in local cache on chain {}",
            accessor.len(),
            addresses.len(),
            self.chain.chain_id
        );

        for (tier, provider) in self.providers.iter().enumerate() {
            if pending.is_empty() {
                break;
            }
            let tier_label = if tier == 0 { "primary" } else { "fallback" };

            let resolved = match provider.get_tokens(&pending, block).await {
                Ok(resolved) => resolved,
                Err(e) if tier == 0 => {
                    return Err(e.context(format!(
                        "Primary token provider failed for {} tokens",
                        pending.len()
                    )))
                }
                Err(e) => {
                    warn!(
                        "Fallback token provider #{} failed for {} tokens: {:#}",
                        tier,
                        pending.len(),
                        e
                    );
                    continue;
                }
            };

            let mut unresolved = Vec::new();
            let mut found = 0;
            for address in pending {
                match resolved.get_token(&address) {
                    Some(token) => {
                        self.cache.set(&self.cache_key(&address), token.clone()).await?;
                        accessor.insert(token.clone());
                        found += 1;
                    }
                    None => unresolved.push(address),
                }
            }
            metrics::increment_tokens_resolved(tier_label, found);
            info!(
                "Found {} tokens in {} provider #{}, {} still unresolved",
                found,
                tier_label,
                tier,
                unresolved.len()
            );
            pending = unresolved;
        }

        if !pending.is_empty() {
            debug!(
                "Omitting {} unresolved tokens: {:?}",
                pending.len(),
                pending.iter().map(|a| address_to_string(*a)).collect::<Vec<_>>()
            );
        }

        Ok(accessor)
    }
}
