//! # Candidate Pool Generator
//!
//! Builds the set of pools worth quoting for a (tokenIn, tokenOut) request when no live
//! pool index is available. Pairs are formed from the chain's curated base tokens and the
//! requested tokens, expanded per V3 fee tier, canonicalized and deduplicated by their
//! CREATE2 address.
//!
//! Emitted records mirror what a live indexing service returns (pool id, token ids, fee
//! tier, liquidity). The liquidity and TVL figures are proxies only: V2 candidates carry a
//! fixed placeholder and V3 candidates reuse in-range liquidity as TVL.

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, BlockId};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::chains::{ChainConfig, ChainRegistry};
use crate::metrics;
use crate::pool_provider::V3PoolProvider;
use crate::pools::{compute_v2_pair_address, compute_v3_pool_address, FeeAmount, Protocol};
use crate::types::conversions::address_to_string;
use crate::types::{sort_tokens, Token};

/// Placeholder liquidity reported for V2 candidates, whose reserves are not read.
const V2_PLACEHOLDER_LIQUIDITY: &str = "100";
const V2_PLACEHOLDER_TVL: f64 = 100.0;

/// Why a pair was considered. Ordered by generation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    BaseBase,
    Direct,
    TokenInBase,
    TokenOutBase,
}

impl std::fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SelectionReason::BaseBase => "base_base",
            SelectionReason::Direct => "direct",
            SelectionReason::TokenInBase => "token_in_base",
            SelectionReason::TokenOutBase => "token_out_base",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedToken {
    pub id: String,
}

/// Pool record shaped like a live indexing service entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedPool {
    pub id: String,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_tier: Option<u32>,
    pub token0: IndexedToken,
    pub token1: IndexedToken,
    pub liquidity: String,
    #[serde(rename = "tvlETH")]
    pub tvl_native: f64,
    #[serde(rename = "tvlUSD")]
    pub tvl_usd: f64,
}

impl IndexedPool {
    fn v2(address: Address, a: &Token, b: &Token) -> Self {
        let (token0, token1) = sort_tokens(a, b);
        Self {
            id: address_to_string(address),
            protocol: Protocol::V2,
            fee_tier: None,
            token0: IndexedToken { id: token0.address_key() },
            token1: IndexedToken { id: token1.address_key() },
            liquidity: V2_PLACEHOLDER_LIQUIDITY.to_string(),
            tvl_native: V2_PLACEHOLDER_TVL,
            tvl_usd: V2_PLACEHOLDER_TVL,
        }
    }

    fn v3(address: Address, a: &Token, b: &Token, fee: FeeAmount, liquidity: u128) -> Self {
        let (token0, token1) = sort_tokens(a, b);
        let tvl_proxy = liquidity as f64;
        Self {
            id: address_to_string(address),
            protocol: Protocol::V3,
            fee_tier: Some(fee.fee()),
            token0: IndexedToken { id: token0.address_key() },
            token1: IndexedToken { id: token1.address_key() },
            liquidity: liquidity.to_string(),
            tvl_native: tvl_proxy,
            tvl_usd: tvl_proxy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePool {
    pub pool: IndexedPool,
    pub reason: SelectionReason,
}

/// Deduplicated candidate pools for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidatePoolSet {
    pub chain_id: u64,
    pub pools: Vec<CandidatePool>,
}

impl CandidatePoolSet {
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn by_reason(&self, reason: SelectionReason) -> Vec<&CandidatePool> {
        self.pools.iter().filter(|p| p.reason == reason).collect()
    }

    pub fn by_protocol(&self, protocol: Protocol) -> Vec<&CandidatePool> {
        self.pools.iter().filter(|p| p.pool.protocol == protocol).collect()
    }

    pub fn contains(&self, address: &Address) -> bool {
        let id = address_to_string(*address);
        self.pools.iter().any(|p| p.pool.id == id)
    }
}

/// All ordered pairs in generation order, self-pairs included.
///
/// base×base first; then, when both requested tokens are present, the direct pair,
/// tokenIn×base and tokenOut×base.
pub fn expand_pairs(
    bases: &[Token],
    token_in: Option<&Token>,
    token_out: Option<&Token>,
) -> Vec<(Token, Token, SelectionReason)> {
    let mut pairs = Vec::with_capacity(bases.len() * bases.len() + 2 * bases.len() + 1);
    for base in bases {
        for other in bases {
            pairs.push((base.clone(), other.clone(), SelectionReason::BaseBase));
        }
    }
    if let (Some(token_in), Some(token_out)) = (token_in, token_out) {
        pairs.push((token_in.clone(), token_out.clone(), SelectionReason::Direct));
        for base in bases {
            pairs.push((token_in.clone(), base.clone(), SelectionReason::TokenInBase));
        }
        for base in bases {
            pairs.push((token_out.clone(), base.clone(), SelectionReason::TokenOutBase));
        }
    }
    pairs
}

/// Drops pairs whose two sides are the same token.
pub fn without_self_pairs(
    pairs: Vec<(Token, Token, SelectionReason)>,
) -> Vec<(Token, Token, SelectionReason)> {
    pairs
        .into_iter()
        .filter(|(a, b, _)| a.address != b.address && a != b)
        .collect()
}

/// Source of candidate pools: a live index or the static generator.
#[async_trait]
pub trait PoolIndexProvider: Send + Sync {
    async fn get_pools(
        &self,
        chain_id: u64,
        token_in: Option<&Token>,
        token_out: Option<&Token>,
    ) -> Result<CandidatePoolSet>;
}

pub struct CandidatePoolGenerator {
    registry: Arc<ChainRegistry>,
    v3_pool_providers: HashMap<u64, Arc<dyn V3PoolProvider>>,
    protocols: Vec<Protocol>,
    block: Option<BlockId>,
}

impl CandidatePoolGenerator {
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self {
            registry,
            v3_pool_providers: HashMap::new(),
            protocols: vec![Protocol::V2, Protocol::V3],
            block: None,
        }
    }

    /// Pool-existence collaborator used to confirm V3 candidates on `chain_id`.
    pub fn with_v3_pool_provider(mut self, chain_id: u64, provider: Arc<dyn V3PoolProvider>) -> Self {
        self.v3_pool_providers.insert(chain_id, provider);
        self
    }

    /// Restricts generation to the given protocols. `Mixed` has no pools of its own.
    pub fn with_protocols(mut self, protocols: &[Protocol]) -> Self {
        self.protocols = protocols
            .iter()
            .copied()
            .filter(|p| *p != Protocol::Mixed)
            .collect();
        self
    }

    pub fn at_block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    pub async fn generate(
        &self,
        chain_id: u64,
        token_in: Option<&Token>,
        token_out: Option<&Token>,
    ) -> Result<CandidatePoolSet> {
        let chain = self.registry.get(chain_id)?;
        let raw_pairs = expand_pairs(&chain.base_tokens, token_in, token_out);
        let raw_count = raw_pairs.len();
        let pairs = without_self_pairs(raw_pairs);
        debug!(
            "Expanded {} ordered pairs into {} non-self pairs on chain {}",
            raw_count,
            pairs.len(),
            chain_id
        );

        let mut set = CandidatePoolSet {
            chain_id,
            pools: Vec::new(),
        };

        if self.protocols.contains(&Protocol::V2) {
            set.pools.extend(self.v2_candidates(&chain, &pairs));
        }
        if self.protocols.contains(&Protocol::V3) {
            set.pools.extend(self.v3_candidates(&chain, &pairs).await?);
        }

        record_metrics(&set);
        info!(
            "Generated {} candidate pools on chain {} ({} v2, {} v3)",
            set.len(),
            chain_id,
            set.by_protocol(Protocol::V2).len(),
            set.by_protocol(Protocol::V3).len()
        );
        Ok(set)
    }

    fn v2_candidates(
        &self,
        chain: &ChainConfig,
        pairs: &[(Token, Token, SelectionReason)],
    ) -> Vec<CandidatePool> {
        let deployment = match &chain.v2 {
            Some(d) => d,
            None => return Vec::new(),
        };
        let mut seen: HashSet<Address> = HashSet::new();
        pairs
            .iter()
            .filter_map(|(a, b, reason)| {
                let address = compute_v2_pair_address(deployment, a, b);
                if !seen.insert(address) {
                    return None;
                }
                Some(CandidatePool {
                    pool: IndexedPool::v2(address, a, b),
                    reason: *reason,
                })
            })
            .collect()
    }

    async fn v3_candidates(
        &self,
        chain: &ChainConfig,
        pairs: &[(Token, Token, SelectionReason)],
    ) -> Result<Vec<CandidatePool>> {
        let deployment = match &chain.v3 {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };
        let provider = match self.v3_pool_providers.get(&chain.chain_id) {
            Some(p) => p,
            None => {
                warn!(
                    "No V3 pool provider for chain {}, skipping V3 candidates",
                    chain.chain_id
                );
                return Ok(Vec::new());
            }
        };

        let mut seen: HashSet<Address> = HashSet::new();
        let mut unique: Vec<(Address, &Token, &Token, FeeAmount, SelectionReason)> = Vec::new();
        for (a, b, reason) in pairs {
            for fee in FeeAmount::ALL {
                let address = compute_v3_pool_address(deployment, a, b, fee);
                if seen.insert(address) {
                    unique.push((address, a, b, fee, *reason));
                }
            }
        }

        let request: Vec<(Token, Token, FeeAmount)> = unique
            .iter()
            .map(|(_, a, b, fee, _)| ((*a).clone(), (*b).clone(), *fee))
            .collect();
        debug!(
            "V3 candidate generation about to check {} pools on chain {}",
            request.len(),
            chain.chain_id
        );
        let accessor = provider.get_pools(&request, self.block).await?;

        let mut missing = 0;
        let mut out = Vec::with_capacity(accessor.len());
        for (address, a, b, fee, reason) in unique {
            match accessor.get_pool(a, b, fee) {
                Some(pool) => out.push(CandidatePool {
                    pool: IndexedPool::v3(address, a, b, fee, pool.liquidity),
                    reason,
                }),
                None => missing += 1,
            }
        }
        if missing > 0 {
            debug!("{} V3 candidates have no live pool and were excluded", missing);
            metrics::increment_candidate_pools_missing(missing);
        }
        Ok(out)
    }
}

fn record_metrics(set: &CandidatePoolSet) {
    let mut counts: HashMap<(Protocol, SelectionReason), usize> = HashMap::new();
    for candidate in &set.pools {
        *counts
            .entry((candidate.pool.protocol, candidate.reason))
            .or_insert(0) += 1;
    }
    for ((protocol, reason), count) in counts {
        metrics::increment_candidate_pools(&protocol.to_string(), &reason.to_string(), count);
    }
}

#[async_trait]
impl PoolIndexProvider for CandidatePoolGenerator {
    async fn get_pools(
        &self,
        chain_id: u64,
        token_in: Option<&Token>,
        token_out: Option<&Token>,
    ) -> Result<CandidatePoolSet> {
        self.generate(chain_id, token_in, token_out).await
    }
}

/// Queries a live index first and falls back to another source when the live index fails
/// or returns nothing.
pub struct FallbackPoolIndex {
    live: Arc<dyn PoolIndexProvider>,
    fallback: Arc<dyn PoolIndexProvider>,
}

impl FallbackPoolIndex {
    pub fn new(live: Arc<dyn PoolIndexProvider>, fallback: Arc<dyn PoolIndexProvider>) -> Self {
        Self { live, fallback }
    }
}

#[async_trait]
impl PoolIndexProvider for FallbackPoolIndex {
    async fn get_pools(
        &self,
        chain_id: u64,
        token_in: Option<&Token>,
        token_out: Option<&Token>,
    ) -> Result<CandidatePoolSet> {
        match self.live.get_pools(chain_id, token_in, token_out).await {
            Ok(set) if !set.is_empty() => return Ok(set),
            Ok(_) => info!("Live pool index returned no pools for chain {}, using fallback", chain_id),
            Err(e) => warn!("Live pool index failed for chain {}: {:#}, using fallback", chain_id, e),
        }
        self.fallback.get_pools(chain_id, token_in, token_out).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{ROLLUX, MAINNET};

    #[test]
    fn expansion_counts() {
        let registry = ChainRegistry::builtin();
        let chain = registry.get(ROLLUX).unwrap();
        let raw = expand_pairs(&chain.base_tokens, None, None);
        assert_eq!(raw.len(), 16);
        assert_eq!(without_self_pairs(raw).len(), 12);

        let token_in = &chain.base_tokens[0];
        let token_out = &chain.base_tokens[1];
        let with_request = expand_pairs(&chain.base_tokens, Some(token_in), Some(token_out));
        assert_eq!(with_request.len(), 16 + 1 + 4 + 4);
        assert_eq!(with_request[16].2, SelectionReason::Direct);
    }

    #[test]
    fn one_sided_request_adds_nothing() {
        let registry = ChainRegistry::builtin();
        let chain = registry.get(ROLLUX).unwrap();
        let raw = expand_pairs(&chain.base_tokens, Some(&chain.base_tokens[0]), None);
        assert_eq!(raw.len(), 16);
    }

    #[test]
    fn indexed_pool_json_matches_index_shape() {
        let chain = ChainRegistry::builtin().get(MAINNET).unwrap();
        let (a, b) = (&chain.base_tokens[0], &chain.base_tokens[1]);
        let address = compute_v3_pool_address(chain.v3.as_ref().unwrap(), a, b, FeeAmount::Low);
        let json = serde_json::to_value(IndexedPool::v3(address, a, b, FeeAmount::Low, 42)).unwrap();
        assert_eq!(json["feeTier"], 500);
        assert_eq!(json["liquidity"], "42");
        assert_eq!(json["tvlUSD"], 42.0);
        assert_eq!(json["protocol"], "v3");
        assert!(json["token0"]["id"].is_string());

        let v2 = serde_json::to_value(IndexedPool::v2(address, a, b)).unwrap();
        assert!(v2.get("feeTier").is_none());
    }

    #[tokio::test]
    async fn v2_candidates_are_unique_and_self_pair_free() {
        let registry = Arc::new(ChainRegistry::builtin());
        let generator = CandidatePoolGenerator::new(registry).with_protocols(&[Protocol::V2]);
        let set = generator.generate(MAINNET, None, None).await.unwrap();
        assert_eq!(set.len(), 6);
        let ids: HashSet<&String> = set.pools.iter().map(|p| &p.pool.id).collect();
        assert_eq!(ids.len(), 6);
        assert!(set.pools.iter().all(|p| p.pool.token0.id != p.pool.token1.id));
        assert!(set.pools.iter().all(|p| p.pool.token0.id < p.pool.token1.id));
    }
}
