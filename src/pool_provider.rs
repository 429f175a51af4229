//! On-chain pool snapshot collaborators.
//!
//! Pool addresses are derived locally with CREATE2, so a provider only needs the token
//! pair (and fee tier for V3) to read a pool. Pools that do not exist, revert, or are not
//! initialized are left out of the accessor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::abi::Token as AbiToken;
use ethers::types::{Address, BlockId};
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

use crate::chains::ChainConfig;
use crate::contracts::{IUNISWAPV2PAIR_ABI, IUNISWAPV3POOL_ABI};
use crate::multicall::{BatchCaller, CallOutcome};
use crate::pools::{compute_v2_pair_address, compute_v3_pool_address, FeeAmount, V2Pool, V3Pool};
use crate::types::{sort_tokens, Token};

type PairKey = (Address, Address);

fn pair_key(a: &Token, b: &Token) -> PairKey {
    let (token0, token1) = sort_tokens(a, b);
    (token0.address, token1.address)
}

fn uint_at(outcome: &CallOutcome, index: usize) -> Option<ethers::types::U256> {
    match outcome.result.as_ref()?.get(index)? {
        AbiToken::Uint(u) => Some(*u),
        _ => None,
    }
}

fn int_at(outcome: &CallOutcome, index: usize) -> Option<i32> {
    match outcome.result.as_ref()?.get(index)? {
        // int24 arrives sign-extended to 256 bits; the low word keeps the sign
        AbiToken::Int(i) => Some(i.low_u32() as i32),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct V3PoolAccessor {
    by_key: HashMap<(Address, Address, FeeAmount), V3Pool>,
}

impl V3PoolAccessor {
    pub fn from_pools<I: IntoIterator<Item = V3Pool>>(pools: I) -> Self {
        let by_key = pools
            .into_iter()
            .map(|p| ((p.token0.address, p.token1.address, p.fee), p))
            .collect();
        Self { by_key }
    }

    pub fn get_pool(&self, a: &Token, b: &Token, fee: FeeAmount) -> Option<&V3Pool> {
        let (t0, t1) = pair_key(a, b);
        self.by_key.get(&(t0, t1, fee))
    }

    pub fn get_pool_by_address(&self, address: &Address) -> Option<&V3Pool> {
        self.by_key.values().find(|p| p.address == *address)
    }

    pub fn get_all_pools(&self) -> Vec<&V3Pool> {
        self.by_key.values().collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct V2PoolAccessor {
    by_key: HashMap<PairKey, V2Pool>,
}

impl V2PoolAccessor {
    pub fn from_pools<I: IntoIterator<Item = V2Pool>>(pools: I) -> Self {
        let by_key = pools
            .into_iter()
            .map(|p| ((p.token0.address, p.token1.address), p))
            .collect();
        Self { by_key }
    }

    pub fn get_pool(&self, a: &Token, b: &Token) -> Option<&V2Pool> {
        self.by_key.get(&pair_key(a, b))
    }

    pub fn get_all_pools(&self) -> Vec<&V2Pool> {
        self.by_key.values().collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Confirms existence and reads state of V3 pools.
#[async_trait]
pub trait V3PoolProvider: Send + Sync {
    async fn get_pools(
        &self,
        pairs: &[(Token, Token, FeeAmount)],
        block: Option<BlockId>,
    ) -> Result<V3PoolAccessor>;
}

/// Reads reserves of V2 pairs.
#[async_trait]
pub trait V2PoolProvider: Send + Sync {
    async fn get_pools(&self, pairs: &[(Token, Token)], block: Option<BlockId>) -> Result<V2PoolAccessor>;
}

pub struct OnChainV3PoolProvider {
    chain: Arc<ChainConfig>,
    caller: Arc<dyn BatchCaller>,
}

impl OnChainV3PoolProvider {
    pub fn new(chain: Arc<ChainConfig>, caller: Arc<dyn BatchCaller>) -> Self {
        Self { chain, caller }
    }
}

#[async_trait]
impl V3PoolProvider for OnChainV3PoolProvider {
    async fn get_pools(
        &self,
        pairs: &[(Token, Token, FeeAmount)],
        block: Option<BlockId>,
    ) -> Result<V3PoolAccessor> {
        let deployment = match self.chain.v3 {
            Some(d) => d,
            None => return Ok(V3PoolAccessor::default()),
        };

        let mut seen = HashMap::new();
        let mut requests: Vec<(Address, &Token, &Token, FeeAmount)> = Vec::new();
        for (a, b, fee) in pairs {
            let address = compute_v3_pool_address(&deployment, a, b, *fee);
            if seen.insert(address, ()).is_none() {
                requests.push((address, a, b, *fee));
            }
        }
        if requests.is_empty() {
            return Ok(V3PoolAccessor::default());
        }
        let addresses: Vec<Address> = requests.iter().map(|r| r.0).collect();

        let slot0_fn = IUNISWAPV3POOL_ABI.function("slot0")?;
        let liquidity_fn = IUNISWAPV3POOL_ABI.function("liquidity")?;
        let (slot0s, liquidities) = tokio::try_join!(
            self.caller
                .call_same_function_on_multiple_contracts(&addresses, slot0_fn, block),
            self.caller
                .call_same_function_on_multiple_contracts(&addresses, liquidity_fn, block),
        )
        .context("Failed to fetch V3 pool state")?;

        let mut pools = Vec::with_capacity(requests.len());
        for (((_, a, b, fee), slot0), liquidity) in requests.iter().zip(slot0s.iter()).zip(liquidities.iter()) {
            if !slot0.success || !liquidity.success {
                continue;
            }
            let (sqrt_price_x96, tick, liquidity) =
                match (uint_at(slot0, 0), int_at(slot0, 1), uint_at(liquidity, 0)) {
                    (Some(s), Some(t), Some(l)) => (s, t, l.low_u128()),
                    _ => continue,
                };
            if sqrt_price_x96.is_zero() {
                debug!("Skipping uninitialized V3 pool {}/{} fee {}", a.symbol, b.symbol, fee.fee());
                continue;
            }
            pools.push(V3Pool::new(
                &deployment,
                (*a).clone(),
                (*b).clone(),
                *fee,
                sqrt_price_x96,
                liquidity,
                tick,
            ));
        }

        info!(
            "Got V3 pool state for {} out of {} pools on chain {}",
            pools.len(),
            requests.len(),
            self.chain.chain_id
        );
        Ok(V3PoolAccessor::from_pools(pools))
    }
}

pub struct OnChainV2PoolProvider {
    chain: Arc<ChainConfig>,
    caller: Arc<dyn BatchCaller>,
}

impl OnChainV2PoolProvider {
    pub fn new(chain: Arc<ChainConfig>, caller: Arc<dyn BatchCaller>) -> Self {
        Self { chain, caller }
    }
}

#[async_trait]
impl V2PoolProvider for OnChainV2PoolProvider {
    async fn get_pools(&self, pairs: &[(Token, Token)], block: Option<BlockId>) -> Result<V2PoolAccessor> {
        let deployment = match self.chain.v2 {
            Some(d) => d,
            None => return Ok(V2PoolAccessor::default()),
        };

        let mut seen = HashMap::new();
        let mut requests: Vec<(Address, &Token, &Token)> = Vec::new();
        for (a, b) in pairs {
            let address = compute_v2_pair_address(&deployment, a, b);
            if seen.insert(address, ()).is_none() {
                requests.push((address, a, b));
            }
        }
        if requests.is_empty() {
            return Ok(V2PoolAccessor::default());
        }
        let addresses: Vec<Address> = requests.iter().map(|r| r.0).collect();

        let reserves_fn = IUNISWAPV2PAIR_ABI.function("getReserves")?;
        let outcomes = self
            .caller
            .call_same_function_on_multiple_contracts(&addresses, reserves_fn, block)
            .await
            .context("Failed to fetch V2 reserves")?;

        let mut pools = Vec::with_capacity(requests.len());
        for ((_, a, b), outcome) in requests.iter().zip(outcomes.iter()) {
            let (r0, r1) = match (uint_at(outcome, 0), uint_at(outcome, 1)) {
                (Some(r0), Some(r1)) => (r0, r1),
                _ => continue,
            };
            if r0.is_zero() || r1.is_zero() {
                continue;
            }
            // Reserves come back in token0/token1 order
            let (token0, token1) = sort_tokens(a, b);
            pools.push(V2Pool::new(&deployment, token0.clone(), token1.clone(), r0, r1));
        }

        info!(
            "Got V2 reserves for {} out of {} pairs on chain {}",
            pools.len(),
            requests.len(),
            self.chain.chain_id
        );
        Ok(V2PoolAccessor::from_pools(pools))
    }
}
