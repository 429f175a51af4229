//! # Gas Model Factory
//!
//! A [`GasModel`] is built once per request by a [`GasModelFactory`]. Building is the only
//! I/O-bearing step: it snapshots the conversion pools (native ↔ quote token, native ↔ USD
//! gas token) and, on rollups, the L1 fee parameters. The resulting model is a plain value
//! whose [`GasModel::estimate_cost`] is synchronous and side-effect free, so it can score
//! every candidate route without further round trips.
//!
//! ```text
//! gas_units = base_swap_cost + cost_per_hop × hops
//!           + cost_per_init_tick × initialized_ticks_crossed
//!           + cost_per_uninit_tick × uninitialized_ticks_crossed
//! cost_native = gas_units × gas_price
//! ```

pub mod l2;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::{BlockId, U256};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chains::{ChainConfig, GasCosts};
use crate::metrics;
use crate::pool_provider::{V2PoolAccessor, V2PoolProvider, V3PoolAccessor, V3PoolProvider};
use crate::pools::{FeeAmount, Pool};
use crate::router::QuotedRoute;
use crate::types::{CurrencyAmount, Token};

pub use l2::{L2GasDataProvider, LayeredChainGasData};

/// Inputs for building a gas model.
#[derive(Clone)]
pub struct GasModelContext {
    pub chain: Arc<ChainConfig>,
    pub gas_price_wei: U256,
    /// Token the route's quote is denominated in.
    pub quote_token: Token,
    pub v3_pool_provider: Arc<dyn V3PoolProvider>,
    pub v2_pool_provider: Option<Arc<dyn V2PoolProvider>>,
    pub l2_gas_data_provider: Option<Arc<dyn L2GasDataProvider>>,
    pub block: Option<BlockId>,
}

/// Per-route gas estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasCostEstimate {
    pub gas_units: U256,
    pub cost_in_native: CurrencyAmount,
    pub cost_in_quote_token: CurrencyAmount,
    pub cost_in_fiat: CurrencyAmount,
}

/// Extra data-publication cost for a batch of routes on a rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayeredFeeCost {
    pub l1_gas_used: U256,
    pub fee_in_native: CurrencyAmount,
    pub fee_in_quote_token: CurrencyAmount,
    pub fee_in_fiat: CurrencyAmount,
}

/// How native-token amounts are converted into another token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeConversion {
    /// The target is the wrapped native token itself.
    Identity,
    Pool(Pool),
    /// No pool connects the native token to the target; costs convert to zero.
    Unavailable,
}

impl NativeConversion {
    fn convert(&self, native: &Token, amount: U256) -> U256 {
        match self {
            NativeConversion::Identity => amount,
            NativeConversion::Pool(pool) => pool.convert_amount(native, amount).unwrap_or_default(),
            NativeConversion::Unavailable => U256::zero(),
        }
    }
}

#[async_trait]
pub trait GasModelFactory: Send + Sync {
    async fn build_gas_model(&self, ctx: &GasModelContext) -> Result<GasModel>;
}

/// Immutable per-request cost model.
#[derive(Debug, Clone)]
pub struct GasModel {
    chain_id: u64,
    gas_costs: GasCosts,
    gas_price_wei: U256,
    native: Token,
    quote_token: Token,
    usd_token: Token,
    quote_conversion: NativeConversion,
    usd_conversion: NativeConversion,
    l2_gas_data: Option<LayeredChainGasData>,
}

impl GasModel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: &ChainConfig,
        gas_price_wei: U256,
        quote_token: Token,
        usd_token: Token,
        quote_conversion: NativeConversion,
        usd_conversion: NativeConversion,
        l2_gas_data: Option<LayeredChainGasData>,
    ) -> Self {
        Self {
            chain_id: chain.chain_id,
            gas_costs: chain.gas_costs,
            gas_price_wei,
            native: chain.wrapped_native.clone(),
            quote_token,
            usd_token,
            quote_conversion,
            usd_conversion,
            l2_gas_data,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn gas_price_wei(&self) -> U256 {
        self.gas_price_wei
    }

    pub fn quote_token(&self) -> &Token {
        &self.quote_token
    }

    pub fn usd_token(&self) -> &Token {
        &self.usd_token
    }

    pub fn quote_conversion(&self) -> &NativeConversion {
        &self.quote_conversion
    }

    pub fn gas_units(&self, route: &QuotedRoute) -> U256 {
        let costs = &self.gas_costs;
        U256::from(costs.base_swap_cost)
            + U256::from(costs.cost_per_hop) * U256::from(route.route.hops())
            + U256::from(costs.cost_per_init_tick) * U256::from(route.initialized_ticks_crossed)
            + U256::from(costs.cost_per_uninit_tick) * U256::from(route.uninitialized_ticks_crossed)
    }

    fn priced(&self, native_amount: U256) -> (CurrencyAmount, CurrencyAmount, CurrencyAmount) {
        (
            CurrencyAmount::new(self.native.clone(), native_amount),
            CurrencyAmount::new(
                self.quote_token.clone(),
                self.quote_conversion.convert(&self.native, native_amount),
            ),
            CurrencyAmount::new(
                self.usd_token.clone(),
                self.usd_conversion.convert(&self.native, native_amount),
            ),
        )
    }

    pub fn estimate_cost(&self, route: &QuotedRoute) -> GasCostEstimate {
        let gas_units = self.gas_units(route);
        let cost_native = gas_units.saturating_mul(self.gas_price_wei);
        let (cost_in_native, cost_in_quote_token, cost_in_fiat) = self.priced(cost_native);
        GasCostEstimate {
            gas_units,
            cost_in_native,
            cost_in_quote_token,
            cost_in_fiat,
        }
    }

    /// L1 data fee for publishing the combined calldata of `routes`. `None` on chains
    /// without a layered gas snapshot or for an empty batch.
    pub fn aggregate_layered_chain_fees(&self, routes: &[QuotedRoute]) -> Option<LayeredFeeCost> {
        let gas_data = self.l2_gas_data.as_ref()?;
        if routes.is_empty() {
            return None;
        }
        let calldata: Vec<u8> = routes.iter().flat_map(l2::route_calldata).collect();
        let (l1_gas_used, fee_native) = gas_data.l1_fee(&calldata);
        let (fee_in_native, fee_in_quote_token, fee_in_fiat) = self.priced(fee_native);
        Some(LayeredFeeCost {
            l1_gas_used,
            fee_in_native,
            fee_in_quote_token,
            fee_in_fiat,
        })
    }
}

fn best_v3_pool(accessor: &V3PoolAccessor, native: &Token, token: &Token) -> Option<Pool> {
    FeeAmount::ALL
        .iter()
        .filter_map(|fee| accessor.get_pool(native, token, *fee))
        .max_by_key(|p| p.liquidity)
        .cloned()
        .map(Pool::V3)
}

fn best_v2_pool(accessor: &V2PoolAccessor, native: &Token, token: &Token) -> Option<Pool> {
    accessor
        .get_pool(native, token)
        .cloned()
        .map(Pool::V2)
}

fn pool_liquidity(pool: &Pool, native: &Token) -> U256 {
    match pool {
        Pool::V3(p) => U256::from(p.liquidity),
        Pool::V2(p) => p.reserve_of(native).unwrap_or_default(),
    }
}

/// Picks the most liquid conversion pool for `token`, preferring V3 over V2.
fn conversion_for(
    v3: &V3PoolAccessor,
    v2: Option<&V2PoolAccessor>,
    native: &Token,
    token: &Token,
) -> NativeConversion {
    if token == native {
        return NativeConversion::Identity;
    }
    best_v3_pool(v3, native, token)
        .or_else(|| v2.and_then(|acc| best_v2_pool(acc, native, token)))
        .map(NativeConversion::Pool)
        .unwrap_or(NativeConversion::Unavailable)
}

/// Builds models from on-chain pool snapshots and the chain's gas constants.
#[derive(Debug, Clone, Default)]
pub struct HeuristicGasModelFactory;

impl HeuristicGasModelFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GasModelFactory for HeuristicGasModelFactory {
    async fn build_gas_model(&self, ctx: &GasModelContext) -> Result<GasModel> {
        let chain = &ctx.chain;
        let native = &chain.wrapped_native;
        if chain.usd_gas_tokens.is_empty() {
            return Err(anyhow!("Chain {} has no USD gas tokens configured", chain.chain_id));
        }

        // Every token the model may convert into, paired with the native token
        let mut targets: Vec<&Token> = chain.usd_gas_tokens.iter().collect();
        if ctx.quote_token != *native && !targets.contains(&&ctx.quote_token) {
            targets.push(&ctx.quote_token);
        }
        let v3_pairs: Vec<(Token, Token, FeeAmount)> = targets
            .iter()
            .flat_map(|t| FeeAmount::ALL.iter().map(move |fee| (native.clone(), (*t).clone(), *fee)))
            .collect();
        let v2_pairs: Vec<(Token, Token)> = targets
            .iter()
            .map(|t| (native.clone(), (*t).clone()))
            .collect();

        let v3_fut = ctx.v3_pool_provider.get_pools(&v3_pairs, ctx.block);
        let v2_fut = async {
            match &ctx.v2_pool_provider {
                Some(provider) => provider.get_pools(&v2_pairs, ctx.block).await.map(Some),
                None => Ok(None),
            }
        };
        let l2_fut = async {
            match (chain.layered, &ctx.l2_gas_data_provider) {
                (Some(_), Some(provider)) => provider.get_gas_data(ctx.block).await.map(Some),
                (Some(kind), None) => {
                    warn!(
                        "Chain {} is a {:?} rollup but no L2 gas data provider was supplied",
                        chain.chain_id, kind
                    );
                    Ok(None)
                }
                (None, _) => Ok(None),
            }
        };
        let (v3_pools, v2_pools, l2_gas_data) = tokio::try_join!(v3_fut, v2_fut, l2_fut)?;

        let quote_conversion = conversion_for(&v3_pools, v2_pools.as_ref(), native, &ctx.quote_token);
        if quote_conversion == NativeConversion::Unavailable {
            warn!(
                "No {}/{} pool found, gas costs in {} will be zero",
                native.symbol, ctx.quote_token.symbol, ctx.quote_token.symbol
            );
            metrics::increment_gas_model_conversion_missing("quote");
        }

        let (usd_token, usd_pool) = chain
            .usd_gas_tokens
            .iter()
            .filter_map(|usd| {
                let pool = best_v3_pool(&v3_pools, native, usd)
                    .or_else(|| v2_pools.as_ref().and_then(|acc| best_v2_pool(acc, native, usd)))?;
                Some((usd.clone(), pool))
            })
            .max_by_key(|(_, pool)| pool_liquidity(pool, native))
            .ok_or_else(|| {
                metrics::increment_gas_model_conversion_missing("usd");
                anyhow!(
                    "Could not find a USD/{} pool for computing gas costs on chain {}",
                    native.symbol,
                    chain.chain_id
                )
            })?;
        debug!(
            "Gas model USD pool {:#x} ({} / {})",
            usd_pool.address(),
            native.symbol,
            usd_token.symbol
        );

        metrics::increment_gas_model_built(chain.chain_id);
        info!(
            "Built gas model for chain {} at gas price {} wei (quote {}, usd {}, layered data {})",
            chain.chain_id,
            ctx.gas_price_wei,
            ctx.quote_token.symbol,
            usd_token.symbol,
            l2_gas_data.is_some()
        );

        Ok(GasModel::new(
            chain,
            ctx.gas_price_wei,
            ctx.quote_token.clone(),
            usd_token,
            quote_conversion,
            NativeConversion::Pool(usd_pool),
            l2_gas_data,
        ))
    }
}
