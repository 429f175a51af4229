//! Layered-chain (rollup) data-publication fees.
//!
//! Rollups charge for publishing transaction calldata to L1 on top of L2 execution gas.
//! The fee parameters are read once per request from the chain's predeployed oracle and
//! applied to the combined calldata of the routes being scored.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::abi::Token as AbiToken;
use ethers::types::{Address, BlockId, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chains::LayeredChainKind;
use crate::contracts::{ARBGASINFO_ABI, GASPRICEORACLE_ABI};
use crate::multicall::{BatchCaller, CallOutcome};
use crate::router::QuotedRoute;

/// Fixed per-transaction calldata gas charged for the signature and envelope.
const TX_ENVELOPE_CALLDATA_GAS: u64 = 68 * 16;
const ZERO_BYTE_GAS: u64 = 4;
const NON_ZERO_BYTE_GAS: u64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayeredChainGasData {
    Optimism {
        l1_base_fee: U256,
        scalar: U256,
        decimals: U256,
        overhead: U256,
    },
    Arbitrum {
        per_l2_tx_fee: U256,
        per_l1_calldata_fee: U256,
        per_arb_gas_total: U256,
    },
}

/// Gas charged for publishing `data` to L1, before any fee multiplier.
pub fn calldata_gas(data: &[u8], overhead: U256) -> U256 {
    let zeros = data.iter().filter(|b| **b == 0).count() as u64;
    let non_zeros = data.len() as u64 - zeros;
    U256::from(zeros * ZERO_BYTE_GAS + non_zeros * NON_ZERO_BYTE_GAS + TX_ENVELOPE_CALLDATA_GAS)
        .saturating_add(overhead)
}

impl LayeredChainGasData {
    /// Returns `(l1_gas_used, fee_in_native_wei)` for publishing `data`.
    pub fn l1_fee(&self, data: &[u8]) -> (U256, U256) {
        match self {
            LayeredChainGasData::Optimism {
                l1_base_fee,
                scalar,
                decimals,
                overhead,
            } => {
                let l1_gas = calldata_gas(data, *overhead);
                let unscaled = l1_gas.saturating_mul(*l1_base_fee).saturating_mul(*scalar);
                let divisor = if decimals.is_zero() {
                    U256::one()
                } else {
                    U256::exp10(decimals.low_u32() as usize)
                };
                (l1_gas, unscaled / divisor)
            }
            LayeredChainGasData::Arbitrum {
                per_l2_tx_fee,
                per_l1_calldata_fee,
                ..
            } => {
                let l1_gas = calldata_gas(data, U256::zero());
                let fee = l1_gas
                    .saturating_mul(*per_l1_calldata_fee)
                    .saturating_add(*per_l2_tx_fee);
                (l1_gas, fee)
            }
        }
    }
}

/// Representative swap calldata for a quoted route: `exactInput((bytes,address,uint256,uint256))`
/// with the packed token/fee path, a zero recipient, the amount and the quote.
pub fn route_calldata(quoted: &QuotedRoute) -> Vec<u8> {
    let route = &quoted.route;
    let mut packed_path = Vec::with_capacity(20 + route.hops() * 23);
    packed_path.extend_from_slice(route.input().address.as_bytes());
    for (pool, next) in route.pools().iter().zip(route.path().iter().skip(1)) {
        let fee = pool.fee().to_be_bytes();
        packed_path.extend_from_slice(&fee[1..]);
        packed_path.extend_from_slice(next.address.as_bytes());
    }

    let selector = &keccak256("exactInput((bytes,address,uint256,uint256))")[..4];
    let params = ethers::abi::encode(&[AbiToken::Tuple(vec![
        AbiToken::Bytes(packed_path),
        AbiToken::Address(Address::zero()),
        AbiToken::Uint(quoted.amount.raw),
        AbiToken::Uint(quoted.quote.raw),
    ])]);

    let mut data = Vec::with_capacity(4 + params.len());
    data.extend_from_slice(selector);
    data.extend_from_slice(&params);
    data
}

#[async_trait]
pub trait L2GasDataProvider: Send + Sync {
    async fn get_gas_data(&self, block: Option<BlockId>) -> Result<LayeredChainGasData>;
}

fn required_uint(outcome: &CallOutcome, index: usize, label: &str) -> Result<U256> {
    match outcome.result.as_ref().and_then(|r| r.get(index)) {
        Some(AbiToken::Uint(u)) if outcome.success => Ok(*u),
        _ => Err(anyhow!("Gas oracle call '{}' failed or returned no value", label)),
    }
}

/// Reads the OP-stack `GasPriceOracle` predeploy.
pub struct OptimismGasDataProvider {
    oracle: Address,
    caller: Arc<dyn BatchCaller>,
}

impl OptimismGasDataProvider {
    pub fn new(caller: Arc<dyn BatchCaller>) -> Self {
        Self {
            oracle: LayeredChainKind::Optimism.gas_oracle_address(),
            caller,
        }
    }
}

#[async_trait]
impl L2GasDataProvider for OptimismGasDataProvider {
    async fn get_gas_data(&self, block: Option<BlockId>) -> Result<LayeredChainGasData> {
        let names = ["l1BaseFee", "scalar", "decimals", "overhead"];
        let functions = names
            .iter()
            .map(|n| GASPRICEORACLE_ABI.function(n))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let outcomes = self
            .caller
            .call_multiple_functions_on_same_contract(self.oracle, &functions, block)
            .await
            .context("Failed to read OP-stack gas price oracle")?;
        if outcomes.len() != names.len() {
            return Err(anyhow!("Gas price oracle returned {} results", outcomes.len()));
        }
        Ok(LayeredChainGasData::Optimism {
            l1_base_fee: required_uint(&outcomes[0], 0, names[0])?,
            scalar: required_uint(&outcomes[1], 0, names[1])?,
            decimals: required_uint(&outcomes[2], 0, names[2])?,
            overhead: required_uint(&outcomes[3], 0, names[3])?,
        })
    }
}

/// Reads the Arbitrum `ArbGasInfo` precompile.
pub struct ArbitrumGasDataProvider {
    precompile: Address,
    caller: Arc<dyn BatchCaller>,
}

impl ArbitrumGasDataProvider {
    pub fn new(caller: Arc<dyn BatchCaller>) -> Self {
        Self {
            precompile: LayeredChainKind::Arbitrum.gas_oracle_address(),
            caller,
        }
    }
}

#[async_trait]
impl L2GasDataProvider for ArbitrumGasDataProvider {
    async fn get_gas_data(&self, block: Option<BlockId>) -> Result<LayeredChainGasData> {
        let prices_fn = ARBGASINFO_ABI.function("getPricesInWei")?;
        let outcomes = self
            .caller
            .call_multiple_functions_on_same_contract(self.precompile, &[prices_fn], block)
            .await
            .context("Failed to read ArbGasInfo prices")?;
        let prices = outcomes
            .first()
            .ok_or_else(|| anyhow!("ArbGasInfo returned no result"))?;
        // (perL2Tx, perL1CalldataByte, perStorageAllocation, perArbGasBase, perArbGasCongestion, perArbGasTotal)
        Ok(LayeredChainGasData::Arbitrum {
            per_l2_tx_fee: required_uint(prices, 0, "perL2Tx")?,
            per_l1_calldata_fee: required_uint(prices, 1, "perL1CalldataByte")?,
            per_arb_gas_total: required_uint(prices, 5, "perArbGasTotal")?,
        })
    }
}

/// Provider matching the chain's rollup kind.
pub fn provider_for(kind: LayeredChainKind, caller: Arc<dyn BatchCaller>) -> Arc<dyn L2GasDataProvider> {
    match kind {
        LayeredChainKind::Optimism => Arc::new(OptimismGasDataProvider::new(caller)),
        LayeredChainKind::Arbitrum => Arc::new(ArbitrumGasDataProvider::new(caller)),
    }
}
