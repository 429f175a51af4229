//! # Router Module
//!
//! Route primitives and the scoring contract used by the orchestrating caller:
//! a [`Route`] is an ordered, connected sequence of pools; a [`QuotedRoute`] carries the
//! simulated amounts; [`score_routes`] applies a [`GasModel`] and [`select_best`] picks the
//! winner. "No route found" is `None`, never an error.

use ethers::types::U256;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::candidate_pools::CandidatePoolSet;
use crate::gas_model::{GasCostEstimate, GasModel};
use crate::pools::{Pool, Protocol};
use crate::types::conversions::address_to_string;
use crate::types::{CurrencyAmount, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    ExactInput,
    ExactOutput,
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeType::ExactInput => write!(f, "exact_input"),
            TradeType::ExactOutput => write!(f, "exact_output"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("Route has no pools")]
    Empty,
    #[error("Pool {index} does not contain {token}")]
    Disconnected { index: usize, token: String },
    #[error("Route ends at {actual}, expected {expected}")]
    WrongOutput { expected: String, actual: String },
}

/// Ordered pools connecting `input` to `output`, with the token path they traverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pools: Vec<Pool>,
    path: Vec<Token>,
    input: Token,
    output: Token,
}

impl Route {
    pub fn new(pools: Vec<Pool>, input: Token, output: Token) -> Result<Self, RouteError> {
        if pools.is_empty() {
            return Err(RouteError::Empty);
        }
        let mut path = Vec::with_capacity(pools.len() + 1);
        path.push(input.clone());
        for (index, pool) in pools.iter().enumerate() {
            let current = &path[path.len() - 1];
            let next = pool.other(current).ok_or_else(|| RouteError::Disconnected {
                index,
                token: current.to_string(),
            })?;
            path.push(next.clone());
        }
        let last = &path[path.len() - 1];
        if *last != output {
            return Err(RouteError::WrongOutput {
                expected: output.to_string(),
                actual: last.to_string(),
            });
        }
        Ok(Self {
            pools,
            path,
            input,
            output,
        })
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn path(&self) -> &[Token] {
        &self.path
    }

    pub fn input(&self) -> &Token {
        &self.input
    }

    pub fn output(&self) -> &Token {
        &self.output
    }

    pub fn hops(&self) -> usize {
        self.pools.len()
    }

    /// V2 or V3 when every pool shares that protocol, otherwise MIXED.
    pub fn protocol(&self) -> Protocol {
        let first = self.pools[0].protocol();
        if self.pools.iter().all(|p| p.protocol() == first) {
            first
        } else {
            Protocol::Mixed
        }
    }

    /// Stable identifier built from the pool addresses.
    pub fn route_id(&self) -> String {
        self.pools
            .iter()
            .map(|p| address_to_string(p.address()))
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbols: Vec<&str> = self.path.iter().map(|t| t.symbol.as_str()).collect();
        write!(f, "[{}] {}", self.protocol(), symbols.join(" -> "))
    }
}

/// A route with its simulated amounts.
///
/// For exact-input trades `amount` is in the input token and `quote` in the output token;
/// for exact-output trades the roles swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotedRoute {
    pub route: Route,
    pub amount: CurrencyAmount,
    pub quote: CurrencyAmount,
    pub percent: f64,
    #[serde(default)]
    pub initialized_ticks_crossed: u32,
    #[serde(default)]
    pub uninitialized_ticks_crossed: u32,
}

/// A quoted route with its gas cost applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRoute {
    pub quoted: QuotedRoute,
    pub gas: GasCostEstimate,
    /// Quote net of gas, in the quote token's raw units.
    pub quote_adjusted: U256,
    pub trade_type: TradeType,
}

/// Output of the discovery and quoting stages for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetRoutesResult {
    pub routes: Vec<QuotedRoute>,
    pub candidate_pools: CandidatePoolSet,
}

/// Applies the gas model to every route.
///
/// Exact-input quotes are reduced by the gas cost (saturating at zero); exact-output quotes
/// are increased by it.
pub fn score_routes(routes: Vec<QuotedRoute>, gas_model: &GasModel, trade_type: TradeType) -> Vec<ScoredRoute> {
    routes
        .into_iter()
        .map(|quoted| {
            let gas = gas_model.estimate_cost(&quoted);
            let gas_in_quote = gas.cost_in_quote_token.raw;
            let quote_adjusted = match trade_type {
                TradeType::ExactInput => quoted.quote.raw.saturating_sub(gas_in_quote),
                TradeType::ExactOutput => quoted.quote.raw.saturating_add(gas_in_quote),
            };
            ScoredRoute {
                quoted,
                gas,
                quote_adjusted,
                trade_type,
            }
        })
        .collect()
}

/// Best route by gas-adjusted quote: highest output for exact input, lowest input for
/// exact output. Routes with a zero quote never win.
pub fn select_best(scored: &[ScoredRoute]) -> Option<ScoredRoute> {
    let viable = scored.iter().filter(|s| !s.quoted.quote.raw.is_zero());
    let best = viable.fold(None::<&ScoredRoute>, |best, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            let better = match candidate.trade_type {
                TradeType::ExactInput => candidate.quote_adjusted > current.quote_adjusted,
                TradeType::ExactOutput => candidate.quote_adjusted < current.quote_adjusted,
            };
            Some(if better { candidate } else { current })
        }
    });
    if best.is_none() {
        debug!("No viable route among {} scored routes", scored.len());
    }
    best.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{ChainRegistry, MAINNET};
    use crate::pools::{FeeAmount, V2Pool, V3Pool};

    fn tokens() -> (crate::chains::ProtocolDeployment, crate::chains::ProtocolDeployment, Token, Token, Token) {
        let chain = ChainRegistry::builtin().get(MAINNET).unwrap();
        let usdc = chain.base_tokens.iter().find(|t| t.symbol == "USDC").unwrap().clone();
        let dai = chain.base_tokens.iter().find(|t| t.symbol == "DAI").unwrap().clone();
        (chain.v2.unwrap(), chain.v3.unwrap(), chain.wrapped_native.clone(), usdc, dai)
    }

    #[test]
    fn mixed_route_is_connected() {
        let (v2, v3, weth, usdc, dai) = tokens();
        let p1 = Pool::V3(V3Pool::new(&v3, weth.clone(), usdc.clone(), FeeAmount::Low, U256::one() << 96, 1, 0));
        let p2 = Pool::V2(V2Pool::new(&v2, usdc.clone(), dai.clone(), U256::one(), U256::one()));
        let route = Route::new(vec![p1, p2], weth.clone(), dai.clone()).unwrap();
        assert_eq!(route.protocol(), Protocol::Mixed);
        assert_eq!(route.hops(), 2);
        assert_eq!(route.path(), &[weth, usdc, dai]);
    }

    #[test]
    fn disconnected_route_is_rejected() {
        let (v2, _, weth, usdc, dai) = tokens();
        let pool = Pool::V2(V2Pool::new(&v2, usdc.clone(), dai.clone(), U256::one(), U256::one()));
        assert!(matches!(
            Route::new(vec![pool], weth, dai),
            Err(RouteError::Disconnected { index: 0, .. })
        ));
        assert_eq!(Route::new(vec![], usdc.clone(), usdc), Err(RouteError::Empty));
    }
}
