//! # Chain Registry
//!
//! Static, read-only configuration for every chain the router knows about: the wrapped
//! native token, curated base and seed tokens, USD gas tokens, protocol deployments,
//! multicall address and gas constants.
//!
//! The built-in table covers Ethereum mainnet, Arbitrum One, Rollux and Rollux Tanenbaum.
//! Deployments that are not known at compile time (for example the V2/V3 factories on
//! Rollux) are supplied through `[chains.<id>]` sections in `Config.toml` and applied with
//! [`ChainRegistry::from_settings`].

use ethers::types::{Address, H256};
use log::{debug, info};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::pools::Protocol;
use crate::settings::{ChainOverride, Settings};
use crate::types::conversions::{string_to_address, string_to_h256};
use crate::types::Token;

pub const MAINNET: u64 = 1;
pub const ARBITRUM_ONE: u64 = 42161;
pub const ROLLUX: u64 = 570;
pub const ROLLUX_TANENBAUM: u64 = 57000;

/// Canonical Multicall3 deployment, identical on every supported chain.
pub const MULTICALL3_ADDRESS: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

#[derive(Debug, thiserror::Error)]
pub enum ChainRegistryError {
    #[error("Unsupported chain id {0}")]
    UnsupportedChain(u64),
    #[error("Invalid override for chain '{chain}': {reason}")]
    InvalidOverride { chain: String, reason: String },
}

/// Factory address and pair/pool init code hash for one protocol deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolDeployment {
    pub factory: Address,
    pub init_code_hash: H256,
}

/// Gas constants used by the heuristic gas model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasCosts {
    pub base_swap_cost: u64,
    pub cost_per_hop: u64,
    pub cost_per_init_tick: u64,
    pub cost_per_uninit_tick: u64,
}

impl Default for GasCosts {
    fn default() -> Self {
        Self {
            base_swap_cost: 2000,
            cost_per_hop: 80000,
            cost_per_init_tick: 31000,
            cost_per_uninit_tick: 0,
        }
    }
}

/// Rollup family whose data-publication fee is charged on top of execution gas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayeredChainKind {
    Optimism,
    Arbitrum,
}

impl LayeredChainKind {
    /// Predeployed contract exposing the L1 fee parameters.
    pub fn gas_oracle_address(&self) -> Address {
        match self {
            LayeredChainKind::Optimism => literal_address("0x420000000000000000000000000000000000000F"),
            LayeredChainKind::Arbitrum => literal_address("0x000000000000000000000000000000000000006C"),
        }
    }
}

impl FromStr for LayeredChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "optimism" | "op" | "op-stack" => Ok(LayeredChainKind::Optimism),
            "arbitrum" => Ok(LayeredChainKind::Arbitrum),
            other => Err(format!("unknown layered chain kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub native_symbol: String,
    pub wrapped_native: Token,
    /// Tokens written into the token cache before every resolution.
    pub seed_tokens: Vec<Token>,
    /// Curated intermediaries used to build candidate pools.
    pub base_tokens: Vec<Token>,
    /// Stablecoins used to price gas in fiat.
    pub usd_gas_tokens: Vec<Token>,
    pub v2: Option<ProtocolDeployment>,
    pub v3: Option<ProtocolDeployment>,
    pub multicall: Address,
    pub gas_costs: GasCosts,
    pub layered: Option<LayeredChainKind>,
}

impl ChainConfig {
    pub fn supported_protocols(&self) -> Vec<Protocol> {
        let mut protocols = Vec::with_capacity(3);
        if self.v2.is_some() {
            protocols.push(Protocol::V2);
        }
        if self.v3.is_some() {
            protocols.push(Protocol::V3);
        }
        if self.v2.is_some() && self.v3.is_some() {
            protocols.push(Protocol::Mixed);
        }
        protocols
    }

    pub fn deployment(&self, protocol: Protocol) -> Option<&ProtocolDeployment> {
        match protocol {
            Protocol::V2 => self.v2.as_ref(),
            Protocol::V3 => self.v3.as_ref(),
            Protocol::Mixed => None,
        }
    }

    pub fn is_layered(&self) -> bool {
        self.layered.is_some()
    }

    fn apply_override(&mut self, key: &str, ov: &ChainOverride) -> Result<(), ChainRegistryError> {
        let invalid = |reason: String| ChainRegistryError::InvalidOverride {
            chain: key.to_string(),
            reason,
        };

        if let Some(name) = &ov.name {
            self.name = name.clone();
        }
        if let Some(multicall) = &ov.multicall {
            self.multicall = string_to_address(multicall).map_err(|e| invalid(e.to_string()))?;
        }
        if let Some(kind) = &ov.layered {
            self.layered = Some(kind.parse().map_err(invalid)?);
        }
        if let Some(dep) = parse_deployment(&ov.v2_factory, &ov.v2_init_code_hash, "v2")
            .map_err(invalid)?
        {
            self.v2 = Some(dep);
        }
        if let Some(dep) = parse_deployment(&ov.v3_factory, &ov.v3_init_code_hash, "v3")
            .map_err(invalid)?
        {
            self.v3 = Some(dep);
        }
        if let Some(base) = ov.base_swap_cost {
            self.gas_costs.base_swap_cost = base;
        }
        Ok(())
    }
}

fn parse_deployment(
    factory: &Option<String>,
    init_code_hash: &Option<String>,
    label: &str,
) -> Result<Option<ProtocolDeployment>, String> {
    match (factory, init_code_hash) {
        (None, None) => Ok(None),
        (Some(f), Some(h)) => Ok(Some(ProtocolDeployment {
            factory: string_to_address(f).map_err(|e| e.to_string())?,
            init_code_hash: string_to_h256(h).map_err(|e| e.to_string())?,
        })),
        _ => Err(format!(
            "{label}_factory and {label}_init_code_hash must be set together"
        )),
    }
}

/// Immutable chain table indexed by chain id.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    chains: HashMap<u64, Arc<ChainConfig>>,
}

impl ChainRegistry {
    pub fn builtin() -> Self {
        BUILTIN_CHAINS.clone()
    }

    pub fn from_configs<I: IntoIterator<Item = ChainConfig>>(configs: I) -> Self {
        let chains = configs
            .into_iter()
            .map(|c| (c.chain_id, Arc::new(c)))
            .collect();
        Self { chains }
    }

    /// Built-in chains with the `[chains.<id>]` overrides from settings applied.
    pub fn from_settings(settings: &Settings) -> Result<Self, ChainRegistryError> {
        let mut registry = Self::builtin();
        for (key, ov) in &settings.chains {
            let chain_id: u64 = key.parse().map_err(|_| ChainRegistryError::InvalidOverride {
                chain: key.clone(),
                reason: "section name must be a numeric chain id".to_string(),
            })?;
            let current = registry
                .chains
                .get(&chain_id)
                .ok_or(ChainRegistryError::UnsupportedChain(chain_id))?;
            let mut updated = ChainConfig::clone(current);
            updated.apply_override(key, ov)?;
            debug!(
                "Applied chain override for {} ({}): protocols {:?}",
                updated.name,
                chain_id,
                updated.supported_protocols()
            );
            registry.chains.insert(chain_id, Arc::new(updated));
        }
        info!("Chain registry ready with {} chains", registry.chains.len());
        Ok(registry)
    }

    pub fn get(&self, chain_id: u64) -> Result<Arc<ChainConfig>, ChainRegistryError> {
        self.chains
            .get(&chain_id)
            .cloned()
            .ok_or(ChainRegistryError::UnsupportedChain(chain_id))
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

fn literal_address(s: &str) -> Address {
    Address::from_str(s).expect("address literal")
}

fn literal_hash(s: &str) -> H256 {
    H256::from_str(s).expect("hash literal")
}

fn token(chain_id: u64, address: &str, decimals: u8, symbol: &str, name: &str) -> Token {
    Token::new(chain_id, literal_address(address), decimals, symbol).with_name(name)
}

fn uniswap_v2_mainnet() -> ProtocolDeployment {
    ProtocolDeployment {
        factory: literal_address("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"),
        init_code_hash: literal_hash(
            "0x96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f",
        ),
    }
}

fn uniswap_v3() -> ProtocolDeployment {
    ProtocolDeployment {
        factory: literal_address("0x1F98431c8aD98523631AE4a59f267346ea31F984"),
        init_code_hash: literal_hash(
            "0xe34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54",
        ),
    }
}

fn mainnet() -> ChainConfig {
    let id = MAINNET;
    let weth = token(id, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18, "WETH", "Wrapped Ether");
    let usdc = token(id, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6, "USDC", "USD Coin");
    let usdt = token(id, "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6, "USDT", "Tether USD");
    let dai = token(id, "0x6B175474E89094C44Da98b954EedeAC495271d0F", 18, "DAI", "Dai Stablecoin");
    ChainConfig {
        chain_id: id,
        name: "Ethereum".to_string(),
        native_symbol: "ETH".to_string(),
        wrapped_native: weth.clone(),
        seed_tokens: vec![weth.clone(), usdc.clone(), usdt.clone(), dai.clone()],
        base_tokens: vec![weth, usdc.clone(), usdt.clone(), dai.clone()],
        usd_gas_tokens: vec![usdc, usdt, dai],
        v2: Some(uniswap_v2_mainnet()),
        v3: Some(uniswap_v3()),
        multicall: literal_address(MULTICALL3_ADDRESS),
        gas_costs: GasCosts::default(),
        layered: None,
    }
}

fn arbitrum_one() -> ChainConfig {
    let id = ARBITRUM_ONE;
    let weth = token(id, "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1", 18, "WETH", "Wrapped Ether");
    let usdc = token(id, "0xFF970A61A04b1cA14834A43f5dE4533eBDDB5CC8", 6, "USDC", "Bridged USDC");
    let usdt = token(id, "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9", 6, "USDT", "Tether USD");
    let dai = token(id, "0xDA10009cBd5D07dd0CeCc66161FC93D7c9000da1", 18, "DAI", "Dai Stablecoin");
    ChainConfig {
        chain_id: id,
        name: "Arbitrum One".to_string(),
        native_symbol: "ETH".to_string(),
        wrapped_native: weth.clone(),
        seed_tokens: vec![weth.clone(), usdc.clone(), usdt.clone(), dai.clone()],
        base_tokens: vec![weth, usdc.clone(), usdt.clone(), dai.clone()],
        usd_gas_tokens: vec![usdc, usdt, dai],
        v2: None,
        v3: Some(uniswap_v3()),
        multicall: literal_address(MULTICALL3_ADDRESS),
        gas_costs: GasCosts {
            base_swap_cost: 5000,
            ..GasCosts::default()
        },
        layered: Some(LayeredChainKind::Arbitrum),
    }
}

fn rollux_like(id: u64, name: &str, usdc: &str, usdt: &str, dai: &str) -> ChainConfig {
    let wsys = token(id, "0x4200000000000000000000000000000000000006", 18, "WSYS", "Wrapped SYS");
    let usdc = token(id, usdc, 6, "USDC", "USD Coin");
    let usdt = token(id, usdt, 6, "USDT", "Tether USD");
    let dai = token(id, dai, 18, "DAI", "Dai Stablecoin");
    ChainConfig {
        chain_id: id,
        name: name.to_string(),
        native_symbol: "SYS".to_string(),
        wrapped_native: wsys.clone(),
        seed_tokens: vec![wsys.clone(), usdc.clone(), usdt.clone(), dai.clone()],
        base_tokens: vec![wsys, usdc.clone(), usdt.clone(), dai.clone()],
        usd_gas_tokens: vec![usdc, usdt, dai],
        v2: None,
        v3: None,
        multicall: literal_address(MULTICALL3_ADDRESS),
        gas_costs: GasCosts {
            base_swap_cost: 5000,
            ..GasCosts::default()
        },
        layered: Some(LayeredChainKind::Optimism),
    }
}

pub static BUILTIN_CHAINS: Lazy<ChainRegistry> = Lazy::new(|| {
    ChainRegistry::from_configs(vec![
        mainnet(),
        arbitrum_one(),
        rollux_like(
            ROLLUX,
            "Rollux",
            "0x368433CaC2A0B8D76E64681a9835502a1f2A8A30",
            "0x28c9c7Fb3fE3104d2116Af26cC8eF7905547349c",
            "0x5B0aC6194499621630ddebb30c4aBE37037b30Ec",
        ),
        rollux_like(
            ROLLUX_TANENBAUM,
            "Rollux Tanenbaum",
            "0x2Be160796F509CC4B1d76fc97494D56CF109C3f1",
            "0xb97915AED8B5996dE24Ce760EC8DE5A91E820dF7",
            "0xccA991E1Bdca2846640d366116d60BC25C2815db",
        ),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_chain_is_rejected() {
        let registry = ChainRegistry::builtin();
        match registry.get(31337) {
            Err(ChainRegistryError::UnsupportedChain(id)) => assert_eq!(id, 31337),
            other => panic!("unexpected result: {:?}", other.map(|c| c.chain_id)),
        }
    }

    #[test]
    fn builtin_protocol_sets() {
        let registry = ChainRegistry::builtin();
        let mainnet = registry.get(MAINNET).unwrap();
        assert_eq!(
            mainnet.supported_protocols(),
            vec![Protocol::V2, Protocol::V3, Protocol::Mixed]
        );
        let arbitrum = registry.get(ARBITRUM_ONE).unwrap();
        assert_eq!(arbitrum.supported_protocols(), vec![Protocol::V3]);
        assert_eq!(arbitrum.layered, Some(LayeredChainKind::Arbitrum));
        let rollux = registry.get(ROLLUX).unwrap();
        assert!(rollux.supported_protocols().is_empty());
        assert_eq!(rollux.base_tokens.len(), 4);
        assert_eq!(rollux.wrapped_native.symbol, "WSYS");
    }

    #[test]
    fn tokens_belong_to_their_chain() {
        let registry = ChainRegistry::builtin();
        for id in registry.chain_ids() {
            let chain = registry.get(id).unwrap();
            assert!(chain
                .seed_tokens
                .iter()
                .chain(chain.base_tokens.iter())
                .chain(chain.usd_gas_tokens.iter())
                .all(|t| t.chain_id == id));
        }
    }

    #[test]
    fn override_requires_factory_and_hash_together() {
        let mut settings = Settings::default();
        settings.chains.insert(
            ROLLUX.to_string(),
            ChainOverride {
                v2_factory: Some("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f".to_string()),
                ..ChainOverride::default()
            },
        );
        assert!(matches!(
            ChainRegistry::from_settings(&settings),
            Err(ChainRegistryError::InvalidOverride { .. })
        ));
    }
}
