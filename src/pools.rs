// src/pools.rs

use ethers::abi::Token as AbiToken;
use ethers::types::{Address, U256, U512};
use ethers::utils::{get_create2_address_from_hash, keccak256};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::str::FromStr;

use crate::chains::ProtocolDeployment;
use crate::types::{sort_tokens, Token};

/// Liquidity protocol a pool or route belongs to. `Mixed` is only meaningful for routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    V2,
    V3,
    Mixed,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::V2 => write!(f, "v2"),
            Protocol::V3 => write!(f, "v3"),
            Protocol::Mixed => write!(f, "mixed"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v2" => Ok(Protocol::V2),
            "v3" => Ok(Protocol::V3),
            "mixed" => Ok(Protocol::Mixed),
            other => Err(format!("unknown protocol '{}'", other)),
        }
    }
}

/// V3 fee tiers in hundredths of a basis point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeeAmount {
    Lowest = 100,
    Low = 500,
    Medium = 3000,
    High = 10000,
}

impl FeeAmount {
    pub const ALL: [FeeAmount; 4] = [
        FeeAmount::Lowest,
        FeeAmount::Low,
        FeeAmount::Medium,
        FeeAmount::High,
    ];

    pub fn fee(&self) -> u32 {
        *self as u32
    }

    pub fn tick_spacing(&self) -> i32 {
        match self {
            FeeAmount::Lowest => 1,
            FeeAmount::Low => 10,
            FeeAmount::Medium => 60,
            FeeAmount::High => 200,
        }
    }
}

impl TryFrom<u32> for FeeAmount {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        FeeAmount::ALL
            .iter()
            .copied()
            .find(|f| f.fee() == value)
            .ok_or_else(|| format!("unsupported fee tier {}", value))
    }
}

/// Deterministic CREATE2 address of a V2 pair. Token order does not matter.
pub fn compute_v2_pair_address(deployment: &ProtocolDeployment, a: &Token, b: &Token) -> Address {
    let (token0, token1) = sort_tokens(a, b);
    let mut packed = Vec::with_capacity(40);
    packed.extend_from_slice(token0.address.as_bytes());
    packed.extend_from_slice(token1.address.as_bytes());
    let salt = keccak256(packed);
    get_create2_address_from_hash(deployment.factory, salt, deployment.init_code_hash)
}

/// Deterministic CREATE2 address of a V3 pool. Token order does not matter.
pub fn compute_v3_pool_address(
    deployment: &ProtocolDeployment,
    a: &Token,
    b: &Token,
    fee: FeeAmount,
) -> Address {
    let (token0, token1) = sort_tokens(a, b);
    let encoded = ethers::abi::encode(&[
        AbiToken::Address(token0.address),
        AbiToken::Address(token1.address),
        AbiToken::Uint(U256::from(fee.fee())),
    ]);
    let salt = keccak256(encoded);
    get_create2_address_from_hash(deployment.factory, salt, deployment.init_code_hash)
}

fn saturating_u256(value: U512) -> U256 {
    U256::try_from(value).unwrap_or(U256::MAX)
}

/// Constant-product pool snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2Pool {
    pub address: Address,
    pub token0: Token,
    pub token1: Token,
    pub reserve0: U256,
    pub reserve1: U256,
}

impl V2Pool {
    pub fn new(deployment: &ProtocolDeployment, a: Token, b: Token, reserve_a: U256, reserve_b: U256) -> Self {
        let address = compute_v2_pair_address(deployment, &a, &b);
        if a.sorts_before(&b) {
            Self { address, token0: a, token1: b, reserve0: reserve_a, reserve1: reserve_b }
        } else {
            Self { address, token0: b, token1: a, reserve0: reserve_b, reserve1: reserve_a }
        }
    }

    pub fn reserve_of(&self, token: &Token) -> Option<U256> {
        if *token == self.token0 {
            Some(self.reserve0)
        } else if *token == self.token1 {
            Some(self.reserve1)
        } else {
            None
        }
    }

    /// Mid-price conversion of `amount` of `from` into the other token.
    pub fn convert_amount(&self, from: &Token, amount: U256) -> Option<U256> {
        let (reserve_in, reserve_out) = if *from == self.token0 {
            (self.reserve0, self.reserve1)
        } else if *from == self.token1 {
            (self.reserve1, self.reserve0)
        } else {
            return None;
        };
        if reserve_in.is_zero() {
            return None;
        }
        Some(saturating_u256(amount.full_mul(reserve_out) / U512::from(reserve_in)))
    }
}

/// Concentrated-liquidity pool snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V3Pool {
    pub address: Address,
    pub token0: Token,
    pub token1: Token,
    pub fee: FeeAmount,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub tick: i32,
}

impl V3Pool {
    pub fn new(
        deployment: &ProtocolDeployment,
        a: Token,
        b: Token,
        fee: FeeAmount,
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
    ) -> Self {
        let address = compute_v3_pool_address(deployment, &a, &b, fee);
        let (token0, token1) = if a.sorts_before(&b) { (a, b) } else { (b, a) };
        Self { address, token0, token1, fee, sqrt_price_x96, liquidity, tick }
    }

    /// Mid-price conversion of `amount` of `from` into the other token.
    ///
    /// price(token0 in token1) = sqrtPriceX96^2 / 2^192, applied in two 96-bit steps so
    /// intermediate products stay within 512 bits.
    pub fn convert_amount(&self, from: &Token, amount: U256) -> Option<U256> {
        if self.sqrt_price_x96.is_zero() {
            return None;
        }
        if *from == self.token0 {
            let step = saturating_u256(amount.full_mul(self.sqrt_price_x96) >> 96);
            Some(saturating_u256(step.full_mul(self.sqrt_price_x96) >> 96))
        } else if *from == self.token1 {
            let sqrt = U512::from(self.sqrt_price_x96);
            let step = saturating_u256((U512::from(amount) << 96) / sqrt);
            Some(saturating_u256((U512::from(step) << 96) / sqrt))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pool {
    V2(V2Pool),
    V3(V3Pool),
}

impl Pool {
    pub fn address(&self) -> Address {
        match self {
            Pool::V2(p) => p.address,
            Pool::V3(p) => p.address,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Pool::V2(_) => Protocol::V2,
            Pool::V3(_) => Protocol::V3,
        }
    }

    pub fn token0(&self) -> &Token {
        match self {
            Pool::V2(p) => &p.token0,
            Pool::V3(p) => &p.token0,
        }
    }

    pub fn token1(&self) -> &Token {
        match self {
            Pool::V2(p) => &p.token1,
            Pool::V3(p) => &p.token1,
        }
    }

    pub fn involves(&self, token: &Token) -> bool {
        self.token0() == token || self.token1() == token
    }

    /// The token on the other side of `token`, if `token` is in the pool.
    pub fn other(&self, token: &Token) -> Option<&Token> {
        if self.token0() == token {
            Some(self.token1())
        } else if self.token1() == token {
            Some(self.token0())
        } else {
            None
        }
    }

    /// Fee in hundredths of a basis point. V2 pools charge a flat 0.3%.
    pub fn fee(&self) -> u32 {
        match self {
            Pool::V2(_) => 3000,
            Pool::V3(p) => p.fee.fee(),
        }
    }

    pub fn convert_amount(&self, from: &Token, amount: U256) -> Option<U256> {
        match self {
            Pool::V2(p) => p.convert_amount(from, amount),
            Pool::V3(p) => p.convert_amount(from, amount),
        }
    }
}
