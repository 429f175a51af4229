//! Collaborator fakes shared by the integration tests. Nothing here touches the network.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::abi::{Function, Token as AbiToken};
use ethers::types::{Address, BlockId, U256};
use mig_routing_sdk::multicall::{BatchCaller, CallOutcome};
use mig_routing_sdk::pool_provider::{V3PoolAccessor, V3PoolProvider};
use mig_routing_sdk::pools::{FeeAmount, V3Pool};
use mig_routing_sdk::token_provider::TokenProvider;
use mig_routing_sdk::types::{Token, TokenAccessor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

/// ERC-20 metadata served by [`FakeCaller`]. `None` makes that call revert.
#[derive(Clone, Default)]
pub struct FakeMetadata {
    pub symbol: Option<String>,
    pub decimals: Option<U256>,
}

impl FakeMetadata {
    pub fn token(symbol: &str, decimals: u64) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            decimals: Some(U256::from(decimals)),
        }
    }
}

/// Batch caller answering `symbol()` / `decimals()` from a fixed table.
#[derive(Default)]
pub struct FakeCaller {
    pub metadata: HashMap<Address, FakeMetadata>,
    pub batches: AtomicUsize,
}

impl FakeCaller {
    pub fn with(mut self, address: Address, metadata: FakeMetadata) -> Self {
        self.metadata.insert(address, metadata);
        self
    }

    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchCaller for FakeCaller {
    async fn call_same_function_on_multiple_contracts(
        &self,
        addresses: &[Address],
        function: &Function,
        _block: Option<BlockId>,
    ) -> Result<Vec<CallOutcome>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(addresses
            .iter()
            .map(|a| {
                let meta = self.metadata.get(a);
                let value = match function.name.as_str() {
                    "symbol" => meta.and_then(|m| m.symbol.clone()).map(AbiToken::String),
                    "decimals" => meta.and_then(|m| m.decimals).map(AbiToken::Uint),
                    _ => None,
                };
                value
                    .map(|v| CallOutcome::ok(vec![v]))
                    .unwrap_or_else(CallOutcome::failed)
            })
            .collect())
    }

    async fn call_multiple_functions_on_same_contract(
        &self,
        _address: Address,
        functions: &[&Function],
        _block: Option<BlockId>,
    ) -> Result<Vec<CallOutcome>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![CallOutcome::failed(); functions.len()])
    }
}

/// Token provider resolving from a fixed set, recording every request.
#[derive(Default)]
pub struct FixedTokenProvider {
    pub tokens: Vec<Token>,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub requested: Mutex<Vec<Vec<Address>>>,
}

impl FixedTokenProvider {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for FixedTokenProvider {
    async fn get_tokens(&self, addresses: &[Address], _block: Option<BlockId>) -> Result<TokenAccessor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(addresses.to_vec());
        if self.fail {
            return Err(anyhow!("provider unavailable"));
        }
        Ok(TokenAccessor::from_tokens(
            self.tokens
                .iter()
                .filter(|t| addresses.contains(&t.address))
                .cloned(),
        ))
    }
}

/// V3 pool-existence fake: every requested pool exists unless its fee tier is excluded.
pub struct AllPoolsExist {
    pub deployment: mig_routing_sdk::chains::ProtocolDeployment,
    pub missing_fees: Vec<FeeAmount>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl AllPoolsExist {
    pub fn new(deployment: mig_routing_sdk::chains::ProtocolDeployment) -> Self {
        Self {
            deployment,
            missing_fees: Vec::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl V3PoolProvider for AllPoolsExist {
    async fn get_pools(
        &self,
        pairs: &[(Token, Token, FeeAmount)],
        _block: Option<BlockId>,
    ) -> Result<V3PoolAccessor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("rpc unreachable"));
        }
        Ok(V3PoolAccessor::from_pools(
            pairs
                .iter()
                .filter(|(_, _, fee)| !self.missing_fees.contains(fee))
                .map(|(a, b, fee)| {
                    V3Pool::new(&self.deployment, a.clone(), b.clone(), *fee, U256::one() << 96, 1_000, 0)
                }),
        ))
    }
}
