use crate::metrics;
pub use anyhow::Result;
use async_trait::async_trait;
use ethers::abi::{Function, ParamType, Token};
use ethers::prelude::*;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Largest chunk sent in one `aggregate3` request.
const MAX_BATCH_SIZE: usize = 200;

/// A single RPC call to be batched in a multicall.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target contract address
    pub target: Address,
    /// Encoded function call data
    pub call_data: Bytes,
}

/// Raw per-call result of an `aggregate3` round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCallResult {
    pub success: bool,
    pub return_data: Bytes,
}

/// Decoded per-call result. `result` is `None` whenever `success` is false.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub success: bool,
    pub result: Option<Vec<Token>>,
}

impl CallOutcome {
    pub fn ok(result: Vec<Token>) -> Self {
        Self {
            success: true,
            result: Some(result),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            result: None,
        }
    }

    fn decode(function: &Function, raw: &RawCallResult) -> Self {
        if !raw.success {
            return Self::failed();
        }
        match function.decode_output(&raw.return_data) {
            Ok(tokens) => Self::ok(tokens),
            Err(_) => Self::failed(),
        }
    }
}

/// Batched read-only contract calls. Transport errors fail the whole batch; individual
/// call failures are reported per position.
#[async_trait]
pub trait BatchCaller: Send + Sync {
    /// Calls `function` (no arguments) on every address. Output is positional.
    async fn call_same_function_on_multiple_contracts(
        &self,
        addresses: &[Address],
        function: &Function,
        block: Option<BlockId>,
    ) -> Result<Vec<CallOutcome>>;

    /// Calls each function (no arguments) on one contract. Output is positional.
    async fn call_multiple_functions_on_same_contract(
        &self,
        address: Address,
        functions: &[&Function],
        block: Option<BlockId>,
    ) -> Result<Vec<CallOutcome>>;
}

/// Multicall3 batch executor.
///
/// Batches many contract calls into `aggregate3` requests with `allowFailure = true`, so a
/// reverting target never poisons its neighbours.
///
/// ## Example
///
/// ```rust,ignore
/// let multicall = Multicall::new(provider, chain.multicall, 100);
/// let outcomes = multicall
///     .call_same_function_on_multiple_contracts(&tokens, symbol_fn, None)
///     .await?;
/// ```
#[derive(Clone)]
pub struct Multicall<M: Middleware> {
    pub provider: Arc<M>,
    multicall_address: Address,
    batch_size: usize,
    timeout_seconds: u64,
    max_retries: u32,
}

impl<M: Middleware + 'static> Multicall<M> {
    pub fn new(provider: Arc<M>, multicall_address: Address, batch_size: usize) -> Self {
        if batch_size > MAX_BATCH_SIZE {
            warn!(
                "Batch size {} exceeds recommended maximum ({}), capping",
                batch_size, MAX_BATCH_SIZE
            );
        }
        let validated_batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);

        Self {
            provider,
            multicall_address,
            batch_size: validated_batch_size,
            timeout_seconds: 3,
            max_retries: 1,
        }
    }

    pub fn from_settings(
        provider: Arc<M>,
        multicall_address: Address,
        settings: &crate::settings::MulticallSettings,
    ) -> Self {
        Self::new(provider, multicall_address, settings.batch_size)
            .with_timeout(settings.timeout_seconds)
            .with_retries(settings.max_retries)
    }

    /// Set custom timeout for multicall operations
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set custom retry count
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Runs a batch of calls, optionally at a specific block. Output order matches input.
    pub async fn run(&self, calls: Vec<Call>, block: Option<BlockId>) -> Result<Vec<RawCallResult>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        // Coalesce identical calls to reduce load
        let mut unique_calls = indexmap::IndexMap::new();
        let mut original_indices = vec![0; calls.len()];
        for (i, call) in calls.iter().enumerate() {
            let (index, _) = unique_calls.insert_full((call.target, call.call_data.clone()), ());
            original_indices[i] = index;
        }

        let unique_call_vec: Vec<_> = unique_calls
            .into_keys()
            .map(|(target, call_data)| Call { target, call_data })
            .collect();
        debug!(
            "Multicall coalesced {} calls into {}",
            calls.len(),
            unique_call_vec.len()
        );

        // Chunks run concurrently; try_join_all keeps chunk order
        let chunk_futures = unique_call_vec.chunks(self.batch_size).map(|call_chunk| async move {
            metrics::record_multicall_batch_size(call_chunk.len() as f64);
            let return_data = self.execute_with_retries(call_chunk, block).await?;
            if return_data.len() != call_chunk.len() {
                return Err(anyhow::anyhow!(
                    "Multicall returned {} results for {} calls",
                    return_data.len(),
                    call_chunk.len()
                ));
            }
            Ok::<_, anyhow::Error>(return_data)
        });
        let all_results_unique: Vec<RawCallResult> = futures::future::try_join_all(chunk_futures)
            .await?
            .into_iter()
            .flatten()
            .collect();

        // Reconstruct the full result set in the original order
        let final_results = original_indices
            .into_iter()
            .map(|index| all_results_unique[index].clone())
            .collect();

        Ok(final_results)
    }

    async fn execute_with_retries(
        &self,
        calls: &[Call],
        block: Option<BlockId>,
    ) -> Result<Vec<RawCallResult>> {
        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(
                Duration::from_secs(self.timeout_seconds),
                self.execute_multicall3(calls, block),
            )
            .await
            .map_err(|_| anyhow::anyhow!("Multicall timed out after {}s", self.timeout_seconds))
            .and_then(|r| r);

            match outcome {
                Ok(results) => return Ok(results),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!("Multicall attempt {} failed, retrying: {}", attempt, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Executes one `aggregate3(Call3[])` request.
    async fn execute_multicall3(
        &self,
        calls: &[Call],
        block: Option<BlockId>,
    ) -> Result<Vec<RawCallResult>> {
        let call_tokens: Vec<Token> = calls
            .iter()
            .map(|call| {
                // Call3 struct: (address target, bool allowFailure, bytes callData)
                Token::Tuple(vec![
                    Token::Address(call.target),
                    Token::Bool(true),
                    Token::Bytes(call.call_data.to_vec()),
                ])
            })
            .collect();

        let result_type = ParamType::Array(Box::new(ParamType::Tuple(vec![
            ParamType::Bool,
            ParamType::Bytes,
        ])));

        #[allow(deprecated)]
        let function = Function {
            name: "aggregate3".to_string(),
            inputs: vec![ethers::abi::Param {
                name: "calls".to_string(),
                kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                    ParamType::Address,
                    ParamType::Bool,
                    ParamType::Bytes,
                ]))),
                internal_type: None,
            }],
            outputs: vec![ethers::abi::Param {
                name: "returnData".to_string(),
                kind: result_type.clone(),
                internal_type: None,
            }],
            constant: None,
            state_mutability: ethers::abi::StateMutability::Payable,
        };

        let calldata = function.encode_input(&[Token::Array(call_tokens)])?;

        let tx_request = TransactionRequest::new()
            .to(self.multicall_address)
            .data(calldata);
        let typed_tx: ethers::types::transaction::eip2718::TypedTransaction = tx_request.into();
        let response = self
            .provider
            .call(&typed_tx, block)
            .await
            .map_err(|e| anyhow::anyhow!("Multicall RPC error: {}", e))?;

        let decoded = ethers::abi::decode(&[result_type], &response)?;
        let results_array = decoded
            .into_iter()
            .next()
            .and_then(|t| t.into_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid multicall response format"))?;

        // Result struct: (bool success, bytes returnData)
        let mut results = Vec::with_capacity(results_array.len());
        for result_token in results_array {
            match result_token {
                Token::Tuple(tuple) if tuple.len() >= 2 => {
                    let success = tuple[0].clone().into_bool().unwrap_or(false);
                    let return_data = tuple[1].clone().into_bytes().unwrap_or_default();
                    results.push(RawCallResult {
                        success,
                        return_data: Bytes::from(return_data),
                    });
                }
                _ => results.push(RawCallResult {
                    success: false,
                    return_data: Bytes::default(),
                }),
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl<M: Middleware + 'static> BatchCaller for Multicall<M> {
    async fn call_same_function_on_multiple_contracts(
        &self,
        addresses: &[Address],
        function: &Function,
        block: Option<BlockId>,
    ) -> Result<Vec<CallOutcome>> {
        let call_data = Bytes::from(function.encode_input(&[])?);
        let calls = addresses
            .iter()
            .map(|target| Call {
                target: *target,
                call_data: call_data.clone(),
            })
            .collect();
        let raw = self.run(calls, block).await?;
        Ok(raw.iter().map(|r| CallOutcome::decode(function, r)).collect())
    }

    async fn call_multiple_functions_on_same_contract(
        &self,
        address: Address,
        functions: &[&Function],
        block: Option<BlockId>,
    ) -> Result<Vec<CallOutcome>> {
        let mut calls = Vec::with_capacity(functions.len());
        for function in functions {
            calls.push(Call {
                target: address,
                call_data: Bytes::from(function.encode_input(&[])?),
            });
        }
        let raw = self.run(calls, block).await?;
        Ok(raw
            .iter()
            .zip(functions.iter())
            .map(|(r, f)| CallOutcome::decode(f, r))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IERC20METADATA_ABI;

    #[test]
    fn failed_call_has_no_result() {
        let decimals = IERC20METADATA_ABI.function("decimals").unwrap();
        let raw = RawCallResult {
            success: false,
            return_data: Bytes::default(),
        };
        assert_eq!(CallOutcome::decode(decimals, &raw), CallOutcome::failed());
    }

    #[test]
    fn undecodable_success_is_a_failure() {
        let decimals = IERC20METADATA_ABI.function("decimals").unwrap();
        let raw = RawCallResult {
            success: true,
            return_data: Bytes::default(),
        };
        assert!(!CallOutcome::decode(decimals, &raw).success);
    }

    #[test]
    fn decodes_uint8_output() {
        let decimals = IERC20METADATA_ABI.function("decimals").unwrap();
        let raw = RawCallResult {
            success: true,
            return_data: Bytes::from(ethers::abi::encode(&[Token::Uint(U256::from(6u64))])),
        };
        let outcome = CallOutcome::decode(decimals, &raw);
        assert_eq!(outcome.result, Some(vec![Token::Uint(U256::from(6u64))]));
    }
}
