//! Read-only blockchain access
//!
//! Hooks and the resolver only ever read contract state, through `call` and
//! batched `multicall` (Multicall3 `aggregate3`). Nothing here signs or sends
//! transactions.

pub mod erc20;

use crate::config::{NetworkId, RpcConfig};
use crate::error::{with_timeout, Error, Result};
use alloy::primitives::{address, Address, Bytes};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::time::Duration;

/// Multicall3, deployed at the same address on every supported network
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

sol! {
    interface IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct CallResult {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (CallResult[] memory returnData);
    }
}

/// A single read-only contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
}

impl ContractCall {
    pub fn new<C: SolCall>(to: Address, call: &C) -> Self {
        Self {
            to,
            data: Bytes::from(call.abi_encode()),
        }
    }
}

/// Blockchain client used by hooks and the resolver
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `eth_call` against the latest block
    async fn call(&self, network: NetworkId, call: ContractCall) -> Result<Bytes>;

    /// Batch of calls in one round trip. Any failing call fails the batch.
    async fn multicall(&self, network: NetworkId, calls: Vec<ContractCall>) -> Result<Vec<Bytes>>;
}

/// Chain client talking JSON-RPC through alloy
pub struct RpcChainClient {
    rpc_config: RpcConfig,
    timeout: Duration,
}

impl RpcChainClient {
    pub fn new(rpc_config: RpcConfig, timeout: Duration) -> Self {
        Self {
            rpc_config,
            timeout,
        }
    }

    fn rpc_url(&self, network: NetworkId) -> Result<url::Url> {
        let rpc_url = self.rpc_config.get(network).ok_or_else(|| {
            Error::Config(format!("No RPC URL configured for network {}", network))
        })?;
        rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RPC URL for {}: {}", network, e)))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn call(&self, network: NetworkId, call: ContractCall) -> Result<Bytes> {
        let url = self.rpc_url(network)?;
        let provider = ProviderBuilder::new().connect_http(url);

        let to = call.to;
        let tx = TransactionRequest::default()
            .to(call.to)
            .input(call.data.into());

        with_timeout(self.timeout, async move {
            provider
                .call(tx)
                .await
                .map_err(|e| Error::Chain(format!("eth_call to {} failed: {}", to, e)))
        })
        .await
    }

    async fn multicall(&self, network: NetworkId, calls: Vec<ContractCall>) -> Result<Vec<Bytes>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let targets: Vec<Address> = calls.iter().map(|c| c.to).collect();
        let aggregate = IMulticall3::aggregate3Call {
            calls: calls
                .into_iter()
                .map(|c| IMulticall3::Call3 {
                    target: c.to,
                    allowFailure: true,
                    callData: c.data,
                })
                .collect(),
        };

        let raw = self
            .call(network, ContractCall::new(MULTICALL3_ADDRESS, &aggregate))
            .await?;
        let results = IMulticall3::aggregate3Call::abi_decode_returns(&raw)
            .map_err(|e| Error::Chain(format!("failed to decode aggregate3 result: {}", e)))?;

        if results.len() != targets.len() {
            return Err(Error::Chain(format!(
                "aggregate3 returned {} results for {} calls",
                results.len(),
                targets.len()
            )));
        }

        results
            .into_iter()
            .zip(targets)
            .map(|(result, target)| {
                if result.success {
                    Ok(result.returnData)
                } else {
                    Err(Error::Chain(format!("multicall call to {} reverted", target)))
                }
            })
            .collect()
    }
}
