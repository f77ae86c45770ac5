//! Transaction simulation for gas estimation
//!
//! Simulation is read-only: nothing here signs or submits transactions.
//! Simulators that cannot handle a request answer
//! [`SimulationError::Unsupported`], which callers treat as expected.

use crate::config::{NetworkId, RpcConfig};
use crate::shortcuts::Transaction;
use alloy::hex;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Error type for simulation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Unsupported simulation request: {0}")]
    Unsupported(String),

    #[error("Invalid simulation URL: {0}")]
    InvalidUrl(String),

    #[error("Simulation failed: {0}")]
    Failed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Simulation timed out after {0}ms")]
    Timeout(u64),
}

/// Gas figures for one simulated transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedTransaction {
    /// Gas limit the transaction needs to succeed
    #[serde(deserialize_with = "u64_from_number_or_string")]
    pub gas_needed: u64,
    /// Gas the transaction actually consumed
    #[serde(deserialize_with = "u64_from_number_or_string")]
    pub gas_used: u64,
}

fn u64_from_number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        String(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Simulates an ordered list of transactions
#[async_trait]
pub trait TransactionSimulator: Send + Sync {
    /// One result per transaction, in order
    async fn simulate(
        &self,
        network: NetworkId,
        transactions: &[Transaction],
    ) -> Result<Vec<SimulatedTransaction>, SimulationError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateRequest<'a> {
    transactions: &'a [Transaction],
    network_id: NetworkId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    simulated_transactions: Vec<SimulatedTransaction>,
}

/// Client for an HTTP simulation service
///
/// POSTs `{transactions, networkId}`; a `400` answer means the service cannot
/// simulate this request.
pub struct HttpSimulator {
    client: Client,
    url: url::Url,
    timeout: Duration,
}

impl HttpSimulator {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SimulationError> {
        let url = url
            .parse()
            .map_err(|e| SimulationError::InvalidUrl(format!("{}", e)))?;
        Ok(Self {
            client: Client::new(),
            url,
            timeout,
        })
    }
}

#[async_trait]
impl TransactionSimulator for HttpSimulator {
    async fn simulate(
        &self,
        network: NetworkId,
        transactions: &[Transaction],
    ) -> Result<Vec<SimulatedTransaction>, SimulationError> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(&SimulateRequest {
                transactions,
                network_id: network,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SimulationError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    SimulationError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(SimulationError::Unsupported(body));
        }
        if !status.is_success() {
            return Err(SimulationError::Failed(format!(
                "simulation service returned {}",
                status
            )));
        }

        let body: SimulateResponse = response
            .json()
            .await
            .map_err(|e| SimulationError::Failed(format!("invalid response: {}", e)))?;
        if body.simulated_transactions.len() != transactions.len() {
            return Err(SimulationError::Failed(format!(
                "{} results for {} transactions",
                body.simulated_transactions.len(),
                transactions.len()
            )));
        }
        Ok(body.simulated_transactions)
    }
}

/// Simulator using `eth_call` and `eth_estimateGas`
///
/// Each call runs against the latest state, so later transactions cannot see
/// earlier ones. Only single-transaction lists are supported.
pub struct RpcSimulator {
    rpc_config: RpcConfig,
    timeout: Duration,
}

impl RpcSimulator {
    pub fn new(rpc_config: RpcConfig, timeout: Duration) -> Self {
        Self {
            rpc_config,
            timeout,
        }
    }

    async fn simulate_one(
        &self,
        url: url::Url,
        transaction: &Transaction,
    ) -> Result<SimulatedTransaction, SimulationError> {
        let provider = ProviderBuilder::new().connect_http(url);

        let mut tx = TransactionRequest::default()
            .from(transaction.from)
            .to(transaction.to)
            .input(transaction.data.clone().into());
        if let Some(value) = transaction.value {
            tx = tx.value(value);
        }

        // First, check the call does not revert
        if let Err(e) = provider.call(tx.clone()).await {
            return Err(SimulationError::Failed(parse_revert_reason(&e.to_string())));
        }

        let gas = provider
            .estimate_gas(tx)
            .await
            .map_err(|e| SimulationError::Failed(parse_revert_reason(&e.to_string())))?;

        Ok(SimulatedTransaction {
            gas_needed: gas,
            gas_used: gas,
        })
    }
}

#[async_trait]
impl TransactionSimulator for RpcSimulator {
    async fn simulate(
        &self,
        network: NetworkId,
        transactions: &[Transaction],
    ) -> Result<Vec<SimulatedTransaction>, SimulationError> {
        let [transaction] = transactions else {
            return Err(SimulationError::Unsupported(format!(
                "eth_call simulation handles a single transaction, got {}",
                transactions.len()
            )));
        };

        let rpc_url = self.rpc_config.get(network).ok_or_else(|| {
            SimulationError::Unsupported(format!("no RPC URL configured for {}", network))
        })?;
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| SimulationError::InvalidUrl(format!("{}", e)))?;

        match tokio::time::timeout(self.timeout, self.simulate_one(url, transaction)).await {
            Ok(result) => result.map(|simulated| vec![simulated]),
            Err(_) => Err(SimulationError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

/// Parse revert reason from RPC error message
fn parse_revert_reason(error: &str) -> String {
    if error.contains("execution reverted") {
        if let Some(start) = error.find("revert: ") {
            let reason = &error[start + 8..];
            if let Some(end) = reason.find('"') {
                return reason[..end].to_string();
            }
            return reason.to_string();
        }
        if let Some(start) = error.find("0x") {
            let hex_data = &error[start..];
            let end = hex_data
                .find(|c: char| !c.is_ascii_hexdigit() && c != 'x')
                .unwrap_or(hex_data.len());
            let data = &hex_data[..end];
            // Error(string)
            if data.starts_with("0x08c379a0") && data.len() > 138 {
                if let Ok(decoded) = hex::decode(&data[138..]) {
                    let filtered: Vec<u8> = decoded.into_iter().filter(|&b| b != 0).collect();
                    if let Ok(s) = String::from_utf8(filtered) {
                        return s;
                    }
                }
            }
            return format!("Reverted with data: {}", data);
        }
        return "execution reverted".to_string();
    }

    error.to_string()
}
