//! Configuration for the position hooks runtime

pub mod rpc;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Environment variable overriding the enabled position hooks (comma separated)
pub const POSITION_IDS_ENV: &str = "POSITION_IDS";
/// Environment variable overriding the enabled shortcut hooks (comma separated)
pub const SHORTCUT_IDS_ENV: &str = "SHORTCUT_IDS";
/// Environment variable for the token info feed
pub const GET_TOKENS_INFO_URL_ENV: &str = "GET_TOKENS_INFO_URL";
/// Environment variable for the transaction simulation service
pub const SIMULATE_TRANSACTIONS_URL_ENV: &str = "SIMULATE_TRANSACTIONS_URL";

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkId {
    CeloMainnet,
    CeloAlfajores,
    EthereumMainnet,
    EthereumSepolia,
    ArbitrumOne,
    ArbitrumSepolia,
    OpMainnet,
    OpSepolia,
    PolygonPosMainnet,
    PolygonPosAmoy,
    BaseMainnet,
    BaseSepolia,
}

impl NetworkId {
    pub const ALL: [NetworkId; 12] = [
        NetworkId::CeloMainnet,
        NetworkId::CeloAlfajores,
        NetworkId::EthereumMainnet,
        NetworkId::EthereumSepolia,
        NetworkId::ArbitrumOne,
        NetworkId::ArbitrumSepolia,
        NetworkId::OpMainnet,
        NetworkId::OpSepolia,
        NetworkId::PolygonPosMainnet,
        NetworkId::PolygonPosAmoy,
        NetworkId::BaseMainnet,
        NetworkId::BaseSepolia,
    ];

    pub fn chain_id(&self) -> u64 {
        match self {
            NetworkId::CeloMainnet => 42220,
            NetworkId::CeloAlfajores => 44787,
            NetworkId::EthereumMainnet => 1,
            NetworkId::EthereumSepolia => 11155111,
            NetworkId::ArbitrumOne => 42161,
            NetworkId::ArbitrumSepolia => 421614,
            NetworkId::OpMainnet => 10,
            NetworkId::OpSepolia => 11155420,
            NetworkId::PolygonPosMainnet => 137,
            NetworkId::PolygonPosAmoy => 80002,
            NetworkId::BaseMainnet => 8453,
            NetworkId::BaseSepolia => 84532,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NetworkId::CeloMainnet => "celo-mainnet",
            NetworkId::CeloAlfajores => "celo-alfajores",
            NetworkId::EthereumMainnet => "ethereum-mainnet",
            NetworkId::EthereumSepolia => "ethereum-sepolia",
            NetworkId::ArbitrumOne => "arbitrum-one",
            NetworkId::ArbitrumSepolia => "arbitrum-sepolia",
            NetworkId::OpMainnet => "op-mainnet",
            NetworkId::OpSepolia => "op-sepolia",
            NetworkId::PolygonPosMainnet => "polygon-pos-mainnet",
            NetworkId::PolygonPosAmoy => "polygon-pos-amoy",
            NetworkId::BaseMainnet => "base-mainnet",
            NetworkId::BaseSepolia => "base-sepolia",
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NetworkId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NetworkId::ALL
            .iter()
            .copied()
            .find(|n| n.name() == s)
            .ok_or_else(|| crate::Error::InvalidArgument(format!("Unknown network: {}", s)))
    }
}

/// Main configuration
///
/// Missing fields in a config file take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Position hooks to run; empty enables every registered hook
    pub position_ids: Vec<String>,
    /// Shortcut hooks to expose; empty enables every registered hook
    pub shortcut_ids: Vec<String>,
    /// Token info feed (symbol, decimals, USD price per token id)
    pub get_tokens_info_url: Option<String>,
    /// Transaction simulation service; unset means simulation is unsupported
    pub simulate_transactions_url: Option<String>,
    /// Upper bound for any single external call (milliseconds)
    pub call_timeout_ms: u64,
    /// How long the token info feed stays fresh (seconds)
    pub token_info_ttl_secs: u64,
    /// How long Allbridge pool data stays fresh (seconds)
    pub allbridge_ttl_secs: u64,
    /// How long the Curve pool list stays fresh (seconds)
    pub curve_pools_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            position_ids: Vec::new(),
            shortcut_ids: Vec::new(),
            get_tokens_info_url: None,
            simulate_transactions_url: None,
            call_timeout_ms: 15_000,
            token_info_ttl_secs: 60,
            allbridge_ttl_secs: 600, // 10 minutes
            curve_pools_ttl_secs: 300,
        }
    }
}

fn split_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Apply overrides from environment variables on top of `self`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(ids) = std::env::var(POSITION_IDS_ENV) {
            self.position_ids = split_ids(&ids);
        }
        if let Ok(ids) = std::env::var(SHORTCUT_IDS_ENV) {
            self.shortcut_ids = split_ids(&ids);
        }
        if let Ok(url) = std::env::var(GET_TOKENS_INFO_URL_ENV) {
            self.get_tokens_info_url = Some(url);
        }
        if let Ok(url) = std::env::var(SIMULATE_TRANSACTIONS_URL_ENV) {
            self.simulate_transactions_url = Some(url);
        }
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn token_info_ttl(&self) -> Duration {
        Duration::from_secs(self.token_info_ttl_secs)
    }

    pub fn allbridge_ttl(&self) -> Duration {
        Duration::from_secs(self.allbridge_ttl_secs)
    }

    pub fn curve_pools_ttl(&self) -> Duration {
        Duration::from_secs(self.curve_pools_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_id_serializes_kebab_case() {
        let json = serde_json::to_string(&NetworkId::PolygonPosMainnet).unwrap();
        assert_eq!(json, "\"polygon-pos-mainnet\"");
        let parsed: NetworkId = serde_json::from_str("\"celo-alfajores\"").unwrap();
        assert_eq!(parsed, NetworkId::CeloAlfajores);
    }

    #[test]
    fn network_id_display_matches_serde() {
        for network in NetworkId::ALL {
            let json = serde_json::to_string(&network).unwrap();
            assert_eq!(json, format!("\"{}\"", network));
            assert_eq!(network.name().parse::<NetworkId>().unwrap(), network);
        }
        assert!("celo".parse::<NetworkId>().is_err());
    }

    #[test]
    fn config_deserialize_defaults() {
        let value = serde_json::json!({
            "get_tokens_info_url": "https://example.com/tokens",
            "simulate_transactions_url": null,
            "call_timeout_ms": 5000,
            "token_info_ttl_secs": 60,
            "allbridge_ttl_secs": 600,
            "curve_pools_ttl_secs": 300
        });
        let parsed: Config = serde_json::from_value(value).expect("parse config");
        assert!(parsed.position_ids.is_empty());
        assert!(parsed.shortcut_ids.is_empty());
        assert_eq!(parsed.call_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn split_ids_ignores_blanks() {
        assert_eq!(split_ids("curve, stcelo,,"), vec!["curve", "stcelo"]);
        assert!(split_ids("").is_empty());
    }
}
