//! RPC endpoint configuration
//!
//! Resolution order for each network:
//! 1. Per-network env var (`CELO_MAINNET_RPC_URL`, `ARBITRUM_ONE_RPC_URL`, ...)
//! 2. `ALCHEMY_API_KEY` - builds URLs for the networks Alchemy serves
//! 3. Public RPC fallbacks - rate limited, for testing only
//!
//! # Examples
//!
//! ```bash
//! export CELO_MAINNET_RPC_URL="https://forno.celo.org"
//! export ETHEREUM_MAINNET_RPC_URL="https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY"
//! ```

use super::NetworkId;
use std::collections::HashMap;

/// RPC configuration for every supported network
#[derive(Debug, Clone)]
pub struct RpcConfig {
    urls: HashMap<NetworkId, String>,
}

mod env_vars {
    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
}

/// Env var holding an explicit RPC URL for `network`, e.g. `OP_SEPOLIA_RPC_URL`
pub fn rpc_url_env_var(network: NetworkId) -> String {
    format!(
        "{}_RPC_URL",
        network.name().replace('-', "_").to_uppercase()
    )
}

fn alchemy_subdomain(network: NetworkId) -> &'static str {
    match network {
        NetworkId::CeloMainnet => "celo-mainnet",
        NetworkId::CeloAlfajores => "celo-alfajores",
        NetworkId::EthereumMainnet => "eth-mainnet",
        NetworkId::EthereumSepolia => "eth-sepolia",
        NetworkId::ArbitrumOne => "arb-mainnet",
        NetworkId::ArbitrumSepolia => "arb-sepolia",
        NetworkId::OpMainnet => "opt-mainnet",
        NetworkId::OpSepolia => "opt-sepolia",
        NetworkId::PolygonPosMainnet => "polygon-mainnet",
        NetworkId::PolygonPosAmoy => "polygon-amoy",
        NetworkId::BaseMainnet => "base-mainnet",
        NetworkId::BaseSepolia => "base-sepolia",
    }
}

/// Public RPC endpoints (rate limited, for testing only)
fn public_rpc(network: NetworkId) -> &'static str {
    match network {
        NetworkId::CeloMainnet => "https://forno.celo.org",
        NetworkId::CeloAlfajores => "https://alfajores-forno.celo-testnet.org",
        NetworkId::EthereumMainnet => "https://eth.llamarpc.com",
        NetworkId::EthereumSepolia => "https://ethereum-sepolia-rpc.publicnode.com",
        NetworkId::ArbitrumOne => "https://arb1.arbitrum.io/rpc",
        NetworkId::ArbitrumSepolia => "https://sepolia-rollup.arbitrum.io/rpc",
        NetworkId::OpMainnet => "https://mainnet.optimism.io",
        NetworkId::OpSepolia => "https://sepolia.optimism.io",
        NetworkId::PolygonPosMainnet => "https://polygon-rpc.com",
        NetworkId::PolygonPosAmoy => "https://rpc-amoy.polygon.technology",
        NetworkId::BaseMainnet => "https://mainnet.base.org",
        NetworkId::BaseSepolia => "https://sepolia.base.org",
    }
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut urls = HashMap::new();
        let alchemy_key = lookup(env_vars::ALCHEMY_API_KEY);

        for network in NetworkId::ALL {
            let var = rpc_url_env_var(network);
            if let Some(url) = lookup(&var) {
                tracing::debug!(network = %network, "Using {} for RPC", var);
                urls.insert(network, url);
                continue;
            }

            if let Some(key) = &alchemy_key {
                let subdomain = alchemy_subdomain(network);
                urls.insert(
                    network,
                    format!("https://{}.g.alchemy.com/v2/{}", subdomain, key),
                );
                continue;
            }

            tracing::debug!(network = %network, "No RPC configured, using public RPC (rate limited)");
            urls.insert(network, public_rpc(network).to_string());
        }

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<NetworkId, String>) -> Self {
        Self { urls }
    }

    /// Get RPC URL for a network
    pub fn get(&self, network: NetworkId) -> Option<&str> {
        self.urls.get(&network).map(|s| s.as_str())
    }

    /// Check if a network is configured
    pub fn has_network(&self, network: NetworkId) -> bool {
        self.urls.contains_key(&network)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
