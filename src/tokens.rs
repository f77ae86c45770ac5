//! Token identities, resolved tokens and token info sources
//!
//! A token is identified by `"{networkId}:{lowercase address}"`. The resolver
//! memoizes on this id, so every reference to the same (network, address)
//! within a request shares one [`ResolvedToken`].

use crate::cache::TtlCache;
use crate::config::NetworkId;
use crate::error::{Error, Result};
use crate::numbers::DecimalNumber;
use crate::positions::ResolutionError;
use alloy::hex;
use alloy::primitives::{address, Address};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lowercase `0x` hex form of an address
pub fn lowercase_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// `"{networkId}:{lowercase address}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(network: NetworkId, address: &Address) -> Self {
        Self(format!("{}:{}", network, lowercase_address(address)))
    }

    /// Parse a serialized token id, normalizing the address to lowercase
    pub fn parse(raw: &str) -> Result<Self> {
        let (network, address) = raw
            .split_once(':')
            .ok_or_else(|| Error::InvalidArgument(format!("Invalid token id: {}", raw)))?;
        let network: NetworkId = network.parse()?;
        let address: Address = address
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("Invalid token id: {}", raw)))?;
        Ok(Self::new(network, &address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a token emitted by a hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDefinition {
    pub network_id: NetworkId,
    pub address: Address,
    /// Price used when the token info source has no price for this token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_price_usd: Option<DecimalNumber>,
}

impl TokenDefinition {
    pub fn new(network_id: NetworkId, address: Address) -> Self {
        Self {
            network_id,
            address,
            fallback_price_usd: None,
        }
    }

    pub fn with_fallback_price(mut self, price_usd: DecimalNumber) -> Self {
        self.fallback_price_usd = Some(price_usd);
        self
    }

    pub fn token_id(&self) -> TokenId {
        TokenId::new(self.network_id, &self.address)
    }
}

/// App token details recorded during resolution
#[derive(Debug, Clone, PartialEq)]
pub struct AppTokenDetails {
    pub app_id: String,
    /// Underlying tokens, in definition order
    pub tokens: Vec<TokenId>,
    /// Amount of each underlying token backing one share
    pub price_per_share: Vec<DecimalNumber>,
    pub supply: DecimalNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Base,
    App(AppTokenDetails),
}

/// Fully resolved token
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedToken {
    pub token_id: TokenId,
    pub network_id: NetworkId,
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub price_usd: Option<DecimalNumber>,
    pub kind: TokenKind,
}

impl ResolvedToken {
    pub fn is_app_token(&self) -> bool {
        matches!(self.kind, TokenKind::App(_))
    }
}

/// Resolved tokens visible to deferred callbacks and position assembly
#[derive(Debug, Clone, Default)]
pub struct ResolvedTokens {
    tokens: HashMap<TokenId, Arc<ResolvedToken>>,
}

impl ResolvedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: Arc<ResolvedToken>) {
        self.tokens.insert(token.token_id.clone(), token);
    }

    pub fn get_by_id(&self, token_id: &TokenId) -> Result<&Arc<ResolvedToken>> {
        self.tokens
            .get(token_id)
            .ok_or_else(|| ResolutionError::NotResolved(token_id.clone()).into())
    }

    pub fn get(&self, network: NetworkId, address: &Address) -> Result<&Arc<ResolvedToken>> {
        self.get_by_id(&TokenId::new(network, address))
    }

    pub fn contains(&self, token_id: &TokenId) -> bool {
        self.tokens.contains_key(token_id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<Arc<ResolvedToken>> for ResolvedTokens {
    fn from_iter<I: IntoIterator<Item = Arc<ResolvedToken>>>(iter: I) -> Self {
        let mut tokens = Self::new();
        for token in iter {
            tokens.insert(token);
        }
        tokens
    }
}

/// Symbol, decimals and price of a base token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub price_usd: Option<DecimalNumber>,
}

/// Source of base token metadata and prices
#[async_trait]
pub trait TokenInfoSource: Send + Sync {
    /// `Ok(None)` means the source has no data for this token
    async fn token_info(&self, token_id: &TokenId) -> Result<Option<TokenInfo>>;
}

type TokenInfoFeed = Arc<HashMap<TokenId, TokenInfo>>;

/// Token info feed served over HTTP, cached with a TTL
///
/// The feed is a JSON object keyed by token id, optionally wrapped in
/// `{"tokens": {...}}`.
pub struct HttpTokenInfoSource {
    client: Client,
    url: String,
    timeout: Duration,
    cache: TtlCache<(), TokenInfoFeed>,
}

impl HttpTokenInfoSource {
    pub fn new(url: impl Into<String>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout,
            cache: TtlCache::new(ttl, 1),
        }
    }

    async fn fetch_feed(&self) -> Result<TokenInfoFeed> {
        tracing::debug!(url = %self.url, "Fetching token info feed");
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        let body: serde_json::Value = response.json().await?;
        parse_feed(body).map(Arc::new)
    }
}

fn parse_feed(body: serde_json::Value) -> Result<HashMap<TokenId, TokenInfo>> {
    let entries = match body {
        serde_json::Value::Object(mut map) => match map.remove("tokens") {
            Some(serde_json::Value::Object(tokens)) => tokens,
            Some(_) => {
                return Err(Error::Upstream(
                    "token info feed: 'tokens' is not an object".to_string(),
                ))
            }
            None => map,
        },
        _ => {
            return Err(Error::Upstream(
                "token info feed is not a JSON object".to_string(),
            ))
        }
    };

    let mut feed = HashMap::with_capacity(entries.len());
    for (key, value) in entries {
        let token_id = match TokenId::parse(&key) {
            Ok(id) => id,
            Err(_) => {
                tracing::debug!(key = %key, "Skipping token info entry with unsupported id");
                continue;
            }
        };
        match serde_json::from_value::<TokenInfo>(value) {
            Ok(info) => {
                feed.insert(token_id, info);
            }
            Err(e) => {
                tracing::warn!(token_id = %token_id, error = %e, "Skipping malformed token info entry");
            }
        }
    }
    Ok(feed)
}

#[async_trait]
impl TokenInfoSource for HttpTokenInfoSource {
    async fn token_info(&self, token_id: &TokenId) -> Result<Option<TokenInfo>> {
        let feed = self
            .cache
            .get_or_try_fetch((), || self.fetch_feed())
            .await?;
        Ok(feed.get(token_id).cloned())
    }
}

/// Well-known token addresses per network
pub mod addresses {
    use super::*;

    // === Celo ===
    pub const CELO_CELO: Address = address!("471ece3750da237f93b8e339c536989b8978a438");
    pub const CUSD_CELO: Address = address!("765de816845861e75a25fca122bb6898b8b1282a");
    pub const CEUR_CELO: Address = address!("d8763cba276a3738e6de85b4b3bf5fded6d6ca73");
    pub const USDC_CELO: Address = address!("ceba9300f2b948710d2653dd7b07f33a8b32118c");
    pub const USDT_CELO: Address = address!("48065fbbe25f71c9282ddf5e1cd6d6a887483d5e");
    pub const CELO_ALFAJORES: Address = address!("f194afdf50b03e69bd7d057c1aa9e10c9954e4c9");

    // === Ethereum Mainnet ===
    pub const USDC_ETH: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    pub const USDT_ETH: Address = address!("dac17f958d2ee523a2206206994597c13d831ec7");
    pub const DAI_ETH: Address = address!("6b175474e89094c44da98b954eedeac495271d0f");
    pub const WETH_ETH: Address = address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
    pub const WBTC_ETH: Address = address!("2260fac5e5542a773aa44fbcfedf7c193bc2c599");

    // === Arbitrum ===
    pub const USDC_ARB: Address = address!("af88d065e77c8cc2239327c5edb3a432268e5831");
    pub const USDT_ARB: Address = address!("fd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9");
    pub const WETH_ARB: Address = address!("82af49447d8a07e3bd95bd0d56f35241523fbab1");

    // === Optimism ===
    pub const USDC_OPT: Address = address!("0b2c639c533813f4aa9d7837caf62653d097ff85");
    pub const USDT_OPT: Address = address!("94b008aa00579c1307b0ef2c499ad98a8ce58e58");
    pub const WETH_OPT: Address = address!("4200000000000000000000000000000000000006");

    // === Base ===
    pub const USDC_BASE: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
    pub const WETH_BASE: Address = address!("4200000000000000000000000000000000000006");
}

/// In-memory token info, seeded with well-known stablecoins and majors
///
/// Used when no token info feed is configured. Stablecoins are priced at $1;
/// other tokens carry no price so positions fall back to hook-provided prices.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenInfoSource {
    tokens: HashMap<TokenId, TokenInfo>,
}

impl StaticTokenInfoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(
        mut self,
        network: NetworkId,
        address: Address,
        symbol: &str,
        decimals: u8,
        price_usd: Option<DecimalNumber>,
    ) -> Self {
        self.tokens.insert(
            TokenId::new(network, &address),
            TokenInfo {
                symbol: symbol.to_string(),
                decimals,
                price_usd,
            },
        );
        self
    }

    fn with_stablecoin(self, network: NetworkId, address: Address, symbol: &str, decimals: u8) -> Self {
        self.with_token(network, address, symbol, decimals, Some(DecimalNumber::one()))
    }

    /// Well-known tokens for every supported mainnet
    pub fn well_known() -> Self {
        use addresses::*;
        use NetworkId::*;

        Self::new()
            .with_token(CeloMainnet, CELO_CELO, "CELO", 18, None)
            .with_token(CeloAlfajores, CELO_ALFAJORES, "CELO", 18, None)
            .with_stablecoin(CeloMainnet, CUSD_CELO, "cUSD", 18)
            .with_token(CeloMainnet, CEUR_CELO, "cEUR", 18, None)
            .with_stablecoin(CeloMainnet, USDC_CELO, "USDC", 6)
            .with_stablecoin(CeloMainnet, USDT_CELO, "USDT", 6)
            .with_stablecoin(EthereumMainnet, USDC_ETH, "USDC", 6)
            .with_stablecoin(EthereumMainnet, USDT_ETH, "USDT", 6)
            .with_stablecoin(EthereumMainnet, DAI_ETH, "DAI", 18)
            .with_token(EthereumMainnet, WETH_ETH, "WETH", 18, None)
            .with_token(EthereumMainnet, WBTC_ETH, "WBTC", 8, None)
            .with_stablecoin(ArbitrumOne, USDC_ARB, "USDC", 6)
            .with_stablecoin(ArbitrumOne, USDT_ARB, "USDT", 6)
            .with_token(ArbitrumOne, WETH_ARB, "WETH", 18, None)
            .with_stablecoin(OpMainnet, USDC_OPT, "USDC", 6)
            .with_stablecoin(OpMainnet, USDT_OPT, "USDT", 6)
            .with_token(OpMainnet, WETH_OPT, "WETH", 18, None)
            .with_stablecoin(BaseMainnet, USDC_BASE, "USDC", 6)
            .with_token(BaseMainnet, WETH_BASE, "WETH", 18, None)
    }
}

#[async_trait]
impl TokenInfoSource for StaticTokenInfoSource {
    async fn token_info(&self, token_id: &TokenId) -> Result<Option<TokenInfo>> {
        Ok(self.tokens.get(token_id).cloned())
    }
}
